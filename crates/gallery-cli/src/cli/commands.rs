use anyhow::{bail, Context, Result};
use colored::Colorize;
use dialoguer::{Input, Password};
use gallery_core::{Asset, GalleryError};
use gallery_proto::Preview;
use gallery_syncd::{ClientError, ClusterKind, Gallery, SyncOutcome};
use serde_json::json;
use std::io::Write;

/// Turn an expired session into a logout and a hint, pass everything else through
fn session_guard<T>(gallery: &Gallery, result: std::result::Result<T, GalleryError>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(GalleryError::SessionExpired) => {
            tracing::warn!("session expired, logging out");
            gallery.logout()?;
            bail!("Session expired. Run 'gallery login' to sign in again");
        }
        Err(e) => Err(e.into()),
    }
}

fn client_guard<T>(gallery: &Gallery, result: std::result::Result<T, ClientError>) -> Result<T> {
    session_guard(gallery, result.map_err(GalleryError::from))
}

fn progress_printer(label: &'static str, json: bool) -> impl FnMut(usize, usize) {
    move |done, total| {
        if json || total == 0 {
            return;
        }
        eprint!("\r{label} {done}/{total}");
        if done == total {
            eprintln!();
        }
        let _ = std::io::stderr().flush();
    }
}

/// Handle the 'login' command
pub async fn login(
    gallery: &Gallery,
    server: Option<String>,
    username: Option<String>,
    json: bool,
) -> Result<()> {
    let state = gallery.state().snapshot()?;

    let server_url = match server
        .or_else(|| gallery.config().sync.server_url.clone())
        .or(state.auth.server_url)
    {
        Some(url) => url,
        None => Input::<String>::new()
            .with_prompt("Server URL")
            .interact_text()?,
    };

    let username = match username {
        Some(name) => name,
        None => {
            let mut input = Input::<String>::new().with_prompt("Username");
            if let Some(previous) = state.auth.username {
                input = input.default(previous);
            }
            input.interact_text()?
        }
    };

    let password = Password::new().with_prompt("Password").interact()?;

    let credentials = gallery
        .login(&server_url, &username, &password)
        .await
        .context("Login failed")?;

    if json {
        println!(
            "{}",
            json!({ "status": "logged_in", "server": credentials.server_url, "username": username })
        );
    } else {
        println!(
            "Logged in to {} as {}",
            credentials.server_url.cyan(),
            username.bold()
        );
    }
    Ok(())
}

/// Handle the 'logout' command
pub fn logout(gallery: &Gallery, json: bool) -> Result<()> {
    gallery.logout()?;
    if json {
        println!("{}", json!({ "status": "logged_out" }));
    } else {
        println!("Logged out");
    }
    Ok(())
}

/// Handle the 'status' command
pub fn status(gallery: &Gallery, json: bool) -> Result<()> {
    let status = gallery.status()?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    println!("Gallery status:");
    match status.server_url {
        Some(ref url) => println!("  Server: {}", url.cyan()),
        None => println!("  Server: {}", "not configured".yellow()),
    }
    if let Some(ref username) = status.username {
        println!("  User: {username}");
    }
    println!(
        "  Session: {}",
        if status.logged_in {
            "Active".green()
        } else {
            "Logged out".red()
        }
    );
    println!(
        "  Last sync: {}",
        if status.last_sync == 0 {
            "never".dimmed().to_string()
        } else {
            status.last_sync.to_string()
        }
    );
    println!("  Media directory: {}", status.media_dir.display());
    println!("  Cached checksums: {}", status.cached_checksums);
    println!("  Remote assets: {}", status.remote_assets);

    if !status.logged_in {
        println!("\nRun 'gallery login' to connect to a server");
    }
    Ok(())
}

/// Run a reconciliation pass and report the outcome.
///
/// Returns false if the server could not be reached.
async fn reconcile(gallery: &Gallery, album: Option<&str>, json: bool) -> Result<bool> {
    tracing::debug!(?album, "starting reconciliation");
    let outcome = session_guard(gallery, gallery.sync(album).await)?;
    tracing::debug!(?outcome, "reconciliation returned");
    match outcome {
        SyncOutcome::Synced {
            total,
            local,
            remote,
            computed,
        } => {
            if !json {
                println!(
                    "Synced {} assets ({} local, {} remote, {} newly fingerprinted)",
                    total.to_string().bold(),
                    local,
                    remote,
                    computed
                );
            }
            Ok(true)
        }
        SyncOutcome::RemoteUnavailable => {
            if !json {
                println!("{}", "Server unavailable, nothing changed".yellow());
            }
            Ok(false)
        }
    }
}

/// Handle the 'sync' command
pub async fn sync(gallery: &Gallery, album: Option<&str>, json: bool) -> Result<()> {
    let reached = reconcile(gallery, album, json).await?;
    if !json {
        return Ok(());
    }

    let view = gallery.engine().snapshot();
    let count = |pred: fn(&Asset) -> bool| view.iter().filter(|&a| pred(a)).count();
    println!(
        "{}",
        json!({
            "status": if reached { "synced" } else { "remote_unavailable" },
            "total": view.len(),
            "local_only": count(|a| a.is_local() && !a.is_remote()),
            "remote_only": count(|a| !a.is_local()),
            "merged": count(|a| a.is_local() && a.is_remote()),
        })
    );
    Ok(())
}

/// Handle the 'upload' command
pub async fn upload(gallery: &Gallery, album: Option<&str>, json: bool) -> Result<()> {
    if !reconcile(gallery, album, json).await? {
        bail!("Cannot upload while the server is unavailable");
    }

    let result = gallery
        .upload_pending(progress_printer("Uploading", json))
        .await;
    let report = session_guard(gallery, result)?;
    tracing::debug!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        skipped = report.skipped,
        "upload finished"
    );

    if json {
        let uploaded: Vec<_> = report
            .uploaded
            .iter()
            .map(|u| json!({ "local_id": u.local_id, "remote_id": u.remote_id }))
            .collect();
        println!(
            "{}",
            json!({ "uploaded": uploaded, "failed": report.failed, "skipped": report.skipped })
        );
        return Ok(());
    }

    println!(
        "Uploaded {} file(s), {} already on the server",
        report.uploaded.len().to_string().green(),
        report.skipped
    );
    if !report.failed.is_empty() {
        println!("{} file(s) failed:", report.failed.len().to_string().red());
        for id in &report.failed {
            println!("  {}", id.dimmed());
        }
    }
    Ok(())
}

/// Handle the 'checksums' command
pub async fn checksums(gallery: &Gallery, album: Option<&str>, json: bool) -> Result<()> {
    let result = gallery
        .compute_checksums(album, progress_printer("Fingerprinting", json))
        .await;
    let report = result?;

    if json {
        println!(
            "{}",
            json!({ "cached": report.cached, "computed": report.computed, "failed": report.failed })
        );
        return Ok(());
    }

    println!(
        "Computed {} checksum(s), {} already cached",
        report.computed.to_string().green(),
        report.cached
    );
    if !report.failed.is_empty() {
        println!(
            "{} unreadable file(s) skipped",
            report.failed.len().to_string().yellow()
        );
    }
    Ok(())
}

/// Handle the 'people' command
pub async fn people(gallery: &Gallery, json: bool) -> Result<()> {
    let people = client_guard(gallery, gallery.client().list_people().await)?;

    if json {
        println!("{}", serde_json::to_string(&people)?);
        return Ok(());
    }

    if people.is_empty() {
        println!("No people found");
        return Ok(());
    }
    for person in people {
        match person.name {
            Some(ref name) => println!("  {} {}", name.cyan(), person.id.dimmed()),
            None => println!("  {} {}", "unknown".italic(), person.id.dimmed()),
        }
    }
    Ok(())
}

/// Handle the 'search' command
pub async fn search(gallery: &Gallery, query: &str, page: u32, page_size: u32, json: bool) -> Result<()> {
    let previews = client_guard(
        gallery,
        gallery.client().search(query, page, page_size).await,
    )?;
    print_previews(&previews, json)
}

/// Handle the 'cluster' command
pub async fn cluster(
    gallery: &Gallery,
    id: &str,
    faces: bool,
    page: u32,
    page_size: u32,
    json: bool,
) -> Result<()> {
    let kind = if faces {
        ClusterKind::Face
    } else {
        ClusterKind::Cluster
    };
    let previews = client_guard(
        gallery,
        gallery.client().cluster_previews(id, page, page_size, kind).await,
    )?;
    print_previews(&previews, json)
}

fn print_previews(previews: &[Preview], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(previews)?);
        return Ok(());
    }
    if previews.is_empty() {
        println!("No results");
        return Ok(());
    }
    for preview in previews {
        println!("  {} {}", preview.id.bold(), preview.preview_url.dimmed());
    }
    Ok(())
}

/// Handle the 'media' command
pub async fn media(gallery: &Gallery, id: &str, json: bool) -> Result<()> {
    let Some(info) = client_guard(gallery, gallery.client().media_info(id).await)? else {
        bail!("No media found for '{id}'");
    };

    if json {
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    println!("{}: {}", id.cyan().bold(), info.media_url);
    let fields = [
        ("Type", info.mime_type.clone()),
        (
            "Size",
            info.width
                .zip(info.height)
                .map(|(w, h)| format!("{w}x{h}")),
        ),
        ("Camera make", info.camera_make.clone()),
        ("Camera model", info.camera_model.clone()),
        ("Exposure", info.exposure_time.clone()),
        ("Aperture", info.f_number.map(|f| format!("f/{f}"))),
        ("ISO", info.iso.map(|iso| iso.to_string())),
        ("Focal length", info.focal_length.map(|mm| format!("{mm} mm"))),
        (
            "Location",
            info.latitude
                .zip(info.longitude)
                .map(|(lat, lon)| format!("{lat}, {lon}")),
        ),
        ("Taken", info.date_taken.clone()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {label}: {value}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gallery_core::{Config, Credentials, State, StateHandle};

    fn logged_in_gallery(media_dir: &std::path::Path) -> Gallery {
        let mut state = State::default();
        state.store_credentials(&Credentials {
            server_url: "http://gallery.local".into(),
            access_token: "access".into(),
            refresh_token: "refresh".into(),
            expires_at: None,
        });
        let mut config = Config::default();
        config.paths.media_dir = Some(media_dir.to_path_buf());
        Gallery::open(config, StateHandle::in_memory(state)).unwrap()
    }

    #[test]
    fn test_session_guard_logs_out_on_expiry() {
        let media = tempfile::tempdir().unwrap();
        let gallery = logged_in_gallery(media.path());

        assert_eq!(session_guard(&gallery, Ok(3)).unwrap(), 3);
        assert!(gallery.status().unwrap().logged_in);

        let err = session_guard::<()>(&gallery, Err(GalleryError::SessionExpired)).unwrap_err();
        assert!(err.to_string().contains("gallery login"));
        assert!(!gallery.status().unwrap().logged_in);
    }

    #[test]
    fn test_other_errors_keep_the_session() {
        let media = tempfile::tempdir().unwrap();
        let gallery = logged_in_gallery(media.path());

        let result = client_guard::<()>(&gallery, Err(ClientError::InvalidCredentials));
        assert!(result.is_err());
        assert!(gallery.status().unwrap().logged_in);
    }
}
