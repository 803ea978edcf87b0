use anyhow::{Context, Result};
use clap::Parser;
use gallery_core::{Config, GalleryError, StateHandle};
use gallery_syncd::watcher::MediaWatcher;
use gallery_syncd::{Gallery, SyncOutcome};
use std::path::PathBuf;
use tokio::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Quiet period after a file event before a sync starts
const DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "gallery-syncd", about = "Background sync daemon for the gallery")]
struct Args {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<String>,

    /// Run in foreground mode (don't daemonize)
    #[arg(long)]
    foreground: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

enum PassResult {
    Done,
    SessionExpired,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match args.config {
        Some(ref path) => {
            let path = expand_path(path)?;
            tracing::info!("using config {}", path.display());
            Config::load_from(&path)?
        }
        None => Config::load()?,
    };
    let interval = Duration::from_secs(config.sync.interval_seconds.max(1));

    let gallery = Gallery::open(config, StateHandle::load()?)?;
    if !gallery.state().snapshot()?.is_logged_in() {
        tracing::warn!("not logged in, run `gallery login` first");
        return Ok(());
    }

    let media_dir = gallery.media_dir().clone();
    std::fs::create_dir_all(&media_dir)
        .with_context(|| format!("Failed to create media directory: {}", media_dir.display()))?;
    let mut watcher = MediaWatcher::new(&media_dir)?;
    let mut session = gallery.client().session_events();

    tracing::info!(
        media_dir = %media_dir.display(),
        interval_secs = interval.as_secs(),
        "gallery-syncd started"
    );
    if !args.foreground {
        tracing::debug!("running attached; use a service manager to detach");
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut dirty_since: Option<Instant> = None;

    loop {
        let debounce_deadline = dirty_since.map(|at| at + DEBOUNCE).unwrap_or_else(Instant::now);

        let result = tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("scheduled sync");
                dirty_since = None;
                run_pass(&gallery).await
            }

            event = watcher.next_event() => {
                match event {
                    Some(event) => {
                        tracing::debug!(paths = ?event.paths, "media changed");
                        dirty_since.get_or_insert_with(Instant::now);
                        continue;
                    }
                    None => {
                        tracing::warn!("file watcher stopped, relying on scheduled syncs");
                        watcher = MediaWatcher::new(&media_dir)?;
                        continue;
                    }
                }
            }

            _ = tokio::time::sleep_until(debounce_deadline), if dirty_since.is_some() => {
                dirty_since = None;
                run_pass(&gallery).await
            }

            changed = session.changed() => {
                if changed.is_ok() && *session.borrow_and_update() {
                    PassResult::SessionExpired
                } else {
                    continue;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal, stopping gallery-syncd");
                break;
            }
        };

        if let PassResult::SessionExpired = result {
            tracing::warn!("session expired, logging out; run `gallery login` to resume syncing");
            gallery.logout()?;
            break;
        }
    }

    Ok(())
}

/// One reconcile-then-upload pass. Only an expired session is fatal.
async fn run_pass(gallery: &Gallery) -> PassResult {
    match gallery.sync(None).await {
        Ok(SyncOutcome::Synced { .. }) => {}
        Ok(SyncOutcome::RemoteUnavailable) => return PassResult::Done,
        Err(GalleryError::SessionExpired) => return PassResult::SessionExpired,
        Err(e) => {
            tracing::error!("sync failed: {e}");
            return PassResult::Done;
        }
    }

    match gallery.upload_pending(|_, _| {}).await {
        Ok(report) if !report.uploaded.is_empty() || !report.failed.is_empty() => {
            tracing::info!(
                uploaded = report.uploaded.len(),
                failed = report.failed.len(),
                "upload pass finished"
            );
            PassResult::Done
        }
        Ok(_) => PassResult::Done,
        Err(GalleryError::SessionExpired) => PassResult::SessionExpired,
        Err(e) => {
            tracing::error!("upload failed: {e}");
            PassResult::Done
        }
    }
}

fn expand_path(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}
