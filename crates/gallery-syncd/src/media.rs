use gallery_core::{GalleryError, LocalAsset, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use uuid::Uuid;

/// One row of the device media index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRow {
    pub id: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub album: Option<String>,
    /// Capture time in epoch milliseconds, if the index knows it
    pub date_taken: Option<i64>,
    /// Last modification in epoch seconds
    pub date_modified: i64,
}

/// Read-only view of the device media index.
///
/// `None` plays the role of an unavailable cursor: the index could not be
/// queried at all, which is different from an empty result.
pub trait MediaIndex: Send + Sync {
    fn query(&self, album: Option<&str>) -> Option<Vec<MediaRow>>;
}

/// Enumerates local media into [`LocalAsset`]s, newest first
#[derive(Clone)]
pub struct LocalMediaEnumerator {
    index: Arc<dyn MediaIndex>,
}

impl LocalMediaEnumerator {
    pub fn new(index: Arc<dyn MediaIndex>) -> Self {
        Self { index }
    }

    pub async fn enumerate(&self, album: Option<&str>) -> Result<Vec<LocalAsset>> {
        let index = self.index.clone();
        let album = album.map(str::to_owned);
        let rows = tokio::task::spawn_blocking(move || index.query(album.as_deref()))
            .await
            .map_err(|e| GalleryError::Worker(e.to_string()))?;

        let Some(rows) = rows else {
            tracing::warn!("media index unavailable, treating as empty");
            return Ok(Vec::new());
        };

        let mut assets: Vec<LocalAsset> = rows.into_iter().map(into_local_asset).collect();
        assets.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        tracing::debug!(count = assets.len(), "local media enumerated");
        Ok(assets)
    }
}

fn into_local_asset(row: MediaRow) -> LocalAsset {
    let timestamp = row
        .date_taken
        .filter(|taken| *taken > 0)
        .unwrap_or(row.date_modified * 1000);
    LocalAsset::new(row.id, row.path, row.mime_type, timestamp)
}

/// Media index backed by a directory tree.
///
/// Every image or video below `root` is a row. The album is the first
/// directory below the root, and the id is derived from the root-relative
/// path so it stays stable between runs.
pub struct DirectoryIndex {
    root: PathBuf,
}

impl DirectoryIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self, dir: &Path, rows: &mut Vec<MediaRow>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Error scanning directory {}: {e}", dir.display());
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with('.'))
                .unwrap_or(true);
            if hidden {
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_dir() {
                self.scan(&path, rows);
                continue;
            }

            let Some(mime_type) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(mime_for_extension)
            else {
                continue;
            };

            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let album = relative
                .split_once('/')
                .map(|(first, _)| first.to_string());
            let date_modified = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);

            rows.push(MediaRow {
                id: local_id_for(&relative),
                path,
                mime_type: mime_type.to_string(),
                album,
                date_taken: None,
                date_modified,
            });
        }
    }
}

impl MediaIndex for DirectoryIndex {
    fn query(&self, album: Option<&str>) -> Option<Vec<MediaRow>> {
        if !self.root.is_dir() {
            return None;
        }
        let mut rows = Vec::new();
        self.scan(&self.root, &mut rows);
        if let Some(album) = album {
            rows.retain(|row| row.album.as_deref() == Some(album));
        }
        Some(rows)
    }
}

/// Deterministic local id for a root-relative media path
pub fn local_id_for(relative_path: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, relative_path.as_bytes()).to_string()
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "dng" => "image/x-adobe-dng",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "3gp" => "video/3gpp",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(mime)
}
