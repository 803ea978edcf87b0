use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the reconciliation core.
///
/// `SessionExpired` is the only variant callers are expected to route to a
/// logout flow; everything else is local to the failing operation.
#[derive(Debug, Error)]
pub enum GalleryError {
    /// No usable server/token configuration, or refresh-and-retry failed
    #[error("session expired: please log in again")]
    SessionExpired,

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("local database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("remote request failed: {0}")]
    Remote(String),

    #[error("background worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    State(#[from] anyhow::Error),
}

impl GalleryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GalleryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, GalleryError::SessionExpired)
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
