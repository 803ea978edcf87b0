pub mod config;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod models;
pub mod storage;

// Re-export commonly used types and functions
pub use config::{Config, Credentials, State, StateHandle};
pub use error::{GalleryError, Result};
pub use fingerprint::compute_fingerprint;
pub use merge::merge_assets;
pub use models::{Asset, LocalAsset, RemoteAsset};
pub use storage::{ChecksumStore, LocalDb, RemoteCatalogStore};
