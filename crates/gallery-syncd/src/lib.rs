mod blocking;
pub mod client;
pub mod context;
pub mod fingerprints;
pub mod media;
pub mod reconcile;
pub mod upload;
pub mod watcher;

pub use client::{AssetUploader, CatalogSource, ClientError, ClusterKind, RemoteSyncClient};
pub use context::{Gallery, GalleryStatus};
pub use fingerprints::ChecksumReport;
pub use media::{DirectoryIndex, LocalMediaEnumerator, MediaIndex, MediaRow};
pub use reconcile::{ReconciliationEngine, SyncOutcome, SyncPhase};
pub use upload::{UploadPipeline, UploadReport, UploadedAsset};
pub use watcher::MediaWatcher;
