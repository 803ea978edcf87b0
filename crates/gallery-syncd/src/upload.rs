use gallery_core::{ChecksumStore, GalleryError, LocalAsset, Result};
use std::sync::Arc;

use crate::client::{AssetUploader, ClientError};
use crate::fingerprints::ensure_fingerprint;

/// A local file that the server accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub local_id: String,
    pub fingerprint: String,
    pub remote_id: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<UploadedAsset>,
    /// Local ids the server refused or that could not be read
    pub failed: Vec<String>,
    /// Already linked to a remote asset
    pub skipped: usize,
}

/// Sends local-only files to the server.
///
/// The fingerprint is persisted before the upload starts so a crash mid-upload
/// never forces the file to be hashed again.
pub struct UploadPipeline {
    uploader: Arc<dyn AssetUploader>,
    checksums: ChecksumStore,
}

impl UploadPipeline {
    pub fn new(uploader: Arc<dyn AssetUploader>, checksums: ChecksumStore) -> Self {
        Self {
            uploader,
            checksums,
        }
    }

    /// Upload `asset` unless it already has a remote identity.
    ///
    /// Returns the new remote id, or `None` if nothing was uploaded. Only an
    /// expired session and local storage failures are returned as errors.
    pub async fn upload_if_needed(&self, asset: &mut LocalAsset) -> Result<Option<String>> {
        if asset.remote_id.is_some() {
            return Ok(None);
        }

        if !ensure_fingerprint(&self.checksums, asset).await? {
            return Ok(None);
        }

        match self.uploader.upload_asset(asset).await {
            Ok(Some(remote_id)) => {
                asset.remote_id = Some(remote_id.clone());
                Ok(Some(remote_id))
            }
            Ok(None) => Ok(None),
            Err(ClientError::SessionExpired) => Err(GalleryError::SessionExpired),
            Err(e) => {
                tracing::warn!(local_id = %asset.id, "upload failed: {e}");
                Ok(None)
            }
        }
    }

    /// Upload every asset in order, reporting `(done, total)` after each one.
    ///
    /// Missing fingerprints are resolved for the whole batch before the first
    /// upload starts; unreadable files are reported as failed.
    pub async fn upload_batch<F>(&self, assets: &mut [LocalAsset], mut progress: F) -> Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        let total = assets.len();
        let mut report = UploadReport::default();

        let mut unreadable = vec![false; total];
        for (asset, unreadable) in assets.iter_mut().zip(unreadable.iter_mut()) {
            if asset.remote_id.is_none() {
                *unreadable = !ensure_fingerprint(&self.checksums, asset).await?;
            }
        }

        for (done, asset) in assets.iter_mut().enumerate() {
            if asset.remote_id.is_some() {
                report.skipped += 1;
            } else if unreadable[done] {
                report.failed.push(asset.id.clone());
            } else {
                match self.upload_if_needed(asset).await? {
                    Some(remote_id) => report.uploaded.push(UploadedAsset {
                        local_id: asset.id.clone(),
                        fingerprint: asset.fingerprint.clone().unwrap_or_default(),
                        remote_id,
                    }),
                    None => report.failed.push(asset.id.clone()),
                }
            }
            progress(done + 1, total);
        }

        tracing::info!(
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            "upload batch finished"
        );
        Ok(report)
    }
}
