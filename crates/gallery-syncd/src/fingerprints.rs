use gallery_core::{compute_fingerprint, ChecksumStore, GalleryError, LocalAsset, Result};

use crate::blocking::on_blocking_pool;
use crate::media::LocalMediaEnumerator;

/// Hash a local file on the blocking pool and persist the result.
///
/// The fingerprint is written to the checksum cache before it is returned,
/// so work done here survives a crash in whatever the caller does next.
pub async fn compute_and_store(checksums: &ChecksumStore, asset: &LocalAsset) -> Result<String> {
    let (store, local_id, path) = (checksums.clone(), asset.id.clone(), asset.path.clone());
    let fingerprint = on_blocking_pool(move || {
        let fingerprint = compute_fingerprint(&path)?;
        store.put(&local_id, &fingerprint)?;
        Ok(fingerprint)
    })
    .await?;
    tracing::debug!(local_id = %asset.id, %fingerprint, "fingerprint computed");
    Ok(fingerprint)
}

/// Fill `asset.fingerprint`, downgrading unreadable files to a warning.
///
/// Returns false if the file could not be read; storage failures still propagate.
pub async fn ensure_fingerprint(checksums: &ChecksumStore, asset: &mut LocalAsset) -> Result<bool> {
    if asset.fingerprint.is_some() {
        return Ok(true);
    }
    match compute_and_store(checksums, asset).await {
        Ok(fingerprint) => {
            asset.fingerprint = Some(fingerprint);
            Ok(true)
        }
        Err(GalleryError::Io { path, source }) => {
            tracing::warn!(local_id = %asset.id, "skipping unreadable file {}: {source}", path.display());
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChecksumReport {
    /// Files that already had a cached fingerprint
    pub cached: usize,
    pub computed: usize,
    /// Local ids of unreadable files
    pub failed: Vec<String>,
}

/// Background job: fingerprint every local file that has no cached record.
///
/// May run concurrently with a reconciliation pass; both write the same
/// deterministic value for a given file, so the last write wins harmlessly.
pub async fn compute_missing_checksums<F>(
    enumerator: &LocalMediaEnumerator,
    checksums: &ChecksumStore,
    album: Option<&str>,
    mut progress: F,
) -> Result<ChecksumReport>
where
    F: FnMut(usize, usize),
{
    let assets = enumerator.enumerate(album).await?;
    let ids: Vec<String> = assets.iter().map(|asset| asset.id.clone()).collect();
    let store = checksums.clone();
    let cached = on_blocking_pool(move || store.get_many(&ids)).await?;

    let mut pending: Vec<LocalAsset> = assets
        .iter()
        .filter(|asset| !cached.contains_key(&asset.id))
        .cloned()
        .collect();

    let mut report = ChecksumReport {
        cached: assets.len() - pending.len(),
        ..Default::default()
    };
    let total = pending.len();
    tracing::info!(total, cached = report.cached, "computing missing checksums");

    for (done, asset) in pending.iter_mut().enumerate() {
        if ensure_fingerprint(checksums, asset).await? {
            report.computed += 1;
        } else {
            report.failed.push(asset.id.clone());
        }
        progress(done + 1, total);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaIndex, MediaRow};
    use gallery_core::fingerprint::fingerprint_bytes;
    use gallery_core::LocalDb;
    use std::sync::Arc;

    struct FixedIndex(Vec<MediaRow>);

    impl MediaIndex for FixedIndex {
        fn query(&self, _album: Option<&str>) -> Option<Vec<MediaRow>> {
            Some(self.0.clone())
        }
    }

    fn row(id: &str, path: std::path::PathBuf) -> MediaRow {
        MediaRow {
            id: id.to_string(),
            path,
            mime_type: "image/jpeg".to_string(),
            album: None,
            date_taken: Some(1),
            date_modified: 0,
        }
    }

    #[tokio::test]
    async fn test_compute_missing_skips_cached_and_reports_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"alpha").unwrap();
        std::fs::write(&b, b"beta").unwrap();

        let enumerator = LocalMediaEnumerator::new(Arc::new(FixedIndex(vec![
            row("a", a),
            row("b", b),
            row("gone", dir.path().join("gone.jpg")),
        ])));
        let checksums = LocalDb::open_in_memory().unwrap().checksums();
        checksums.put("a", "cached-a").unwrap();

        let mut seen = Vec::new();
        let report = compute_missing_checksums(&enumerator, &checksums, None, |done, total| {
            seen.push((done, total))
        })
        .await
        .unwrap();

        assert_eq!(report.cached, 1);
        assert_eq!(report.computed, 1);
        assert_eq!(report.failed, vec!["gone".to_string()]);
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
        assert_eq!(checksums.get("a").unwrap().as_deref(), Some("cached-a"));
        assert_eq!(
            checksums.get("b").unwrap(),
            Some(fingerprint_bytes(b"beta"))
        );
    }
}
