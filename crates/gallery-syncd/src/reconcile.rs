use futures_util::stream::{self, StreamExt, TryStreamExt};
use gallery_core::merge::{merge_assets, sort_remote};
use gallery_core::{
    Asset, ChecksumStore, GalleryError, LocalAsset, RemoteAsset, RemoteCatalogStore, Result,
    StateHandle,
};
use std::sync::Arc;
use tokio::sync::watch;

use crate::blocking::on_blocking_pool;
use crate::client::CatalogSource;
use crate::fingerprints::ensure_fingerprint;
use crate::media::LocalMediaEnumerator;

/// Where a reconciliation pass currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingRemote,
    FetchingLocal,
    ComputingFingerprints,
    Merging,
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        /// Entries in the merged view
        total: usize,
        local: usize,
        remote: usize,
        /// Fingerprints computed during this pass
        computed: usize,
    },
    /// The server could not be reached or answered garbage; nothing changed
    RemoteUnavailable,
}

/// Keeps the merged gallery view in step with the device and the server.
///
/// The view is published through a watch channel. A pass publishes twice:
/// once with the locals whose fingerprint was cached, and again after the
/// missing fingerprints have been computed. Nothing is published until both
/// the remote and the local side have been read, so a pass that fails early
/// leaves the previous view in place.
pub struct ReconciliationEngine {
    source: Arc<dyn CatalogSource>,
    enumerator: LocalMediaEnumerator,
    checksums: ChecksumStore,
    catalog: RemoteCatalogStore,
    state: StateHandle,
    checksum_workers: usize,
    view: watch::Sender<Vec<Asset>>,
    phase: watch::Sender<SyncPhase>,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        enumerator: LocalMediaEnumerator,
        checksums: ChecksumStore,
        catalog: RemoteCatalogStore,
        state: StateHandle,
    ) -> Self {
        let (view, _) = watch::channel(Vec::new());
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            source,
            enumerator,
            checksums,
            catalog,
            state,
            checksum_workers: 1,
            view,
            phase,
        }
    }

    /// Fingerprint up to `workers` files at once (minimum 1)
    pub fn with_checksum_workers(mut self, workers: usize) -> Self {
        self.checksum_workers = workers.max(1);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Asset>> {
        self.view.subscribe()
    }

    pub fn phases(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Current merged view
    pub fn snapshot(&self) -> Vec<Asset> {
        self.view.borrow().clone()
    }

    /// Local assets of the current view, linked or not
    pub fn local_assets(&self) -> Vec<LocalAsset> {
        self.view
            .borrow()
            .iter()
            .filter_map(|asset| match asset {
                Asset::Local(local) | Asset::Merged { local, .. } => Some(local.clone()),
                Asset::Remote(_) => None,
            })
            .collect()
    }

    /// Link the first unlinked entry with `fingerprint` to an uploaded asset
    pub fn attach_remote(&self, fingerprint: &str, remote_id: &str) -> bool {
        self.view.send_if_modified(|assets| {
            assets
                .iter_mut()
                .find(|asset| asset.fingerprint() == Some(fingerprint) && asset.remote_id().is_none())
                .map(|asset| asset.attach_remote(remote_id))
                .unwrap_or(false)
        })
    }

    /// Run one reconciliation pass.
    ///
    /// Dropping the returned future cancels the pass; everything persisted up
    /// to that point (catalog writes, watermark, fingerprints) stays valid.
    pub async fn sync(&self, album: Option<&str>) -> Result<SyncOutcome> {
        let mut reset = PhaseReset::new(&self.phase);
        let result = self.run(album).await;
        if matches!(result, Ok(SyncOutcome::Synced { .. })) {
            reset.disarm();
        }
        result
    }

    async fn run(&self, album: Option<&str>) -> Result<SyncOutcome> {
        self.phase.send_replace(SyncPhase::FetchingRemote);
        let Some(remote) = self.fetch_remote().await? else {
            tracing::warn!("remote catalog unavailable, keeping the current view");
            return Ok(SyncOutcome::RemoteUnavailable);
        };

        self.phase.send_replace(SyncPhase::Merging);
        tracing::debug!(remote = remote.len(), "remote set ready");

        self.phase.send_replace(SyncPhase::FetchingLocal);
        let local = self.enumerator.enumerate(album).await?;
        let ids: Vec<String> = local.iter().map(|asset| asset.id.clone()).collect();
        let checksums = self.checksums.clone();
        let cached = on_blocking_pool(move || checksums.get_many(&ids)).await?;

        let (mut ready, pending): (Vec<LocalAsset>, Vec<LocalAsset>) = local
            .into_iter()
            .map(|mut asset| {
                asset.fingerprint = cached.get(&asset.id).cloned();
                asset
            })
            .partition(|asset| asset.fingerprint.is_some());
        tracing::info!(
            cached = ready.len(),
            pending = pending.len(),
            remote = remote.len(),
            "reconciling"
        );

        self.phase.send_replace(SyncPhase::Merging);
        self.view.send_replace(merge_assets(&ready, &remote));

        self.phase.send_replace(SyncPhase::ComputingFingerprints);
        let computed = pending.len();
        let resolved = self.resolve_pending(pending).await?;
        ready.extend(resolved);
        ready.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        self.phase.send_replace(SyncPhase::Merging);
        let merged = merge_assets(&ready, &remote);
        let outcome = SyncOutcome::Synced {
            total: merged.len(),
            local: ready.len(),
            remote: remote.len(),
            computed,
        };
        self.view.send_replace(merged);
        self.phase.send_replace(SyncPhase::Synced);

        tracing::info!(?outcome, "reconciliation finished");
        Ok(outcome)
    }

    /// Bring the catalog mirror up to date and return the remote set, newest first
    async fn fetch_remote(&self) -> Result<Option<Vec<RemoteAsset>>> {
        let state = self.state.clone();
        let watermark = on_blocking_pool(move || Ok(state.last_sync()?)).await?;

        let (catalog, state) = (self.catalog.clone(), self.state.clone());
        let mut remote = if watermark == 0 {
            let Some(full) = self.source.sync_full().await? else {
                return Ok(None);
            };
            on_blocking_pool(move || {
                catalog.upsert(&full.assets)?;
                state.set_last_sync(full.watermark)?;
                Ok(full.assets)
            })
            .await?
        } else {
            let Some(delta) = self.source.sync_delta(watermark).await? else {
                return Ok(None);
            };
            on_blocking_pool(move || {
                catalog.upsert(&delta.uploaded)?;
                catalog.delete(&delta.deleted)?;
                state.set_last_sync(delta.watermark)?;
                catalog.get_all()
            })
            .await?
        };

        sort_remote(&mut remote);
        Ok(Some(remote))
    }

    async fn resolve_pending(&self, pending: Vec<LocalAsset>) -> Result<Vec<LocalAsset>> {
        let checksums = &self.checksums;
        stream::iter(pending)
            .map(|mut asset| async move {
                ensure_fingerprint(checksums, &mut asset).await?;
                Ok::<_, GalleryError>(asset)
            })
            .buffer_unordered(self.checksum_workers)
            .try_collect()
            .await
    }
}

/// Puts the phase back to `Idle` unless the pass completed, including when
/// the sync future is dropped part way through
struct PhaseReset<'a> {
    phase: &'a watch::Sender<SyncPhase>,
    armed: bool,
}

impl<'a> PhaseReset<'a> {
    fn new(phase: &'a watch::Sender<SyncPhase>) -> Self {
        Self { phase, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.phase.send_replace(SyncPhase::Idle);
        }
    }
}
