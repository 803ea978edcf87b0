use anyhow::{Context, Result};
use gallery_core::{Config, Credentials, LocalAsset, LocalDb, StateHandle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::blocking::on_blocking_pool;
use crate::client::RemoteSyncClient;
use crate::fingerprints::{compute_missing_checksums, ChecksumReport};
use crate::media::{DirectoryIndex, LocalMediaEnumerator};
use crate::reconcile::{ReconciliationEngine, SyncOutcome};
use crate::upload::{UploadPipeline, UploadReport};

/// Snapshot of what the local side knows, for `gallery status`
#[derive(Debug, Clone, Serialize)]
pub struct GalleryStatus {
    pub server_url: Option<String>,
    pub username: Option<String>,
    pub logged_in: bool,
    pub last_sync: i64,
    pub media_dir: PathBuf,
    pub database_path: Option<PathBuf>,
    pub cached_checksums: usize,
    pub remote_assets: usize,
}

/// Every long-lived handle the sync machinery needs, opened from durable
/// configuration and passed around explicitly.
pub struct Gallery {
    config: Config,
    state: StateHandle,
    db: LocalDb,
    media_dir: PathBuf,
    client: RemoteSyncClient,
    enumerator: LocalMediaEnumerator,
    engine: ReconciliationEngine,
    pipeline: UploadPipeline,
}

impl Gallery {
    /// Open the database named in `state` (in-memory if none) and wire up
    /// the client, engine and upload pipeline around it.
    pub fn open(config: Config, state: StateHandle) -> Result<Self> {
        let db = match state.database_path()? {
            Some(path) => LocalDb::open(&path)
                .with_context(|| format!("Failed to open database: {}", path.display()))?,
            None => LocalDb::open_in_memory()?,
        };

        let media_dir = config.get_media_dir()?;
        let enumerator = LocalMediaEnumerator::new(Arc::new(DirectoryIndex::new(&media_dir)));

        let timeout = Duration::from_secs(config.sync.request_timeout_secs);
        let client = RemoteSyncClient::new(state.clone(), timeout)
            .context("Failed to create HTTP client")?;

        let engine = ReconciliationEngine::new(
            Arc::new(client.clone()),
            enumerator.clone(),
            db.checksums(),
            db.catalog(),
            state.clone(),
        )
        .with_checksum_workers(config.sync.checksum_workers);
        let pipeline = UploadPipeline::new(Arc::new(client.clone()), db.checksums());

        Ok(Self {
            config,
            state,
            db,
            media_dir,
            client,
            enumerator,
            engine,
            pipeline,
        })
    }

    /// Open with the config and state files at their default locations
    pub fn open_default() -> Result<Self> {
        let config = Config::load()?;
        let state = StateHandle::load()?;
        Self::open(config, state)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn client(&self) -> &RemoteSyncClient {
        &self.client
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn media_dir(&self) -> &PathBuf {
        &self.media_dir
    }

    /// Log in, dropping the catalog mirror if the account changed
    pub async fn login(&self, server_url: &str, username: &str, password: &str) -> Result<Credentials> {
        let state = self.state.clone();
        let previous = on_blocking_pool(move || Ok(state.snapshot()?.auth)).await?;
        let credentials = self.client.login(server_url, username, password).await?;

        let same_account = previous.server_url.as_deref() == Some(credentials.server_url.as_str())
            && previous.username.as_deref() == Some(username);
        if !same_account {
            tracing::info!("account changed, discarding the remote catalog mirror");
            let (catalog, state) = (self.db.catalog(), self.state.clone());
            on_blocking_pool(move || {
                catalog.clear()?;
                state.set_last_sync(0)?;
                Ok(())
            })
            .await?;
        }
        Ok(credentials)
    }

    /// Forget the session and the remote catalog mirror.
    ///
    /// Cached fingerprints describe local files and survive logout.
    pub fn logout(&self) -> Result<()> {
        self.client.logout()?;
        self.db.catalog().clear()?;
        tracing::info!("logged out");
        Ok(())
    }

    pub async fn sync(&self, album: Option<&str>) -> gallery_core::Result<SyncOutcome> {
        self.engine.sync(album).await
    }

    /// Upload every local-only asset of the current view and link the
    /// results into it. Linked assets are counted as skipped.
    pub async fn upload_pending<F>(&self, progress: F) -> gallery_core::Result<UploadReport>
    where
        F: FnMut(usize, usize),
    {
        let mut local: Vec<LocalAsset> = self.engine.local_assets();
        let report = self.pipeline.upload_batch(&mut local, progress).await?;
        for uploaded in &report.uploaded {
            self.engine
                .attach_remote(&uploaded.fingerprint, &uploaded.remote_id);
        }
        Ok(report)
    }

    pub async fn compute_checksums<F>(
        &self,
        album: Option<&str>,
        progress: F,
    ) -> gallery_core::Result<ChecksumReport>
    where
        F: FnMut(usize, usize),
    {
        compute_missing_checksums(&self.enumerator, &self.db.checksums(), album, progress).await
    }

    pub fn status(&self) -> Result<GalleryStatus> {
        let state = self.state.snapshot()?;
        Ok(GalleryStatus {
            logged_in: state.is_logged_in(),
            server_url: state.auth.server_url,
            username: state.auth.username,
            last_sync: state.sync.last_sync,
            media_dir: self.media_dir.clone(),
            database_path: state.sync.database_path,
            cached_checksums: self.db.checksums().count()?,
            remote_assets: self.db.catalog().count()?,
        })
    }
}
