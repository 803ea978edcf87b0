use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{GalleryError, Result};

pub mod catalog;
pub mod checksums;

pub use catalog::RemoteCatalogStore;
pub use checksums::ChecksumStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS checksums (
        local_id TEXT PRIMARY KEY,
        checksum TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS remote_assets (
        remote_id TEXT PRIMARY KEY,
        checksum TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS remote_assets_checksum ON remote_assets (checksum);
";

/// Local SQLite database shared by the checksum cache and the remote catalog mirror.
///
/// Cloning is cheap; all clones share one connection guarded by a mutex, so
/// writers from the background checksum job and an interactive sync never
/// interleave inside a statement.
#[derive(Clone)]
pub struct LocalDb {
    conn: Arc<Mutex<Connection>>,
}

impl LocalDb {
    /// Open the database at the given path and initialize tables if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create db directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path)?;
        // Several processes (daemon and CLI) may share the file
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Open a private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn checksums(&self) -> ChecksumStore {
        ChecksumStore::new(self.clone())
    }

    pub fn catalog(&self) -> RemoteCatalogStore {
        RemoteCatalogStore::new(self.clone())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GalleryError::Worker("local database lock poisoned".to_string()))
    }

    /// Run a closure against the raw connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }
}
