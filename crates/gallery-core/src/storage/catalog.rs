use rusqlite::{params, params_from_iter};

use super::checksums::LOOKUP_BATCH_SIZE;
use super::LocalDb;
use crate::error::Result;
use crate::models::RemoteAsset;

/// Local mirror of the server catalog, patched by partial syncs
#[derive(Clone)]
pub struct RemoteCatalogStore {
    db: LocalDb,
}

impl RemoteCatalogStore {
    pub fn new(db: LocalDb) -> Self {
        Self { db }
    }

    /// Insert or replace assets by remote id, all in one transaction
    pub fn upsert(&self, assets: &[RemoteAsset]) -> Result<()> {
        if assets.is_empty() {
            return Ok(());
        }
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO remote_assets (remote_id, checksum, timestamp)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(remote_id) DO UPDATE SET
                    checksum = excluded.checksum,
                    timestamp = excluded.timestamp",
            )?;
            for asset in assets {
                stmt.execute(params![asset.id, asset.fingerprint, asset.timestamp])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove assets by remote id. An empty list is a no-op.
    pub fn delete<S: AsRef<str>>(&self, remote_ids: &[S]) -> Result<()> {
        if remote_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        for chunk in remote_ids.chunks(LOOKUP_BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            tx.execute(
                &format!("DELETE FROM remote_assets WHERE remote_id IN ({placeholders})"),
                params_from_iter(chunk.iter().map(|id| id.as_ref())),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_all(&self) -> Result<Vec<RemoteAsset>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT remote_id, checksum, timestamp FROM remote_assets
             ORDER BY timestamp DESC, remote_id ASC",
        )?;
        let assets = stmt
            .query_map([], |row| {
                Ok(RemoteAsset {
                    id: row.get(0)?,
                    fingerprint: row.get(1)?,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assets)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM remote_assets", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Forget the whole mirror, used when the account changes
    pub fn clear(&self) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute("DELETE FROM remote_assets", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_by_id() {
        let store = LocalDb::open_in_memory().unwrap().catalog();
        store
            .upsert(&[RemoteAsset::new("r1", "a", 1), RemoteAsset::new("r2", "b", 2)])
            .unwrap();
        store.upsert(&[RemoteAsset::new("r1", "c", 3)]).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(
            all,
            vec![RemoteAsset::new("r1", "c", 3), RemoteAsset::new("r2", "b", 2)]
        );
    }

    #[test]
    fn test_delete() {
        let store = LocalDb::open_in_memory().unwrap().catalog();
        store
            .upsert(&[
                RemoteAsset::new("r5", "h5", 50),
                RemoteAsset::new("r7", "h7", 70),
            ])
            .unwrap();

        store.delete::<&str>(&[]).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        store.delete(&["r5", "unknown"]).unwrap();
        assert_eq!(store.get_all().unwrap(), vec![RemoteAsset::new("r7", "h7", 70)]);
    }

    #[test]
    fn test_clear() {
        let store = LocalDb::open_in_memory().unwrap().catalog();
        store.upsert(&[RemoteAsset::new("r1", "a", 1)]).unwrap();
        store.clear().unwrap();
        assert!(store.get_all().unwrap().is_empty());
    }
}
