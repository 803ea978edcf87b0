use rusqlite::{params, params_from_iter, OptionalExtension};
use std::collections::HashMap;

use super::LocalDb;
use crate::error::Result;

/// Maximum number of ids bound into a single lookup query
pub const LOOKUP_BATCH_SIZE: usize = 500;

/// Durable cache of local media id -> content fingerprint
#[derive(Clone)]
pub struct ChecksumStore {
    db: LocalDb,
}

impl ChecksumStore {
    pub fn new(db: LocalDb) -> Self {
        Self { db }
    }

    /// Insert or replace the fingerprint for a local id
    pub fn put(&self, local_id: &str, fingerprint: &str) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO checksums (local_id, checksum) VALUES (?1, ?2)
             ON CONFLICT(local_id) DO UPDATE SET checksum = excluded.checksum",
            params![local_id, fingerprint],
        )?;
        Ok(())
    }

    pub fn get(&self, local_id: &str) -> Result<Option<String>> {
        let conn = self.db.lock()?;
        let fingerprint = conn
            .query_row(
                "SELECT checksum FROM checksums WHERE local_id = ?1",
                params![local_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(fingerprint)
    }

    /// Look up many ids at once. Ids without a record are absent from the result.
    pub fn get_many<S: AsRef<str>>(&self, local_ids: &[S]) -> Result<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(local_ids.len());
        if local_ids.is_empty() {
            return Ok(found);
        }

        let conn = self.db.lock()?;
        for chunk in local_ids.chunks(LOOKUP_BATCH_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT local_id, checksum FROM checksums WHERE local_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.as_ref())), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, checksum) = row?;
                found.insert(id, checksum);
            }
        }

        tracing::debug!(
            requested = local_ids.len(),
            found = found.len(),
            "checksum cache lookup"
        );
        Ok(found)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM checksums", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
