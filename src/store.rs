use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::DbPool;
use crate::error::StoreError;
use crate::types::snapshot::MetricSnapshot;

pub mod keys {
    pub const CACHE: &str = "trendyol_cache";
    pub const LAST_ORDER_CHECK: &str = "trendyol_last_order_check";
    pub const API_CREDENTIALS: &str = "trendyol_api_credentials";
}

/// Number of snapshots kept in `snapshot_history`.
const SNAPSHOT_HISTORY_LIMIT: i64 = 50;

/// JSON key/value state that survives restarts. A missing key is a cold start.
#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        match conn.query_row(
            "SELECT value FROM local_state WHERE key = ?1",
            [key],
            |row| row.get(0),
        ) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO local_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            [key, value],
        )?;
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.set_raw(key, &json)
    }

    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM local_state WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Append a snapshot to the history and trim old rows.
    pub fn save_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshot_history (captured_at, body) VALUES (?1, ?2)",
            rusqlite::params![snapshot.captured_at() as i64, body],
        )?;
        tx.execute(
            "DELETE FROM snapshot_history WHERE id NOT IN (
                 SELECT id FROM snapshot_history ORDER BY captured_at DESC, id DESC LIMIT ?1
             )",
            [SNAPSHOT_HISTORY_LIMIT],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn latest_snapshot(&self) -> Result<Option<MetricSnapshot>, StoreError> {
        let conn = self.pool.get()?;
        let body: Option<String> = match conn.query_row(
            "SELECT body FROM snapshot_history ORDER BY captured_at DESC, id DESC LIMIT 1",
            [],
            |row| row.get(0),
        ) {
            Ok(body) => Some(body),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };
        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn snapshot_count(&self) -> Result<usize, StoreError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshot_history", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
pub(crate) fn test_store() -> (tempfile::TempDir, LocalStore) {
    let dir = tempfile::tempdir().unwrap();
    let pool = crate::db::open(&dir.path().join("test.sqlite")).unwrap();
    (dir, LocalStore::new(pool))
}
