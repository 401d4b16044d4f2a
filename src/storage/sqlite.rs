use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

use super::{BlobStore, StoreError};

const USAGE_KEY: &str = "usage";

/// Usage blob kept as one row of a SQLite key/value table.
///
/// Each write is a single `INSERT OR REPLACE`, so readers see either the old
/// or the new blob.
pub struct SqliteBlobStore {
    db: Database,
    key: String,
}

impl SqliteBlobStore {
    pub fn open(db_path: PathBuf) -> anyhow::Result<Self> {
        Ok(Self::with_database(Database::new(db_path)?))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            key: USAGE_KEY.to_string(),
        }
    }
}

impl BlobStore for SqliteBlobStore {
    fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let key = self.key.clone();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT value FROM blobs WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()
                .context("failed to load usage blob")
            })
            .map_err(StoreError::ReadCorrupt)
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let key = self.key.clone();
        let value = bytes.to_vec();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![key, value, Utc::now().to_rfc3339()],
                )
                .context("failed to store usage blob")?;
                Ok(())
            })
            .map_err(StoreError::WriteFailed)
    }

    /// Stores the bytes under `<key>.corrupt-<unix ms>` in the same table.
    fn preserve(&self, bytes: &[u8]) -> Result<Option<String>, StoreError> {
        let now = Utc::now();
        let backup_key = format!("{}.corrupt-{}", self.key, now.timestamp_millis());
        let value = bytes.to_vec();
        let key = backup_key.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    params![key, value, now.to_rfc3339()],
                )
                .context("failed to back up usage blob")?;
                Ok(())
            })
            .map_err(StoreError::WriteFailed)?;
        Ok(Some(format!("{} (key '{backup_key}')", self.db.path().display())))
    }

    fn describe(&self) -> String {
        format!("{} (key '{}')", self.db.path().display(), self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_has_no_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlobStore::open(dir.path().join("pc_timer.sqlite3")).unwrap();
        assert!(store.read_all().unwrap().is_none());
    }

    #[test]
    fn blob_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pc_timer.sqlite3");

        {
            let store = SqliteBlobStore::open(path.clone()).unwrap();
            store.write_all(br#"{"sessions":[]}"#).unwrap();
            store.write_all(br#"{"sessions":[1]}"#).unwrap();
        }

        let reopened = SqliteBlobStore::open(path).unwrap();
        assert_eq!(
            reopened.read_all().unwrap().unwrap(),
            br#"{"sessions":[1]}"#.to_vec()
        );
    }

    #[test]
    fn preserve_leaves_the_live_key_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteBlobStore::open(dir.path().join("pc_timer.sqlite3")).unwrap();
        store.write_all(b"{bad").unwrap();

        let backup = store.preserve(b"{bad").unwrap().unwrap();
        assert!(backup.contains("usage.corrupt-"));

        store.write_all(br#"{"sessions":[]}"#).unwrap();
        let kept: i64 = store
            .db
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM blobs WHERE key LIKE 'usage.corrupt-%' AND value = X'7B626164'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(kept, 1);
    }
}
