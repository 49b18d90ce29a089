//! SQLite snapshot store. Each committed strategy state is appended with its
//! SHA-256 content hash; loading re-checks the hash.

use crate::strategy::StrategySnapshot;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("snapshot {id} is corrupt: stored hash {stored}, computed {computed}")]
    Corrupt {
        id: i64,
        stored: String,
        computed: String,
    },
}

/// Append-only history of strategy snapshots.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the store at `path`. Creates parent dirs if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL,
                body BLOB NOT NULL,
                created_utc INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_hash ON snapshots(hash);
            "#,
        )?;
        debug!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Hex SHA-256 of `content`.
    pub fn key_for(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))
    }

    /// Append `snapshot`; returns its content hash.
    pub fn save(&self, snapshot: &StrategySnapshot) -> Result<String, StoreError> {
        let body = serde_json::to_vec(snapshot)?;
        let hash = Self::key_for(&body);
        let created = time::OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO snapshots (hash, body, created_utc) VALUES (?1, ?2, ?3)",
            rusqlite::params![hash, body, created],
        )?;
        info!(%hash, bytes = body.len(), "snapshot saved");
        Ok(hash)
    }

    /// Most recent snapshot, or `None` for a fresh store.
    pub fn latest(&self) -> Result<Option<StrategySnapshot>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, hash, body FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, stored, body)) = row else {
            return Ok(None);
        };
        let computed = Self::key_for(&body);
        if computed != stored {
            return Err(StoreError::Corrupt {
                id,
                stored,
                computed,
            });
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    pub fn history_len(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Address;
    use tempfile::NamedTempFile;

    #[test]
    fn key_deterministic() {
        let k1 = Store::key_for(br#"{"a":1}"#);
        let k2 = Store::key_for(br#"{"a":1}"#);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn empty_store_has_no_snapshot() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        assert!(store.latest().unwrap().is_none());
        assert_eq!(store.history_len().unwrap(), 0);
    }

    #[test]
    fn save_then_latest() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        let mut snap = StrategySnapshot::default();
        store.save(&snap).unwrap();
        snap.state
            .ledger
            .deposit(Address::new([1; 20]), 13_170_000_000_000_000)
            .unwrap();
        let hash = store.save(&snap).unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(store.latest().unwrap(), Some(snap));
        assert_eq!(store.history_len().unwrap(), 2);
    }

    #[test]
    fn tampered_body_detected() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::open(tmp.path()).unwrap();
        store.save(&StrategySnapshot::default()).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE snapshots SET body = ?1", [b"{}".to_vec()])
            .unwrap();
        assert!(matches!(store.latest(), Err(StoreError::Corrupt { .. })));
    }
}
