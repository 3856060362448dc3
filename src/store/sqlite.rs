// src/store/sqlite.rs
//! Persistent key store on SQLite
//!
//! One row per key generation in `encryption_keys`. Triggers make the table
//! append-only. With the `sqlcipher` feature the database file itself is
//! encrypted from a passphrase.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection};
use tracing::debug;
use zeroize::Zeroizing;

use super::KeyStore;
use crate::aliases::MasterKey32;
use crate::consts::DEFAULT_RETENTION;
use crate::error::{Result, StoreError};
use crate::key_ops::KeyEntry;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS encryption_keys (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        key_blob   BLOB NOT NULL,
        info       BLOB NOT NULL,
        expiry_ms  INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_encryption_keys_expiry ON encryption_keys(expiry_ms);

    CREATE TRIGGER IF NOT EXISTS encryption_keys_no_update
    BEFORE UPDATE ON encryption_keys
    BEGIN
        SELECT RAISE(ABORT, 'encryption_keys is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS encryption_keys_no_delete
    BEFORE DELETE ON encryption_keys
    BEGIN
        SELECT RAISE(ABORT, 'encryption_keys is append-only');
    END;
"#;

/// SQLite-backed store. Returns only the newest `query_limit` generations.
#[derive(Debug, Clone)]
pub struct SqliteKeyStore {
    conn: Arc<Mutex<Connection>>,
    query_limit: usize,
}

impl SqliteKeyStore {
    /// Open (or create) the key database at `path`
    pub fn open<P: AsRef<Path>>(path: P, passphrase: Option<&str>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path.as_ref())?;
        if let Some(passphrase) = passphrase {
            apply_passphrase(&conn, passphrase)?;
        }
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            query_limit: DEFAULT_RETENTION + 1,
        })
    }

    /// How many of the newest generations `get_all_keys` returns
    pub fn with_query_limit(mut self, limit: usize) -> Self {
        self.query_limit = limit.max(1);
        self
    }

    /// Total rows ever saved
    pub async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM encryption_keys", [], |r| r.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
        .await
    }

    /// Run blocking SQLite work off the async executor
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
    }
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
    async fn save_key(&self, entry: &KeyEntry) -> Result<()> {
        let entry = entry.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO encryption_keys (key_blob, info, expiry_ms) VALUES (?1, ?2, ?3)",
                    params![
                        entry.key.expose_secret() as &[u8],
                        entry.info,
                        entry.expiry.timestamp_millis()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(id, "saved key generation");
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<KeyEntry>> {
        let limit = i64::try_from(self.query_limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, key_blob, info, expiry_ms FROM encryption_keys
                 ORDER BY expiry_ms DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Zeroizing::new(row.get::<_, Vec<u8>>(1)?),
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;

            let mut keys = Vec::new();
            for row in rows {
                let (id, key_blob, info, expiry_ms) = row?;
                keys.push(decode_row(id, &key_blob, info, expiry_ms)?);
            }
            // Newest first from SQL; callers expect oldest first
            keys.reverse();
            Ok(keys)
        })
        .await
    }
}

fn decode_row(id: i64, key_blob: &[u8], info: Vec<u8>, expiry_ms: i64) -> Result<KeyEntry> {
    let key = MasterKey32::from_slice(key_blob).ok_or_else(|| {
        StoreError::Corrupt(format!("row {id}: key is {} bytes", key_blob.len()))
    })?;
    let expiry = DateTime::from_timestamp_millis(expiry_ms)
        .ok_or_else(|| StoreError::Corrupt(format!("row {id}: expiry out of range")))?;
    Ok(KeyEntry {
        id: Some(id),
        key,
        info,
        expiry,
    })
}

#[cfg(feature = "sqlcipher")]
fn apply_passphrase(conn: &Connection, passphrase: &str) -> Result<()> {
    use crate::consts::DB_KDF_ITERATIONS;

    conn.pragma_update(None, "key", passphrase)?;
    conn.execute_batch(&format!(
        r#"
        PRAGMA cipher_page_size = 4096;
        PRAGMA kdf_iter = {DB_KDF_ITERATIONS};
        PRAGMA cipher_hmac_algorithm = HMAC_SHA512;
        PRAGMA cipher_kdf_algorithm = PBKDF2_HMAC_SHA512;
        "#
    ))?;
    Ok(())
}

#[cfg(not(feature = "sqlcipher"))]
fn apply_passphrase(_conn: &Connection, _passphrase: &str) -> Result<()> {
    tracing::warn!("key store passphrase ignored: built without the `sqlcipher` feature");
    Ok(())
}
