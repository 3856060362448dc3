// src/store/mod.rs
//! Key persistence backends
//!
//! Stores are append-only: managers save each new generation and read back the
//! window they need. Nothing here ever updates or deletes a key.

use async_trait::async_trait;

use crate::error::Result;
use crate::key_ops::KeyEntry;

pub mod memory;
pub mod remote;
pub mod sqlite;

pub use memory::MemoryKeyStore;
pub use remote::RemoteKeyStore;
pub use sqlite::SqliteKeyStore;

/// Durable home of key generations, shared by one issuer and any number of
/// validators.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Append a new generation. Only issuers call this.
    async fn save_key(&self, entry: &KeyEntry) -> Result<()>;

    /// Known generations, ascending by expiry (oldest first).
    async fn get_all_keys(&self) -> Result<Vec<KeyEntry>>;
}
