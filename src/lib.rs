// src/lib.rs
//! envelope-keyring: rotating symmetric keys and encrypted envelope tokens
//!
//! Features:
//! - AES-256-GCM envelopes with a per-token HKDF-SHA256 subkey
//! - Scheduled key rotation with a bounded history window
//! - Issuer / validation-only managers over a shared key store
//! - In-memory, SQLite and remote (HTTP) key stores

pub mod aliases;
pub mod config;
pub mod consts;
pub mod crypto;
pub mod error;
pub mod export;
pub mod key_ops;
pub mod manager;
pub mod store;
pub mod token;

// Re-export everything users need at the crate root
pub use aliases::{DerivedKey32, MasterKey32};
pub use config::{load as load_config, open_store, Config};
pub use crypto::{Envelope, TokenHeader};
pub use error::{ConfigError, KeyringError, RemoteFetchError, Result, StoreError};
pub use export::{render_key_descriptors, KeyDescriptor};
pub use key_ops::KeyEntry;
pub use manager::{IssueOptions, KeyManager, KeyManagerConfig, KeyRing, Mode};
pub use store::{KeyStore, MemoryKeyStore, RemoteKeyStore, SqliteKeyStore};
pub use token::TokenService;
