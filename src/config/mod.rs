// src/config/mod.rs
//! Configuration for envelope-keyring
//!
//! TOML file + `EKR_*` env overrides, plus the glue that turns settings into
//! a running key store.

use std::sync::Arc;

use tracing::info;

use crate::consts::DEFAULT_RETENTION;
use crate::error::{ConfigError, Result};
use crate::store::{KeyStore, MemoryKeyStore, RemoteKeyStore, SqliteKeyStore};

pub use app::{
    load, load_from, Config, RotationSettings, StoreBackend, StoreSettings, TokenSettings,
    CONFIG_ENV, REMOTE_API_KEY_ENV, REMOTE_URL_ENV, SQLITE_PASSPHRASE_ENV, SQLITE_PATH_ENV,
};
pub use defaults::{default_sqlite_path, DEFAULT_CONFIG_PATH};

mod app;
mod defaults;

/// Build the configured backend
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn KeyStore>> {
    open_store_with_retention(settings, DEFAULT_RETENTION)
}

/// Like [`open_store`], with SQLite reads sized for `retention` history keys
pub fn open_store_with_retention(
    settings: &StoreSettings,
    retention: usize,
) -> Result<Arc<dyn KeyStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            info!("Using in-memory key store");
            Ok(Arc::new(MemoryKeyStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = settings.sqlite_path();
            info!(path = %path.display(), "Opening SQLite key store");
            let store = SqliteKeyStore::open(&path, settings.sqlite_passphrase.as_deref())?
                .with_query_limit(retention.saturating_add(1));
            Ok(Arc::new(store))
        }
        StoreBackend::Remote => {
            let url = settings
                .remote_url
                .as_deref()
                .ok_or(ConfigError::MissingSetting("store.remote_url"))?;
            let api_key = settings
                .remote_api_key
                .as_deref()
                .ok_or(ConfigError::MissingSetting("store.remote_api_key"))?;
            info!(url, "Using remote key store");
            Ok(Arc::new(RemoteKeyStore::with_timeout(
                url,
                api_key,
                settings.cache_ttl(),
                settings.timeout(),
            )?))
        }
    }
}

impl Config {
    /// Configured store, sized for this config's retention
    pub fn open_store(&self) -> Result<Arc<dyn KeyStore>> {
        open_store_with_retention(&self.store, self.rotation.retention)
    }
}
