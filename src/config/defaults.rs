// src/config/defaults.rs
use std::path::PathBuf;

use crate::config::app::{RotationSettings, StoreBackend, StoreSettings, TokenSettings};
use crate::consts::{
    DEFAULT_CACHE_TTL_SECS, DEFAULT_REMOTE_TIMEOUT_SECS, DEFAULT_RETENTION,
    DEFAULT_ROTATION_PERIOD_SECS, DEFAULT_ROTATION_THRESHOLD, DEFAULT_TOKEN_TTL_SECS,
};

pub const DEFAULT_CONFIG_PATH: &str = "keyring.toml";

const APP_DIR: &str = "envelope-keyring";
const DB_FILE: &str = "keys.db";

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_ROTATION_PERIOD_SECS,
            retention: DEFAULT_RETENTION,
            threshold: DEFAULT_ROTATION_THRESHOLD,
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: None,
            sqlite_passphrase: None,
            remote_url: None,
            remote_api_key: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

/// `<data dir>/envelope-keyring/keys.db`, or the working directory when the
/// platform has no data dir
pub fn default_sqlite_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DB_FILE)
}
