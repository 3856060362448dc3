// src/config/app.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use super::defaults::{default_sqlite_path, DEFAULT_CONFIG_PATH};
use crate::error::ConfigError;
use crate::manager::KeyManagerConfig;

pub const CONFIG_ENV: &str = "EKR_CONFIG";
pub const SQLITE_PATH_ENV: &str = "EKR_SQLITE_PATH";
pub const SQLITE_PASSPHRASE_ENV: &str = "EKR_SQLITE_PASSPHRASE";
pub const REMOTE_URL_ENV: &str = "EKR_REMOTE_URL";
pub const REMOTE_API_KEY_ENV: &str = "EKR_REMOTE_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub rotation: RotationSettings,
    pub tokens: TokenSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationSettings {
    pub period_secs: u64,
    pub retention: usize,
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenSettings {
    /// 0 issues tokens without `exp` unless the caller sets one
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Remote,
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sqlite_path: Option<PathBuf>,
    pub sqlite_passphrase: Option<String>,
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |s: &Option<String>| s.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("StoreSettings")
            .field("backend", &self.backend)
            .field("sqlite_path", &self.sqlite_path)
            .field("sqlite_passphrase", &redacted(&self.sqlite_passphrase))
            .field("remote_url", &self.remote_url)
            .field("remote_api_key", &redacted(&self.remote_api_key))
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl StoreSettings {
    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path.clone().unwrap_or_else(default_sqlite_path)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `EKR_*` overrides through `lookup` (normally `std::env::var`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(SQLITE_PATH_ENV) {
            self.store.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(passphrase) = lookup(SQLITE_PASSPHRASE_ENV) {
            self.store.sqlite_passphrase = Some(passphrase);
        }
        if let Some(url) = lookup(REMOTE_URL_ENV) {
            self.store.remote_url = Some(url);
        }
        if let Some(api_key) = lookup(REMOTE_API_KEY_ENV) {
            self.store.remote_api_key = Some(api_key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation.period_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "rotation.period_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if !(0.0..1.0).contains(&self.rotation.threshold) {
            return Err(ConfigError::Invalid {
                name: "rotation.threshold",
                reason: format!("must be in [0, 1), got {}", self.rotation.threshold),
            });
        }
        if self.store.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "store.timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }
        if self.store.backend == StoreBackend::Remote {
            if self.store.remote_url.is_none() {
                return Err(ConfigError::MissingSetting("store.remote_url"));
            }
            if self.store.remote_api_key.is_none() {
                return Err(ConfigError::MissingSetting("store.remote_api_key"));
            }
        }
        Ok(())
    }

    pub fn manager_config(&self) -> KeyManagerConfig {
        let ttl = self.tokens.default_ttl_secs;
        KeyManagerConfig {
            rotation_period: Duration::from_secs(self.rotation.period_secs),
            retention: self.rotation.retention,
            rotation_threshold: self.rotation.threshold,
            default_token_ttl: (ttl > 0).then(|| Duration::from_secs(ttl)),
        }
    }
}

/// Load `$EKR_CONFIG` (default `keyring.toml`) with env overrides.
///
/// A missing file falls back to built-in defaults; a malformed one is an error.
pub fn load() -> Result<Config, ConfigError> {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_from(path)
}

pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        toml::from_str(&content)?
    } else {
        warn!(path = %path.display(), "Config file not found. Using built-in defaults");
        Config::default()
    };

    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}
