// src/manager/mod.rs
//! Key manager: owns the key window, issues and opens tokens
//!
//! An *issuer* generates keys, persists them and rotates on a schedule. A
//! *validator* only reads keys that an issuer published through a shared
//! store and never writes.
//!
//! Readers work on an immutable [`KeyRing`] snapshot, so decryption never
//! waits on a rotation in flight. Rotation and refresh are serialized and
//! swap the snapshot only after the store round-trip succeeds.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::consts::{
    DEFAULT_RETENTION, DEFAULT_ROTATION_PERIOD_SECS, DEFAULT_ROTATION_THRESHOLD,
    DEFAULT_TOKEN_TTL_SECS, RESERVED_HEADERS,
};
use crate::crypto::{check_expiry, open, seal, Envelope, TokenHeader};
use crate::error::{KeyringError, Result};
use crate::export::KeyDescriptor;
use crate::key_ops::{add_duration, ceil_to_second, KeyEntry};
use crate::store::KeyStore;

mod schedule;
mod state;

use schedule::RotationTask;
use state::Shared;
pub use state::KeyRing;

/// Longest accepted rotation period (about a century)
const MAX_ROTATION_PERIOD: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Issuer,
    ValidatorOnly,
}

#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Key lifetime and interval of the background rotation
    pub rotation_period: Duration,
    /// Historical keys kept next to the current one
    pub retention: usize,
    /// Rotate at issuer startup when less than this fraction of the period
    /// remains on the current key
    pub rotation_threshold: f64,
    /// Token lifetime when `IssueOptions::expires_in` is unset. `None`
    /// issues tokens without `exp`.
    pub default_token_ttl: Option<Duration>,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            rotation_period: Duration::from_secs(DEFAULT_ROTATION_PERIOD_SECS),
            retention: DEFAULT_RETENTION,
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            default_token_ttl: Some(Duration::from_secs(DEFAULT_TOKEN_TTL_SECS)),
        }
    }
}

impl KeyManagerConfig {
    pub fn with_rotation_period(mut self, period: Duration) -> Self {
        self.rotation_period = period;
        self
    }

    pub fn with_default_token_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_token_ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rotation_period.is_zero() {
            return Err(KeyringError::InvalidConfig(
                "rotation period must be greater than zero".into(),
            ));
        }
        if self.rotation_period > MAX_ROTATION_PERIOD {
            return Err(KeyringError::InvalidConfig(format!(
                "rotation period of {}s is too long",
                self.rotation_period.as_secs()
            )));
        }
        if !(0.0..1.0).contains(&self.rotation_threshold) {
            return Err(KeyringError::InvalidConfig(format!(
                "rotation threshold must be in [0, 1), got {}",
                self.rotation_threshold
            )));
        }
        Ok(())
    }
}

/// Per-token issue settings
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    /// Overrides the manager's default token lifetime
    pub expires_in: Option<Duration>,
    /// Extra header fields; reserved names are rejected
    pub extra_headers: BTreeMap<String, Value>,
}

impl IssueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }
}

pub struct KeyManager {
    shared: Arc<Shared>,
    rotation: Mutex<Option<RotationTask>>,
}

impl KeyManager {
    /// Issuer over `store`: loads the newest keys, generates the first one
    /// on an empty store, and starts scheduled rotation.
    ///
    /// Must be called within a tokio runtime.
    pub async fn issuer(store: Arc<dyn KeyStore>, config: KeyManagerConfig) -> Result<Self> {
        config.validate()?;
        let now = Utc::now();

        let ring = match KeyRing::from_store(store.get_all_keys().await?, config.retention) {
            Some(ring) => ring,
            None => {
                info!("No existing keys found. Generating initial key...");
                let first = KeyEntry::generate(now, config.rotation_period, None);
                store.save_key(&first).await?;
                KeyRing::new(first)
            }
        };

        let remaining = ring.current().remaining_at(now);
        let threshold = config.rotation_period.mul_f64(config.rotation_threshold);
        let shared = Arc::new(Shared::new(ring, store, config, Mode::Issuer));

        if remaining <= threshold {
            warn!(
                remaining_secs = remaining.as_secs(),
                "Current key is close to expiry. Rotating at startup..."
            );
            shared.rotate().await?;
        }

        let ring = shared.snapshot();
        info!(
            current = %ring.current().fingerprint(),
            expiry = %ring.current().expiry,
            history = ring.history().len(),
            "Key manager started as issuer"
        );

        let task = RotationTask::spawn(&shared);
        Ok(Self {
            shared,
            rotation: Mutex::new(Some(task)),
        })
    }

    /// Read-only manager over keys published by an issuer.
    ///
    /// Fails with `NoKeysAvailable` on an empty store; starts no background
    /// work.
    pub async fn validator(store: Arc<dyn KeyStore>, config: KeyManagerConfig) -> Result<Self> {
        config.validate()?;
        let ring = KeyRing::from_store(store.get_all_keys().await?, config.retention)
            .ok_or(KeyringError::NoKeysAvailable)?;

        info!(
            current = %ring.current().fingerprint(),
            history = ring.history().len(),
            "Key manager started in validation-only mode"
        );

        Ok(Self {
            shared: Arc::new(Shared::new(ring, store, config, Mode::ValidatorOnly)),
            rotation: Mutex::new(None),
        })
    }

    pub fn mode(&self) -> Mode {
        self.shared.mode
    }

    pub fn is_validation_only(&self) -> bool {
        self.shared.mode == Mode::ValidatorOnly
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.shared.config
    }

    /// Encrypt `payload` under the current key.
    ///
    /// An expired current key is rotated first.
    pub async fn issue(&self, payload: &[u8], options: &IssueOptions) -> Result<String> {
        if self.is_validation_only() {
            return Err(KeyringError::RotationForbidden);
        }
        if let Some(name) = options
            .extra_headers
            .keys()
            .find(|name| RESERVED_HEADERS.contains(&name.as_str()))
        {
            return Err(KeyringError::ReservedHeader(name.clone()));
        }

        let mut ring = self.shared.snapshot();
        if ring.current().is_expired_at(Utc::now()) {
            ring = self.shared.rotate_if_expired().await?;
        }

        // `exp` is serialized in whole seconds, never earlier than requested
        let now = Utc::now();
        let expires_at = options
            .expires_in
            .or(self.shared.config.default_token_ttl)
            .map(|ttl| ceil_to_second(add_duration(now, ttl)));

        seal(
            ring.current(),
            payload,
            now,
            expires_at,
            options.extra_headers.clone(),
        )
    }

    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        self.decrypt_with_header(token).map(|(_, payload)| payload)
    }

    /// Open `token` with the current key, then history newest to oldest.
    ///
    /// Structure and expiry are checked before any key is tried.
    pub fn decrypt_with_header(&self, token: &str) -> Result<(TokenHeader, Vec<u8>)> {
        let envelope = Envelope::parse(token)?;
        check_expiry(&envelope.header, Utc::now())?;

        let ring = self.shared.snapshot();
        let payload = open(&envelope, ring.iter())?;
        Ok((envelope.header, payload))
    }

    /// Generate, persist and switch to a new key. Issuer only.
    pub async fn rotate_key(&self) -> Result<()> {
        self.shared.rotate().await.map(|_| ())
    }

    /// Reload the key window from the store.
    ///
    /// A failed refresh keeps the previous keys in place.
    pub async fn refresh_keys(&self) -> Result<()> {
        self.shared.refresh().await.map(|_| ())
    }

    /// Current key followed by history, newest first
    pub fn current_keys(&self) -> Vec<KeyEntry> {
        self.shared.snapshot().iter().cloned().collect()
    }

    pub fn key_ring(&self) -> Arc<KeyRing> {
        self.shared.snapshot()
    }

    /// Current window in the publishing format read by `RemoteKeyStore`.
    ///
    /// Contains raw key material.
    pub fn published_keys(&self) -> Vec<KeyDescriptor> {
        self.shared
            .snapshot()
            .iter()
            .map(KeyDescriptor::from_entry)
            .collect()
    }

    /// Stop scheduled rotation and wait for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        let task = self
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop().await;
        }
    }
}

impl Drop for KeyManager {
    fn drop(&mut self) {
        let task = self
            .rotation
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.shared.snapshot();
        f.debug_struct("KeyManager")
            .field("mode", &self.shared.mode)
            .field("current", &ring.current().fingerprint())
            .field("history", &ring.history().len())
            .finish_non_exhaustive()
    }
}
