// src/manager/state.rs
//! Key window and the single-writer state behind a `KeyManager`

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use super::{KeyManagerConfig, Mode};
use crate::error::{KeyringError, Result};
use crate::key_ops::{sort_by_expiry, KeyEntry};
use crate::store::KeyStore;

/// Immutable snapshot of the keys a manager can use.
///
/// `history` is most-recent-first and never longer than the retention limit.
#[derive(Debug, Clone)]
pub struct KeyRing {
    current: KeyEntry,
    history: Vec<KeyEntry>,
}

impl KeyRing {
    pub(crate) fn new(current: KeyEntry) -> Self {
        Self {
            current,
            history: Vec::new(),
        }
    }

    /// Newest entry becomes current, the `retention` before it history.
    /// `None` for an empty store.
    pub(crate) fn from_store(mut keys: Vec<KeyEntry>, retention: usize) -> Option<Self> {
        sort_by_expiry(&mut keys);
        let current = keys.pop()?;
        keys.reverse();
        keys.truncate(retention);
        Some(Self {
            current,
            history: keys,
        })
    }

    /// Window after `next` replaces the current key
    pub(crate) fn rotated(&self, next: KeyEntry, retention: usize) -> Self {
        let mut history = Vec::with_capacity(self.history.len() + 1);
        history.push(self.current.clone());
        history.extend(self.history.iter().cloned());
        history.truncate(retention);
        Self {
            current: next,
            history,
        }
    }

    pub fn current(&self) -> &KeyEntry {
        &self.current
    }

    pub fn history(&self) -> &[KeyEntry] {
        &self.history
    }

    /// Decryption candidates: current key, then history newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        std::iter::once(&self.current).chain(self.history.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

pub(crate) struct Shared {
    ring: RwLock<Arc<KeyRing>>,
    /// Serializes rotation and refresh, held across the store round-trip
    writer: Mutex<()>,
    pub(crate) store: Arc<dyn KeyStore>,
    pub(crate) config: KeyManagerConfig,
    pub(crate) mode: Mode,
}

impl Shared {
    pub(crate) fn new(
        ring: KeyRing,
        store: Arc<dyn KeyStore>,
        config: KeyManagerConfig,
        mode: Mode,
    ) -> Self {
        Self {
            ring: RwLock::new(Arc::new(ring)),
            writer: Mutex::new(()),
            store,
            config,
            mode,
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<KeyRing> {
        Arc::clone(&self.ring.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, ring: KeyRing) -> Arc<KeyRing> {
        let ring = Arc::new(ring);
        *self.ring.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&ring);
        ring
    }

    fn ensure_issuer(&self) -> Result<()> {
        match self.mode {
            Mode::Issuer => Ok(()),
            Mode::ValidatorOnly => Err(KeyringError::RotationForbidden),
        }
    }

    pub(crate) async fn rotate(&self) -> Result<Arc<KeyRing>> {
        self.ensure_issuer()?;
        let _writer = self.writer.lock().await;
        self.rotate_locked().await
    }

    /// Rotate only if the current key is still expired once we hold the
    /// writer lock; a concurrent caller may already have rotated.
    pub(crate) async fn rotate_if_expired(&self) -> Result<Arc<KeyRing>> {
        self.ensure_issuer()?;
        let _writer = self.writer.lock().await;
        let ring = self.snapshot();
        if !ring.current().is_expired_at(Utc::now()) {
            return Ok(ring);
        }
        info!(label = %ring.current().label(), "Current key expired. Rotating before issue...");
        self.rotate_locked().await
    }

    /// Caller holds `writer`. Persist first: a failed save leaves state as is.
    async fn rotate_locked(&self) -> Result<Arc<KeyRing>> {
        let ring = self.snapshot();
        let next = KeyEntry::generate(
            Utc::now(),
            self.config.rotation_period,
            Some(ring.current().expiry),
        );

        self.store.save_key(&next).await?;

        info!(
            fingerprint = %next.fingerprint(),
            label = %next.label(),
            expiry = %next.expiry,
            retired = %ring.current().fingerprint(),
            "Key rotated"
        );
        Ok(self.publish(ring.rotated(next, self.config.retention)))
    }

    pub(crate) async fn refresh(&self) -> Result<Arc<KeyRing>> {
        let _writer = self.writer.lock().await;
        let keys = self.store.get_all_keys().await?;
        let ring =
            KeyRing::from_store(keys, self.config.retention).ok_or(KeyringError::NoKeysAvailable)?;
        info!(
            current = %ring.current().fingerprint(),
            history = ring.history().len(),
            "Keys refreshed from store"
        );
        Ok(self.publish(ring))
    }
}
