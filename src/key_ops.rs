// src/key_ops.rs
//! Key generation and key-entry metadata
//!
//! A [`KeyEntry`] is one generation of master key material together with its
//! label (used as the HKDF `info`) and expiry.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::aliases::MasterKey32;
use crate::consts::KEY_LABEL_PREFIX;

/// One generation of symmetric key material
#[derive(Debug, Clone)]
pub struct KeyEntry {
    /// Assigned by backends that number their rows (SQLite, remote descriptors)
    pub id: Option<i64>,
    pub key: MasterKey32,
    pub info: Vec<u8>,
    pub expiry: DateTime<Utc>,
}

impl KeyEntry {
    pub fn new(key: MasterKey32, info: Vec<u8>, expiry: DateTime<Utc>) -> Self {
        Self {
            id: None,
            key,
            info,
            expiry,
        }
    }

    /// Fresh random generation valid for `period` from `now`.
    ///
    /// The expiry never falls at or before `previous_expiry`, so generations
    /// from one manager are strictly ordered even within the same millisecond.
    pub fn generate(
        now: DateTime<Utc>,
        period: Duration,
        previous_expiry: Option<DateTime<Utc>>,
    ) -> Self {
        let mut expiry = add_duration(now, period);
        if let Some(previous) = previous_expiry {
            if expiry <= previous {
                expiry = previous + TimeDelta::milliseconds(1);
            }
        }
        Self::new(generate_key(), key_label(now), expiry)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    /// Remaining lifetime; zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expiry - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Short BLAKE3 fingerprint, safe to log
    pub fn fingerprint(&self) -> String {
        let mut hex = blake3::hash(self.key.expose_secret()).to_hex().to_string();
        hex.truncate(16);
        hex
    }

    pub fn label(&self) -> String {
        String::from_utf8_lossy(&self.info).into_owned()
    }
}

/// Generate a new random 256-bit master key
#[inline]
pub fn generate_key() -> MasterKey32 {
    MasterKey32::random()
}

/// `encryption-key-<unix millis>`
pub fn key_label(now: DateTime<Utc>) -> Vec<u8> {
    format!("{KEY_LABEL_PREFIX}{}", now.timestamp_millis()).into_bytes()
}

/// Saturating `t + d`
pub(crate) fn add_duration(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Round up to a whole second; token headers carry unix seconds
pub(crate) fn ceil_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    if t.timestamp_subsec_nanos() == 0 {
        return t;
    }
    DateTime::from_timestamp(t.timestamp().saturating_add(1), 0).unwrap_or(t)
}

/// Sort ascending by expiry, oldest first
pub(crate) fn sort_by_expiry(keys: &mut [KeyEntry]) {
    keys.sort_by_key(|entry| entry.expiry);
}
