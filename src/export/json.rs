// src/export/json.rs
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroizing;

use crate::aliases::MasterKey32;
use crate::error::{RemoteFetchError, Result, StoreError};
use crate::key_ops::KeyEntry;

/// One published key generation: `{ id?, key, info, expiry }`.
///
/// `key` and `info` are standard base64. `expiry` is written as RFC 3339 and
/// read from either RFC 3339 or unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub key: String,
    pub info: String,
    #[serde(deserialize_with = "expiry_from_any")]
    pub expiry: DateTime<Utc>,
}

impl KeyDescriptor {
    pub fn from_entry(entry: &KeyEntry) -> Self {
        Self {
            id: entry.id,
            key: STANDARD.encode(entry.key.expose_secret()),
            info: STANDARD.encode(&entry.info),
            expiry: entry.expiry,
        }
    }

    pub fn into_entry(self) -> std::result::Result<KeyEntry, RemoteFetchError> {
        let raw_key = Zeroizing::new(
            STANDARD
                .decode(&self.key)
                .map_err(|e| RemoteFetchError::Decode(format!("failed to decode key: {e}")))?,
        );
        let key = MasterKey32::from_slice(&raw_key).ok_or_else(|| {
            RemoteFetchError::Decode(format!("key must be 32 bytes, got {}", raw_key.len()))
        })?;
        let info = STANDARD
            .decode(&self.info)
            .map_err(|e| RemoteFetchError::Decode(format!("failed to decode info: {e}")))?;

        Ok(KeyEntry {
            id: self.id,
            key,
            info,
            expiry: self.expiry,
        })
    }
}

fn expiry_from_any<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<DateTime<Utc>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawExpiry {
        Text(DateTime<Utc>),
        Epoch(i64),
    }

    match RawExpiry::deserialize(deserializer)? {
        RawExpiry::Text(expiry) => Ok(expiry),
        RawExpiry::Epoch(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| D::Error::custom("expiry out of range")),
    }
}

/// Render the key-publishing payload consumed by `RemoteKeyStore`.
///
/// SECURITY WARNING: the output contains raw key material.
pub fn render_key_descriptors(keys: &[KeyEntry]) -> Result<String> {
    let descriptors: Vec<KeyDescriptor> = keys.iter().map(KeyDescriptor::from_entry).collect();
    Ok(serde_json::to_string_pretty(&descriptors)?)
}

/// Write the key-publishing payload to `path`
pub fn export_to_json<P: AsRef<Path>>(path: P, keys: &[KeyEntry]) -> Result<()> {
    let rendered = Zeroizing::new(render_key_descriptors(keys)?);
    std::fs::write(path, rendered.as_bytes()).map_err(StoreError::Io)?;
    Ok(())
}
