// src/crypto/decrypt.rs
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::derive::derive_subkey;
use super::envelope::{Envelope, TokenHeader};
use crate::error::{KeyringError, Result};
use crate::key_ops::KeyEntry;

/// `TokenExpired` when the header carries an elapsed `exp`
pub fn check_expiry(header: &TokenHeader, now: DateTime<Utc>) -> Result<()> {
    match header.expires_at {
        Some(exp) if now > exp => Err(KeyringError::TokenExpired(exp)),
        _ => Ok(()),
    }
}

/// Try one master key. `None` on any authentication failure.
pub fn open_with(envelope: &Envelope, candidate: &KeyEntry) -> Option<Vec<u8>> {
    let subkey = derive_subkey(&candidate.key, &envelope.header.salt, &candidate.info);
    let cipher = Aes256Gcm::new(subkey.expose_secret().into());

    let mut sealed = Vec::with_capacity(envelope.ciphertext.len() + envelope.tag.len());
    sealed.extend_from_slice(&envelope.ciphertext);
    sealed.extend_from_slice(&envelope.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &sealed,
                aad: envelope.aad(),
            },
        )
        .ok()
}

/// Try every candidate in order; the first that authenticates wins.
///
/// Individual misses are not reported, only the aggregate `DecryptionFailed`.
pub fn open<'a>(
    envelope: &Envelope,
    candidates: impl IntoIterator<Item = &'a KeyEntry>,
) -> Result<Vec<u8>> {
    for candidate in candidates {
        if let Some(plaintext) = open_with(envelope, candidate) {
            return Ok(plaintext);
        }
        debug!(fingerprint = %candidate.fingerprint(), "token did not open with candidate key");
    }
    Err(KeyringError::DecryptionFailed)
}
