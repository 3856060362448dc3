// src/crypto/encrypt.rs
use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde_json::Value;

use super::derive::{derive_subkey, generate_salt};
use super::envelope::{Envelope, TokenHeader};
use crate::consts::{NONCE_LEN, TAG_LEN};
use crate::error::Result;
use crate::key_ops::KeyEntry;

/// Seal `payload` under a fresh subkey of `master` → compact token.
///
/// The salt and nonce are generated here and never accepted from callers.
pub fn seal(
    master: &KeyEntry,
    payload: &[u8],
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    custom: BTreeMap<String, Value>,
) -> Result<String> {
    let salt = generate_salt();
    let subkey = derive_subkey(&master.key, &salt, &master.info);

    let header = TokenHeader {
        salt,
        kid: master.info.clone(),
        issued_at,
        expires_at,
        custom,
    };

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    // Header first: its encoded form is the associated data
    let mut envelope = Envelope::new(header, nonce, Vec::new(), [0u8; TAG_LEN])?;

    let cipher = Aes256Gcm::new(subkey.expose_secret().into());
    let Ok(mut sealed) = cipher.encrypt(
        Nonce::from_slice(&nonce),
        Payload {
            msg: payload,
            aad: envelope.aad(),
        },
    ) else {
        unreachable!("AES-256-GCM encryption cannot fail for in-memory payloads");
    };

    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    envelope.tag.copy_from_slice(&tag);
    envelope.ciphertext = sealed;

    Ok(envelope.to_compact())
}
