// src/crypto/envelope.rs
//! Compact token wire format
//!
//! `b64url(header) "." b64url(nonce) "." b64url(ciphertext) "." b64url(tag)`,
//! unpadded URL-safe base64 throughout. The encoded header segment is the AEAD
//! associated data, so any edit to it fails authentication.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consts::{HEADER_ALG, HEADER_ENC, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::{KeyringError, Result};

/// Protected header of a token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHeader {
    pub salt: [u8; SALT_LEN],
    /// Label (`info`) of the master key that sealed the token
    pub kid: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Caller-supplied fields, plus any field this version does not know
    pub custom: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct RawHeader {
    alg: String,
    enc: String,
    salt: String,
    kid: String,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(flatten)]
    custom: BTreeMap<String, Value>,
}

impl TokenHeader {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        let raw = RawHeader {
            alg: HEADER_ALG.to_string(),
            enc: HEADER_ENC.to_string(),
            salt: URL_SAFE_NO_PAD.encode(self.salt),
            kid: URL_SAFE_NO_PAD.encode(&self.kid),
            iat: self.issued_at.timestamp(),
            exp: self.expires_at.map(|exp| exp.timestamp()),
            custom: self.custom.clone(),
        };
        Ok(serde_json::to_vec(&raw)?)
    }

    fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawHeader = serde_json::from_slice(bytes)
            .map_err(|e| malformed(format!("invalid header: {e}")))?;

        if raw.alg != HEADER_ALG || raw.enc != HEADER_ENC {
            return Err(malformed(format!(
                "unsupported algorithm {}/{}",
                raw.alg, raw.enc
            )));
        }

        let salt = decode_segment(&raw.salt, "salt")?;
        let salt = <[u8; SALT_LEN]>::try_from(salt.as_slice())
            .map_err(|_| malformed(format!("salt must be {SALT_LEN} bytes")))?;

        Ok(Self {
            salt,
            kid: decode_segment(&raw.kid, "kid")?,
            issued_at: timestamp(raw.iat, "iat")?,
            expires_at: raw.exp.map(|exp| timestamp(exp, "exp")).transpose()?,
            custom: raw.custom,
        })
    }
}

/// A parsed token
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header: TokenHeader,
    /// Header exactly as it travelled; authenticated as associated data
    header_segment: String,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl Envelope {
    pub(crate) fn new(
        header: TokenHeader,
        nonce: [u8; NONCE_LEN],
        ciphertext: Vec<u8>,
        tag: [u8; TAG_LEN],
    ) -> Result<Self> {
        let header_segment = URL_SAFE_NO_PAD.encode(header.to_json()?);
        Ok(Self {
            header,
            header_segment,
            nonce,
            ciphertext,
            tag,
        })
    }

    /// Split and decode a compact token. Cryptographic validity is not checked.
    pub fn parse(token: &str) -> Result<Self> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(nonce), Some(ciphertext), Some(tag), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed("expected 4 dot-separated segments"));
        };

        let header_json = decode_segment(header, "header")?;
        let nonce = decode_segment(nonce, "nonce")?;
        let tag = decode_segment(tag, "tag")?;

        Ok(Self {
            header: TokenHeader::from_json(&header_json)?,
            header_segment: header.to_string(),
            nonce: <[u8; NONCE_LEN]>::try_from(nonce.as_slice())
                .map_err(|_| malformed(format!("nonce must be {NONCE_LEN} bytes")))?,
            ciphertext: decode_segment(ciphertext, "ciphertext")?,
            tag: <[u8; TAG_LEN]>::try_from(tag.as_slice())
                .map_err(|_| malformed(format!("tag must be {TAG_LEN} bytes")))?,
        })
    }

    pub fn to_compact(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.header_segment,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
            URL_SAFE_NO_PAD.encode(self.tag),
        )
    }

    pub(crate) fn aad(&self) -> &[u8] {
        self.header_segment.as_bytes()
    }
}

fn malformed(reason: impl Into<String>) -> KeyringError {
    KeyringError::MalformedToken(reason.into())
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| malformed(format!("{what} is not base64url: {e}")))
}

fn timestamp(secs: i64, what: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| malformed(format!("{what} out of range")))
}
