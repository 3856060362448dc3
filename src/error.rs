// src/error.rs
//! Public error types for the entire crate

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyringError>;

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("key store error: {0}")]
    Store(#[from] StoreError),

    #[error("no keys available in store for validation")]
    NoKeysAvailable,

    #[error("operation not allowed in validation-only mode")]
    RotationForbidden,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token expired at {0}")]
    TokenExpired(DateTime<Utc>),

    #[error("failed to decrypt token with any known key")]
    DecryptionFailed,

    #[error("remote key fetch failed: {0}")]
    RemoteFetch(#[from] RemoteFetchError),

    #[error("header `{0}` is reserved and cannot be overridden")]
    ReservedHeader(String),

    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid key manager configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Persistence failures (disk, database, background worker)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not supported by this key store")]
    Unsupported(&'static str),

    #[error("stored key entry is invalid: {0}")]
    Corrupt(String),

    #[error("store worker failed: {0}")]
    Background(String),
}

/// Failures talking to a key-publishing endpoint
#[derive(Error, Debug)]
pub enum RemoteFetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid key descriptor: {0}")]
    Decode(String),
}

/// Loading or validating `keyring.toml`
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing setting `{0}`")]
    MissingSetting(&'static str),

    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl From<rusqlite::Error> for KeyringError {
    fn from(err: rusqlite::Error) -> Self {
        KeyringError::Store(StoreError::Sql(err))
    }
}
