// src/token.rs
//! Typed claims on top of the key manager
//!
//! Payloads are JSON. In validation-only mode a token that no known key opens
//! triggers one key refresh and a single retry, so validators pick up an
//! issuer's rotation without polling.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{KeyringError, Result};
use crate::manager::{IssueOptions, KeyManager};

#[derive(Debug, Clone)]
pub struct TokenService {
    manager: Arc<KeyManager>,
}

impl TokenService {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<KeyManager> {
        &self.manager
    }

    /// Serialize `claims` and issue with default options
    pub async fn issue<C: Serialize>(&self, claims: &C) -> Result<String> {
        self.issue_with(claims, &IssueOptions::default()).await
    }

    pub async fn issue_with<C: Serialize>(
        &self,
        claims: &C,
        options: &IssueOptions,
    ) -> Result<String> {
        let payload = serde_json::to_vec(claims)?;
        self.manager.issue(&payload, options).await
    }

    pub async fn validate<C: DeserializeOwned>(&self, token: &str) -> Result<C> {
        let payload = match self.manager.decrypt(token) {
            Err(KeyringError::DecryptionFailed) if self.manager.is_validation_only() => {
                debug!("No known key opened the token. Refreshing keys and retrying...");
                self.manager.refresh_keys().await?;
                self.manager.decrypt(token)?
            }
            other => other?,
        };
        Ok(serde_json::from_slice(&payload)?)
    }
}
