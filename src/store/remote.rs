// src/store/remote.rs
//! Read-only key store backed by a key-publishing endpoint
//!
//! Validators in other processes fetch the issuer's current key window over
//! HTTP (bearer-authenticated) and cache it for a fixed TTL. The endpoint hands
//! out raw key material, so it must only ever be reachable by trusted
//! validators.

use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::KeyStore;
use crate::consts::DEFAULT_REMOTE_TIMEOUT_SECS;
use crate::error::{RemoteFetchError, Result, StoreError};
use crate::export::KeyDescriptor;
use crate::key_ops::{sort_by_expiry, KeyEntry};

struct CachedKeys {
    keys: Vec<KeyEntry>,
    fetched_at: Instant,
}

pub struct RemoteKeyStore {
    remote_url: String,
    api_key: String,
    client: Client,
    cache_ttl: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl RemoteKeyStore {
    /// `remote_url` is fetched with `Authorization: Bearer <api_key>`; results
    /// are reused for `cache_ttl`.
    pub fn new(
        remote_url: impl Into<String>,
        api_key: impl Into<String>,
        cache_ttl: Duration,
    ) -> Result<Self> {
        Self::with_timeout(
            remote_url,
            api_key,
            cache_ttl,
            Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
        )
    }

    pub fn with_timeout(
        remote_url: impl Into<String>,
        api_key: impl Into<String>,
        cache_ttl: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RemoteFetchError::from)?;

        Ok(Self {
            remote_url: remote_url.into(),
            api_key: api_key.into(),
            client,
            cache_ttl,
            cache: RwLock::new(None),
        })
    }

    fn cached(&self) -> Option<Vec<KeyEntry>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
            .map(|cached| cached.keys.clone())
    }

    async fn fetch(&self) -> Result<Vec<KeyEntry>> {
        let response = self
            .client
            .get(&self.remote_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(RemoteFetchError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteFetchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }
            .into());
        }

        let descriptors: Vec<KeyDescriptor> =
            response.json().await.map_err(RemoteFetchError::from)?;

        let mut keys = descriptors
            .into_iter()
            .map(KeyDescriptor::into_entry)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        sort_by_expiry(&mut keys);
        Ok(keys)
    }
}

#[async_trait]
impl KeyStore for RemoteKeyStore {
    async fn save_key(&self, _entry: &KeyEntry) -> Result<()> {
        Err(StoreError::Unsupported("save_key").into())
    }

    async fn get_all_keys(&self) -> Result<Vec<KeyEntry>> {
        if let Some(keys) = self.cached() {
            debug!(count = keys.len(), "serving keys from cache");
            return Ok(keys);
        }

        // Concurrent misses may both fetch; the endpoint is idempotent
        debug!(url = %self.remote_url, "fetching keys from remote service");
        let keys = self.fetch().await?;

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });

        Ok(keys)
    }
}

impl fmt::Debug for RemoteKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteKeyStore")
            .field("remote_url", &self.remote_url)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}
