// src/store/memory.rs
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::KeyStore;
use crate::error::Result;
use crate::key_ops::{sort_by_expiry, KeyEntry};

/// Process-local store; keys are lost on exit
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<Vec<KeyEntry>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn save_key(&self, entry: &KeyEntry) -> Result<()> {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<KeyEntry>> {
        let mut copied = self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sort_by_expiry(&mut copied);
        Ok(copied)
    }
}
