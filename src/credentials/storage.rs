//! Encrypted view over a [`KeyValueStore`].

use super::encryption::Cipher;
use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Every value written through this store is encrypted on the way in and
/// decrypted on the way out. Keys are stored as given.
#[derive(Clone)]
pub struct EncryptedStore {
    backend: Arc<dyn KeyValueStore>,
    cipher: Cipher,
}

impl EncryptedStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, cipher: Cipher) -> Self {
        Self { backend, cipher }
    }

    /// Encrypts `value` and writes it under `key`.
    pub fn save(&self, key: &str, value: &str) -> Result<()> {
        let record = self.cipher.encrypt(value);
        self.backend
            .set(key, &record)
            .with_context(|| format!("Failed to save encrypted item {key}"))
    }

    /// Reads and decrypts `key`.
    ///
    /// `Ok(None)` means nothing is stored. A stored value that does not
    /// decrypt is returned as-is (see [`Cipher::decrypt`]).
    pub fn load(&self, key: &str) -> Result<Option<String>> {
        let record = self
            .backend
            .get(key)
            .with_context(|| format!("Failed to load encrypted item {key}"))?;

        Ok(record.map(|r| self.cipher.decrypt(&r)))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend
            .remove(key)
            .with_context(|| format!("Failed to remove encrypted item {key}"))
    }
}
