//! Encrypted credential storage for the session tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenStore                         │
//! │  - access / refresh get, set, clear      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       EncryptedStore + Cipher            │
//! │  - AES-256-GCM, origin-derived key       │
//! │  - fresh nonce per write                 │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       KeyValueStore                      │
//! │  - memory or SQLite                      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use mutopia::credentials::{Cipher, TokenPair, TokenStore};
//! use mutopia::storage::SqliteStore;
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let backend = Arc::new(SqliteStore::open("session.db")?);
//! let tokens = TokenStore::new(backend, Cipher::for_origin("https://mutopia.pet"));
//!
//! tokens.store_pair(&TokenPair {
//!     access: "access".to_string(),
//!     refresh: "refresh".to_string(),
//! })?;
//! assert_eq!(tokens.access_token().as_deref(), Some("access"));
//!
//! tokens.clear_all()?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::storage::KeyValueStore;

mod encryption;
mod storage;

pub use encryption::Cipher;
pub use storage::EncryptedStore;

/// Storage keys. Deliberately short and non-descriptive so an inspected
/// store does not advertise what it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    /// Serialized profile of the signed-in user
    UserInfo,
    /// "Remember me" login form values
    RememberedEmail,
    RememberedPassword,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::AccessToken => "at",
            StorageKey::RefreshToken => "rt",
            StorageKey::UserInfo => "ui",
            StorageKey::RememberedEmail => "re",
            StorageKey::RememberedPassword => "rp",
        }
    }
}

/// Access/refresh pair as issued by the login and refresh endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Typed access to the stored session tokens.
///
/// Reads never fail: a backend error is logged and reported as "no token",
/// which sends the caller down the same path as a logged-out session.
#[derive(Clone)]
pub struct TokenStore {
    store: EncryptedStore,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, cipher: Cipher) -> Self {
        Self {
            store: EncryptedStore::new(backend, cipher),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.item(StorageKey::AccessToken)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.item(StorageKey::RefreshToken)
    }

    /// `None` removes the entry.
    pub fn set_access_token(&self, token: Option<&str>) -> Result<()> {
        self.set_item(StorageKey::AccessToken, token)
    }

    /// `None` removes the entry.
    pub fn set_refresh_token(&self, token: Option<&str>) -> Result<()> {
        self.set_item(StorageKey::RefreshToken, token)
    }

    /// Any stored entry, decrypted. An empty value counts as absent.
    pub fn item(&self, key: StorageKey) -> Option<String> {
        match self.store.load(key.as_str()) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "Failed to read stored item");
                None
            }
        }
    }

    /// `None` removes the entry.
    pub fn set_item(&self, key: StorageKey, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.store.save(key.as_str(), value),
            None => self.store.remove(key.as_str()),
        }
    }

    pub fn store_pair(&self, pair: &TokenPair) -> Result<()> {
        self.set_access_token(Some(&pair.access))?;
        self.set_refresh_token(Some(&pair.refresh))
    }

    /// Removes both tokens.
    ///
    /// The two removals are independent writes. Both are attempted even if the
    /// first fails; the first error is returned.
    pub fn clear_all(&self) -> Result<()> {
        let access = self.set_access_token(None);
        let refresh = self.set_refresh_token(None);
        access.and(refresh)
    }
}
