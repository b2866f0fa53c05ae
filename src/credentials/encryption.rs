//! AES-256-GCM obfuscation for values kept in local storage.
//!
//! The key is derived from the application origin plus a fixed salt, so it can
//! be re-derived on every start without being stored anywhere. Anyone who knows
//! the origin can derive it too: this keeps tokens away from casual storage
//! inspection, nothing more.
//!
//! Record format: `base64(nonce ‖ ciphertext)` with a fresh 12-byte nonce per
//! call.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Fixed salt appended to the origin before hashing.
const KEY_SALT: &str = "_mutopia_pet_remember_me_v1";

/// Encrypts and decrypts short strings under an origin-derived key.
///
/// The derived key never leaves this type: there is no accessor for it.
#[derive(Clone)]
pub struct Cipher {
    cipher: Aes256Gcm,
}

impl Cipher {
    /// Derives the key as `SHA-256(origin + salt)`.
    pub fn for_origin(origin: &str) -> Self {
        let digest = Sha256::digest(format!("{origin}{KEY_SALT}").as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());

        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypts `plaintext` into a base64 record.
    ///
    /// Empty input is returned as-is. If the cipher ever fails, the plaintext
    /// is returned unchanged and a warning is logged.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }

        match self.try_encrypt(plaintext) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Encryption failed, storing value unencrypted");
                plaintext.to_string()
            }
        }
    }

    /// Decrypts a record produced by [`Cipher::encrypt`].
    ///
    /// Anything that does not decrypt (values written before encryption was
    /// introduced, a changed origin, corrupted or tampered data) comes back
    /// unchanged. Use [`Cipher::try_decrypt`] to treat those cases as errors.
    pub fn decrypt(&self, record: &str) -> String {
        if record.is_empty() {
            return String::new();
        }

        match self.try_decrypt(record) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(error = %e, "Stored value did not decrypt, returning it unchanged");
                record.to_string()
            }
        }
    }

    /// Strict variant of [`Cipher::decrypt`].
    pub fn try_decrypt(&self, record: &str) -> Result<String> {
        let combined = BASE64
            .decode(record)
            .context("Failed to decode base64 record")?;

        if combined.len() < NONCE_SIZE {
            bail!(
                "Record too short: expected at least {} bytes, got {}",
                NONCE_SIZE,
                combined.len()
            );
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext_bytes).context("Decrypted data is not valid UTF-8")
    }

    fn try_encrypt(&self, plaintext: &str) -> Result<String> {
        // Never reuse a nonce
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://mutopia.pet";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = Cipher::for_origin(ORIGIN);
        let plaintext = "eyJhbGciOiJIUzI1NiJ9.access";

        let record = cipher.encrypt(plaintext);
        assert_ne!(record, plaintext);
        assert_eq!(cipher.decrypt(&record), plaintext);
    }

    #[test]
    fn test_record_layout() {
        let cipher = Cipher::for_origin(ORIGIN);
        let record = cipher.encrypt("abc");

        let raw = BASE64.decode(&record).unwrap();
        // nonce + 3 bytes of ciphertext + 16-byte GCM tag
        assert_eq!(raw.len(), NONCE_SIZE + 3 + 16);
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let cipher = Cipher::for_origin(ORIGIN);

        let first = cipher.encrypt("same-plaintext");
        let second = cipher.encrypt("same-plaintext");

        assert_ne!(first, second);
        assert_eq!(cipher.decrypt(&first), "same-plaintext");
        assert_eq!(cipher.decrypt(&second), "same-plaintext");
    }

    #[test]
    fn test_key_is_rederivable() {
        let record = Cipher::for_origin(ORIGIN).encrypt("secret");
        let rederived = Cipher::for_origin(ORIGIN);

        assert_eq!(rederived.try_decrypt(&record).unwrap(), "secret");
    }

    #[test]
    fn test_other_origin_cannot_decrypt() {
        let record = Cipher::for_origin(ORIGIN).encrypt("secret");
        let other = Cipher::for_origin("https://evil.example");

        assert!(other.try_decrypt(&record).is_err());
        // Permissive path hands the record back untouched
        assert_eq!(other.decrypt(&record), record);
    }

    #[test]
    fn test_legacy_plaintext_passes_through() {
        let cipher = Cipher::for_origin(ORIGIN);

        // Written before encryption existed: not base64 at all
        assert_eq!(cipher.decrypt("plain-token!"), "plain-token!");
        // Valid base64 but shorter than a nonce
        assert_eq!(cipher.decrypt("YWJj"), "YWJj");
    }

    #[test]
    fn test_tampered_record_detected() {
        let cipher = Cipher::for_origin(ORIGIN);
        let record = cipher.encrypt("secret");

        let mut raw = BASE64.decode(&record).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        assert!(cipher.try_decrypt(&tampered).is_err());
        assert_eq!(cipher.decrypt(&tampered), tampered);
    }

    #[test]
    fn test_empty_and_unicode() {
        let cipher = Cipher::for_origin(ORIGIN);

        assert_eq!(cipher.encrypt(""), "");
        assert_eq!(cipher.decrypt(&cipher.encrypt("")), "");

        let unicode = "宠物美容🐾✓";
        assert_eq!(cipher.decrypt(&cipher.encrypt(unicode)), unicode);
    }
}
