//! Key derivation and authenticated encryption for at-rest secrets.
//!
//! This module provides:
//! - Per-purpose symmetric keys derived with PBKDF2-HMAC-SHA256 and cached
//!   for the process lifetime
//! - ChaCha20-Poly1305 sealing of UTF-8 plaintext, stored as
//!   base64(nonce || ciphertext)
//!
//! The salt for each purpose is a deterministic hash of the purpose id
//! itself, so decryption never needs a separately stored salt. Derived
//! keys are never persisted; they are re-derived on every cold start.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::device::DeviceIdentity;
use crate::store::SecretStore;

/// PBKDF2 iteration count for purpose-key derivation.
const KDF_ITERATIONS: u32 = 100_000;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
const KEY_SIZE: usize = 32;

/// Storage key for the generated seed on platforms without a stable
/// device identity.
const SEED_RECORD: &str = "encryption_seed";

#[derive(Error, Debug)]
pub enum CryptoError {
    /// The ciphertext failed authentication under the purpose key.
    #[error("ciphertext failed authentication")]
    DecryptionFailed,

    /// The stored value is not decodable as nonce-prefixed ciphertext.
    #[error("stored value is not valid ciphertext")]
    InvalidCiphertext,

    #[error("cipher failure: {0}")]
    Cipher(String),
}

pub struct CryptoService {
    seed: Vec<u8>,
    keys: Mutex<HashMap<String, [u8; KEY_SIZE]>>,
}

impl CryptoService {
    /// Build a service keyed to this device's identity.
    pub fn with_device_seed() -> Self {
        Self::from_seed(DeviceIdentity::compute().into_bytes())
    }

    /// Build a service keyed to a random seed persisted through `store`.
    /// The seed is generated on first use.
    pub fn with_stored_seed(store: &dyn SecretStore) -> Self {
        let seed = match store.read(SEED_RECORD) {
            Some(existing) => existing,
            None => {
                let mut raw = [0u8; KEY_SIZE];
                rand::thread_rng().fill_bytes(&mut raw);
                let encoded = STANDARD.encode(raw);
                store.write(SEED_RECORD, &encoded);
                encoded
            }
        };
        Self::from_seed(seed.into_bytes())
    }

    /// Select the seeding strategy for the current platform: device-bound
    /// on native targets, generated-and-persisted elsewhere.
    pub fn for_platform(store: &dyn SecretStore) -> Self {
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            Self::with_device_seed()
        } else {
            Self::with_stored_seed(store)
        }
    }

    pub(crate) fn from_seed(seed: Vec<u8>) -> Self {
        Self {
            seed,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Derive (or fetch the cached) key for a purpose. Idempotent within a
    /// process: the same purpose always yields the identical key.
    fn purpose_key(&self, purpose: &str) -> [u8; KEY_SIZE] {
        let mut keys = self.keys.lock().expect("crypto key cache poisoned");
        if let Some(key) = keys.get(purpose) {
            return *key;
        }

        let salt = Sha256::digest(purpose.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(&self.seed, salt.as_slice(), KDF_ITERATIONS, &mut key);
        keys.insert(purpose.to_string(), key);
        key
    }

    /// Seal `plaintext` under the purpose key with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str, purpose: &str) -> Result<String, CryptoError> {
        let key = self.purpose_key(purpose);
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Open a value produced by [`encrypt`](Self::encrypt). Authentication
    /// failure is reported as [`CryptoError::DecryptionFailed`]; callers
    /// migrating pre-encryption records catch it and treat the stored
    /// value as plaintext.
    pub fn decrypt(&self, encoded: &str, purpose: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidCiphertext)?;
        if raw.len() <= NONCE_SIZE {
            return Err(CryptoError::InvalidCiphertext);
        }
        let (nonce, sealed) = raw.split_at(NONCE_SIZE);

        let key = self.purpose_key(purpose);
        let cipher = ChaCha20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::Cipher(e.to_string()))?;

        let plain = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailed)
    }

    #[cfg(test)]
    pub(crate) fn derived_key_for(&self, purpose: &str) -> [u8; KEY_SIZE] {
        self.purpose_key(purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CryptoService {
        CryptoService::from_seed(b"test-seed".to_vec())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypto = service();
        let sealed = crypto.encrypt("top secret", "auth_token").unwrap();
        assert_ne!(sealed, "top secret");
        assert_eq!(crypto.decrypt(&sealed, "auth_token").unwrap(), "top secret");
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let crypto = service();
        let first = crypto.encrypt("same input", "auth_token").unwrap();
        let second = crypto.encrypt("same input", "auth_token").unwrap();
        assert_ne!(first, second);
        assert_eq!(crypto.decrypt(&first, "auth_token").unwrap(), "same input");
        assert_eq!(crypto.decrypt(&second, "auth_token").unwrap(), "same input");
    }

    #[test]
    fn test_wrong_purpose_fails() {
        let crypto = service();
        let sealed = crypto.encrypt("secret", "auth_token").unwrap();
        assert!(matches!(
            crypto.decrypt(&sealed, "offline_auth"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let crypto = service();
        let sealed = crypto.encrypt("secret", "auth_token").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert!(matches!(
            crypto.decrypt(&tampered, "auth_token"),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_garbage_input_is_invalid_ciphertext() {
        let crypto = service();
        assert!(matches!(
            crypto.decrypt("not base64!!", "auth_token"),
            Err(CryptoError::InvalidCiphertext)
        ));
        // decodes, but too short to hold a nonce
        assert!(matches!(
            crypto.decrypt("AAAA", "auth_token"),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn test_key_derivation_is_idempotent() {
        let crypto = service();
        assert_eq!(
            crypto.derived_key_for("auth_token"),
            crypto.derived_key_for("auth_token")
        );
    }

    #[test]
    fn test_purposes_get_distinct_keys() {
        let crypto = service();
        assert_ne!(
            crypto.derived_key_for("auth_token"),
            crypto.derived_key_for("offline_auth")
        );
    }

    #[test]
    fn test_different_seeds_cannot_read_each_other() {
        let a = CryptoService::from_seed(b"seed-a".to_vec());
        let b = CryptoService::from_seed(b"seed-b".to_vec());
        let sealed = a.encrypt("secret", "auth_token").unwrap();
        assert!(b.decrypt(&sealed, "auth_token").is_err());
    }
}
