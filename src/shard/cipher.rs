//! Symmetric encryption of shard rows.
//!
//! AES-256-GCM with a fresh 96-bit nonce per row. Each encrypted row is
//! `base64(nonce || ciphertext)`.

use crate::core::{Error, Result};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha3::{Digest, Sha3_256};

const NONCE_LEN: usize = 12;

/// Row cipher keyed by process-wide configuration.
#[derive(Clone)]
pub struct ShardCipher {
    cipher: Aes256Gcm,
}

impl ShardCipher {
    /// Create from raw key bytes.
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Self { cipher }
    }

    /// Derive a key from arbitrary text with SHA3-256.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(passphrase.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self::new(&key)
    }

    /// Encrypt one row of text.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(nonce.as_slice());
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    /// Decrypt one row produced by [`ShardCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Encryption(format!("invalid base64: {}", e)))?;
        if combined.len() < NONCE_LEN {
            return Err(Error::Encryption("ciphertext shorter than nonce".into()));
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|e| Error::Encryption(e.to_string()))
    }
}

impl std::fmt::Debug for ShardCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardCipher").finish_non_exhaustive()
    }
}
