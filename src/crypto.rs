//! Authenticated encryption for provider credentials at rest.
//!
//! Ciphertext layout is a random 96-bit nonce followed by the AES-256-GCM
//! output (ciphertext + tag). The key is derived deterministically from the
//! configured master secret, so the same secret decrypts anything it
//! encrypted; rotating the secret invalidates stored ciphertexts.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master encryption key is not configured")]
    MissingMasterKey,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("ciphertext is invalid or was encrypted with a different key")]
    InvalidCiphertext,
}

/// Symmetric cipher for provider API keys. Operations fail closed when no
/// master secret is configured; the service never stores plaintext silently.
pub struct CredentialCipher {
    key: Option<[u8; 32]>,
}

impl CredentialCipher {
    pub fn new(master_secret: &str) -> Self {
        let key = if master_secret.is_empty() {
            None
        } else {
            let digest = Sha256::digest(master_secret.as_bytes());
            let mut key = [0u8; 32];
            key.copy_from_slice(&digest);
            Some(key)
        };
        Self { key }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::MissingMasterKey)?;
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let nonce_ga = GenericArray::from_slice(&nonce);

        let ciphertext = cipher
            .encrypt(nonce_ga, plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut blob = nonce.to_vec();
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<String, CryptoError> {
        let key = self.key.as_ref().ok_or(CryptoError::MissingMasterKey)?;

        if blob.len() < NONCE_LEN {
            return Err(CryptoError::InvalidCiphertext);
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        let nonce_ga = GenericArray::from_slice(nonce);

        let plaintext = cipher
            .decrypt(nonce_ga, ciphertext)
            .map_err(|_| CryptoError::InvalidCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidCiphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cipher = CredentialCipher::new("test-master-secret");
        for len in [1usize, 7, 16, 64, 256] {
            let plaintext = "k".repeat(len);
            let blob = cipher.encrypt(&plaintext).unwrap();
            assert_ne!(blob, plaintext.as_bytes());
            assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_same_secret_new_instance_decrypts() {
        let blob = CredentialCipher::new("secret").encrypt("sk-abc123").unwrap();
        let decrypted = CredentialCipher::new("secret").decrypt(&blob).unwrap();
        assert_eq!(decrypted, "sk-abc123");
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = CredentialCipher::new("secret-a").encrypt("sk-abc123").unwrap();
        let result = CredentialCipher::new("secret-b").decrypt(&blob);
        assert!(matches!(result, Err(CryptoError::InvalidCiphertext)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = CredentialCipher::new("secret");
        let mut blob = cipher.encrypt("sk-abc123").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&blob),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let cipher = CredentialCipher::new("secret");
        assert!(matches!(
            cipher.decrypt(&[0u8; 4]),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn test_missing_master_key_fails_closed() {
        let cipher = CredentialCipher::new("");
        assert!(!cipher.is_configured());
        assert!(matches!(
            cipher.encrypt("sk-abc123"),
            Err(CryptoError::MissingMasterKey)
        ));
        assert!(matches!(
            cipher.decrypt(&[0u8; 32]),
            Err(CryptoError::MissingMasterKey)
        ));
    }

    #[test]
    fn test_nonce_randomized_per_encryption() {
        let cipher = CredentialCipher::new("secret");
        let a = cipher.encrypt("sk-abc123").unwrap();
        let b = cipher.encrypt("sk-abc123").unwrap();
        assert_ne!(a, b);
    }
}
