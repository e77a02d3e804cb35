use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use async_trait::async_trait;
use rand::RngCore;

use super::Encryptor;
use crate::errors::{HsgError, Result};

const NONCE_LEN: usize = 12;

/// AES-256-GCM encryption over a fixed 32-byte key. Ciphertext is packed as
/// `nonce (12 bytes) || ciphertext+tag`; the nonce is random per call.
pub struct AesGcmEncryptor {
    cipher: Aes256Gcm,
}

impl AesGcmEncryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| HsgError::Fatal("encryption key must be 32 bytes".into()))?;
        Ok(Self { cipher })
    }
}

#[async_trait]
impl Encryptor for AesGcmEncryptor {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| HsgError::Fatal(format!("encryption failed: {e}")))?;

        let mut packed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ciphertext);
        Ok(packed)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(HsgError::Fatal("ciphertext too short".into()));
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, body)
            .map_err(|_| HsgError::Fatal("decryption failed — wrong key or corrupted data".into()))
    }
}
