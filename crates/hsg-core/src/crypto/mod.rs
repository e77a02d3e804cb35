//! The symmetric encryption contract the write/query paths depend on, plus
//! a default AES-256-GCM implementation.

mod aes_gcm;

pub use aes_gcm::AesGcmEncryptor;

use async_trait::async_trait;

use crate::errors::Result;

/// Byte-oriented symmetric encryption. Implementations must round-trip:
/// `decrypt(encrypt(x)) == x` for all `x`.
#[async_trait]
pub trait Encryptor: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a blob. A missing or failed decrypt should not be treated
    /// as fatal by callers in the query path — they fall back to an empty
    /// string and log a warning rather than aborting the query.
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}
