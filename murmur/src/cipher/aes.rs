//! AES-256-GCM implementation of [`ContentCipher`].

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use super::{CipherError, ContentCipher, EncryptedContent};

/// Size of the symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM content cipher keyed by a per-install secret.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Creates a cipher from raw key bytes.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Creates a cipher from a base64-encoded 32-byte key, the format the
    /// key is provisioned in.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKey`] if the string is not valid base64
    /// or does not decode to exactly 32 bytes.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, CipherError> {
        let bytes = B64
            .decode(key_b64.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidKey("key must decode to 32 bytes".into()))?;
        Ok(Self::new(&key))
    }
}

impl ContentCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedContent, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;
        Ok(EncryptedContent {
            ciphertext: B64.encode(ciphertext),
            iv: B64.encode(nonce),
        })
    }

    fn decrypt(&self, ciphertext_b64: &str, iv_b64: &str) -> Result<String, CipherError> {
        let ciphertext = B64.decode(ciphertext_b64)?;
        let iv = B64.decode(iv_b64)?;
        if iv.len() != NONCE_SIZE {
            return Err(CipherError::DecryptionFailed(format!(
                "nonce must be {NONCE_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| CipherError::DecryptionFailed("authentication failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|e| CipherError::DecryptionFailed(format!("invalid utf-8: {e}")))
    }
}
