//! Content encryption layer.
//!
//! Defines the [`ContentCipher`] trait -- the only boundary where message
//! plaintext exists. Everything handed to the transport or the REST
//! collaborator carries ciphertext produced here.
//!
//! The concrete implementation is [`aes::AesGcmCipher`]: AES-256-GCM with a
//! per-install 32-byte key and a fresh random 96-bit nonce per message,
//! both ciphertext and nonce base64-encoded for the JSON wire format.

pub mod aes;

/// Errors that can occur during content encryption or decryption.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The configured key is not a valid 32-byte base64 string.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed (wrong key, corrupt ciphertext, or tampering).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Ciphertext or nonce is not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

/// Ciphertext plus the nonce it was produced with, both base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    /// Base64 ciphertext (includes the GCM authentication tag).
    pub ciphertext: String,
    /// Base64 nonce, unique per message.
    pub iv: String,
}

/// Symmetric encryption of message content with a per-install key.
pub trait ContentCipher: Send + Sync {
    /// Encrypts plaintext, returning ciphertext and the nonce used.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] if encryption fails.
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedContent, CipherError>;

    /// Decrypts a ciphertext/nonce pair back to plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError`] for wrong keys, corrupt ciphertext, tampered
    /// data, or invalid base64. Callers rendering messages must substitute a
    /// placeholder instead of propagating this.
    fn decrypt(&self, ciphertext_b64: &str, iv_b64: &str) -> Result<String, CipherError>;
}

impl<T: ContentCipher> ContentCipher for std::sync::Arc<T> {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedContent, CipherError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext_b64: &str, iv_b64: &str) -> Result<String, CipherError> {
        (**self).decrypt(ciphertext_b64, iv_b64)
    }
}
