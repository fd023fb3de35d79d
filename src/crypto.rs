//! Credential-at-rest encryption using AES-256-GCM
//!
//! This module provides encryption and decryption for tenant credential
//! material stored in the fleet registry, using AES-256-GCM with additional
//! authenticated data (AAD) binding each ciphertext to its (tenant, kind)
//! pair.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// AAD binding a credential ciphertext to its owning tenant and kind.
fn credential_aad(tenant_id: Uuid, kind: &str) -> String {
    format!("{}|{}", tenant_id, kind)
}

/// Encrypt one credential value for storage in the registry.
pub fn encrypt_credential(
    key: &CryptoKey,
    tenant_id: Uuid,
    kind: &str,
    plaintext: &str,
) -> Result<Vec<u8>, CryptoError> {
    let aad = credential_aad(tenant_id, kind);
    encrypt_bytes(key, aad.as_bytes(), plaintext.as_bytes())
}

/// Decrypt a stored credential ciphertext back to its secret value.
pub fn decrypt_credential(
    key: &CryptoKey,
    tenant_id: Uuid,
    kind: &str,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let aad = credential_aad(tenant_id, kind);
    let bytes = decrypt_bytes(key, aad.as_bytes(), ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}
