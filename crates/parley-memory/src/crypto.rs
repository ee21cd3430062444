//! Provider credential encryption.
//!
//! AES-256-GCM with a fresh 96-bit IV per value. The stored form keeps the
//! IV, authentication tag and ciphertext as separate hex fields:
//! `hex(iv):hex(tag):hex(ciphertext)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no encryption key configured")]
    MissingKey,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid encoding")]
    InvalidEncoding,
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

/// Encrypt a UTF-8 string. Returns `iv:tag:ciphertext` as hex.
pub fn encrypt(plaintext: &str, key: &[u8; 32]) -> Result<String, CryptoError> {
    let cipher = Aes256Gcm::new(key.into());
    let iv = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext.
    let mut sealed = cipher
        .encrypt(&iv, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(format!(
        "{}:{}:{}",
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(sealed)
    ))
}

/// Decrypt an `iv:tag:ciphertext` hex triple.
pub fn decrypt(encoded: &str, key: &[u8; 32]) -> Result<String, CryptoError> {
    let mut parts = encoded.split(':');
    let (Some(iv_hex), Some(tag_hex), Some(ct_hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::InvalidEncoding);
    };

    let iv = hex::decode(iv_hex).map_err(|_| CryptoError::InvalidEncoding)?;
    let tag = hex::decode(tag_hex).map_err(|_| CryptoError::InvalidEncoding)?;
    let mut sealed = hex::decode(ct_hex).map_err(|_| CryptoError::InvalidEncoding)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(CryptoError::InvalidEncoding);
    }
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(key.into());
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

/// Generate a random 256-bit key.
pub fn generate_key() -> [u8; 32] {
    let generated = Aes256Gcm::generate_key(&mut OsRng);
    let mut key = [0u8; 32];
    key.copy_from_slice(generated.as_slice());
    key
}
