//! AES-256-GCM envelope encryption for refresh tokens.
//!
//! Every call to [`encrypt`] draws a fresh 16-byte IV. The IV is not secret and
//! travels with the ciphertext in a single string envelope:
//!
//! ```text
//! hex(ciphertext || tag) ":" hex(iv)
//! ```
//!
//! GCM authenticates the ciphertext, so a flipped bit, a wrong IV, or a wrong
//! key all surface as [`OAuthError::Decryption`] instead of garbage plaintext.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    aes::Aes256,
    AesGcm,
};
use std::fmt;

use crate::error::{OAuthError, Result};

/// AES-256 in GCM mode with a 128-bit IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the per-envelope IV in bytes
pub const IV_SIZE: usize = 16;

/// Separates the ciphertext from the IV. Never produced by hex encoding.
pub const ENVELOPE_SEPARATOR: char = ':';

/// Process-wide symmetric key.
///
/// Immutable once constructed. `Debug` never prints the key material.
#[derive(Clone)]
pub struct CipherKey([u8; KEY_SIZE]);

impl CipherKey {
    /// Parses a hex-encoded 32-byte key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| OAuthError::InvalidKey(format!("key is not valid hex: {e}")))?;

        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            OAuthError::InvalidKey(format!(
                "key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                bytes.len()
            ))
        })?;

        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> Result<Aes256Gcm16> {
        Aes256Gcm16::new_from_slice(&self.0)
            .map_err(|e| OAuthError::InvalidKey(format!("failed to create cipher: {e}")))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(<redacted>)")
    }
}

/// Encrypts `plaintext` under `key` and returns the envelope.
pub fn encrypt(plaintext: &str, key: &CipherKey) -> Result<String> {
    let cipher = key.cipher()?;

    // Never reuse an IV with the same key
    let iv = Aes256Gcm16::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&iv, plaintext.as_bytes())
        .map_err(|e| OAuthError::Encryption(e.to_string()))?;

    Ok(format!(
        "{}{}{}",
        hex::encode(ciphertext),
        ENVELOPE_SEPARATOR,
        hex::encode(iv)
    ))
}

/// Opens an envelope produced by [`encrypt`].
///
/// Fails with [`OAuthError::Decryption`] when the envelope is malformed or
/// does not authenticate under `key`.
pub fn decrypt(envelope: &str, key: &CipherKey) -> Result<String> {
    let (ciphertext_hex, iv_hex) = envelope
        .split_once(ENVELOPE_SEPARATOR)
        .ok_or_else(|| OAuthError::Decryption("envelope is missing the IV separator".into()))?;

    let ciphertext = hex::decode(ciphertext_hex)
        .map_err(|e| OAuthError::Decryption(format!("ciphertext is not valid hex: {e}")))?;
    let iv = hex::decode(iv_hex)
        .map_err(|e| OAuthError::Decryption(format!("IV is not valid hex: {e}")))?;

    if iv.len() != IV_SIZE {
        return Err(OAuthError::Decryption(format!(
            "invalid IV size: expected {}, got {}",
            IV_SIZE,
            iv.len()
        )));
    }

    let cipher = key.cipher()?;
    let plaintext = cipher
        .decrypt(GenericArray::from_slice(&iv), ciphertext.as_ref())
        .map_err(|_| OAuthError::Decryption("wrong key or corrupted data".into()))?;

    String::from_utf8(plaintext)
        .map_err(|e| OAuthError::Decryption(format!("plaintext is not valid UTF-8: {e}")))
}
