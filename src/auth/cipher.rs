//! Symmetric secret encryption
//!
//! AES-GCM under an operator-held key. The key length selects the cipher
//! strength (16 = AES-128, 24 = AES-192, 32 = AES-256). A fresh 96-bit nonce is
//! drawn per call and prepended to the ciphertext, and the whole blob is base64
//! encoded so it can live in text columns.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::error::Error as StdError;
use std::fmt;

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Errors raised by [`encrypt`] and [`decrypt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Key is not 16, 24 or 32 bytes long
    InvalidKeySize(usize),
    /// Blob was truncated, tampered with, or sealed under another key
    AuthenticationFailed,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherError::InvalidKeySize(len) => {
                write!(f, "invalid key size: {} bytes (expected 16, 24 or 32)", len)
            }
            CipherError::AuthenticationFailed => write!(f, "message authentication failed"),
        }
    }
}

impl StdError for CipherError {}

/// Returns true if `len` selects one of the supported AES variants
pub fn is_valid_key_size(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// Encrypt `plaintext` under `key` and return the base64 encoded
/// `nonce || ciphertext || tag` blob.
///
/// # Errors
/// Returns `InvalidKeySize` if the key is not 16, 24 or 32 bytes long
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<String, CipherError> {
    let sealed = match key.len() {
        16 => seal::<Aes128Gcm>(key, plaintext)?,
        24 => seal::<Aes192Gcm>(key, plaintext)?,
        32 => seal::<Aes256Gcm>(key, plaintext)?,
        len => return Err(CipherError::InvalidKeySize(len)),
    };
    Ok(STANDARD.encode(sealed))
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Every failure past the key size check collapses into
/// `AuthenticationFailed`: bad base64, short input, a flipped bit and a wrong
/// key all look the same.
///
/// # Errors
/// Returns `InvalidKeySize` or `AuthenticationFailed`
pub fn decrypt(key: &[u8], blob: &str) -> Result<Vec<u8>, CipherError> {
    if !is_valid_key_size(key.len()) {
        return Err(CipherError::InvalidKeySize(key.len()));
    }

    let raw = STANDARD
        .decode(blob)
        .map_err(|_| CipherError::AuthenticationFailed)?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::AuthenticationFailed);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);

    match key.len() {
        16 => open::<Aes128Gcm>(key, nonce, ciphertext),
        24 => open::<Aes192Gcm>(key, nonce, ciphertext),
        _ => open::<Aes256Gcm>(key, nonce, ciphertext),
    }
}

fn seal<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CipherError::InvalidKeySize(key.len()))?;

    let mut nonce = GenericArray::<u8, C::NonceSize>::default();
    OsRng.fill_bytes(nonce.as_mut_slice());

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CipherError::AuthenticationFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open<C>(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CipherError::InvalidKeySize(key.len()))?;
    let nonce = GenericArray::<u8, C::NonceSize>::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CipherError::AuthenticationFailed)
}
