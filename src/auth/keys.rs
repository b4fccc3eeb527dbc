//! Process-wide secret keys
//!
//! The pepper encrypts stored credentials and the signing key authenticates
//! bearer tokens. Both are loaded once at startup and injected into the
//! components that need them. They may hold the same bytes in a given
//! deployment, but they are never the same parameter.

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::auth::cipher::is_valid_key_size;
use crate::error::ConfigError;

/// Key used to encrypt bcrypt hashes at rest (16, 24 or 32 bytes)
#[derive(Clone)]
pub struct Pepper(Arc<Zeroizing<Vec<u8>>>);

impl Pepper {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    /// Returns error if the key is not 16, 24 or 32 bytes long
    pub fn new(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        if !is_valid_key_size(bytes.len()) {
            return Err(ConfigError::InvalidValue(format!(
                "pepper must be 16, 24 or 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(Arc::new(Zeroizing::new(bytes))))
    }

    /// Build a pepper from its hex encoding
    pub fn from_hex(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| ConfigError::ParseError(format!("pepper is not valid hex: {}", e)))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Pepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pepper(<redacted>)")
    }
}

/// HMAC key for signing bearer tokens
#[derive(Clone)]
pub struct SigningKey(Arc<Zeroizing<Vec<u8>>>);

impl SigningKey {
    /// Minimum accepted key length in bytes
    pub const MIN_LENGTH: usize = 16;

    /// # Errors
    /// Returns error if the key is shorter than [`SigningKey::MIN_LENGTH`]
    pub fn new(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        if bytes.len() < Self::MIN_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "signing key must be at least {} bytes, got {}",
                Self::MIN_LENGTH,
                bytes.len()
            )));
        }
        Ok(Self(Arc::new(Zeroizing::new(bytes))))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| ConfigError::ParseError(format!("signing key is not valid hex: {}", e)))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}
