//! Password Hashing and Verification
//!
//! A stored credential is built in three layers:
//!
//! 1. SHA-512 over the plaintext, base64 encoded. Bounds the input the slow
//!    hash has to chew on and keeps null bytes away from bcrypt.
//! 2. bcrypt over the encoded digest, with a random salt and adjustable cost.
//! 3. AES-GCM encryption of the bcrypt string under the pepper.
//!
//! A leaked credential table is useless without the pepper, and the pepper can
//! be rotated by re-encrypting the bcrypt strings without touching salts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha512};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::cipher::{self, CipherError};
use crate::auth::keys::Pepper;
use crate::error::{AppError, ValidationError};

/// 12 rounds, roughly 250ms on commodity hardware
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Plaintext hashed when no account matched, so the caller still pays for a
/// full bcrypt round.
const FAKE_WORK_PASSWORD: &str = "fakework_invalid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    InvalidKeySize(usize),
    InvalidCost(u32),
    PasswordMismatch,
    Hashing(String),
}

impl fmt::Display for PasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordError::InvalidKeySize(len) => {
                write!(f, "invalid pepper size: {} bytes (expected 16, 24 or 32)", len)
            }
            PasswordError::InvalidCost(cost) => {
                write!(f, "invalid cost {} (expected {}..={})", cost, MIN_COST, MAX_COST)
            }
            PasswordError::PasswordMismatch => write!(f, "passwords do not match"),
            PasswordError::Hashing(msg) => write!(f, "password hashing failed: {}", msg),
        }
    }
}

impl StdError for PasswordError {}

/// Create a storable credential from a plaintext password.
///
/// Two calls with identical arguments never return the same string: bcrypt
/// draws a new salt and the cipher a new nonce each time.
///
/// # Errors
/// - `InvalidKeySize` if the pepper is not 16, 24 or 32 bytes
/// - `InvalidCost` if `cost` is outside `MIN_COST..=MAX_COST`
pub fn generate(pepper: &[u8], plaintext: &str, cost: u32) -> Result<String, PasswordError> {
    if !cipher::is_valid_key_size(pepper.len()) {
        return Err(PasswordError::InvalidKeySize(pepper.len()));
    }
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        return Err(PasswordError::InvalidCost(cost));
    }

    let digest = encoded_digest(plaintext);
    let hashed = bcrypt::hash(digest.as_bytes(), cost)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    cipher::encrypt(pepper, hashed.as_bytes()).map_err(PasswordError::from)
}

/// Check a plaintext password against a credential from [`generate`].
///
/// A credential that fails to decrypt is reported as `PasswordMismatch`, so a
/// wrong pepper, a corrupted row and a wrong password are indistinguishable.
///
/// # Errors
/// - `InvalidKeySize` if the pepper is not 16, 24 or 32 bytes
/// - `PasswordMismatch` if the password does not match
pub fn compare(pepper: &[u8], plaintext: &str, credential: &str) -> Result<(), PasswordError> {
    let digest = encoded_digest(plaintext);

    let hashed = cipher::decrypt(pepper, credential)?;
    let hashed = String::from_utf8(hashed).map_err(|_| PasswordError::PasswordMismatch)?;

    match bcrypt::verify(digest.as_bytes(), &hashed) {
        Ok(true) => Ok(()),
        Ok(false) => Err(PasswordError::PasswordMismatch),
        Err(e) => Err(PasswordError::Hashing(e.to_string())),
    }
}

fn encoded_digest(plaintext: &str) -> String {
    let digest = Sha512::digest(plaintext.as_bytes());
    STANDARD.encode(digest)
}

impl From<CipherError> for PasswordError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::InvalidKeySize(len) => PasswordError::InvalidKeySize(len),
            CipherError::AuthenticationFailed => PasswordError::PasswordMismatch,
        }
    }
}

/// Credential pipeline bound to one pepper and cost
#[derive(Debug, Clone)]
pub struct PasswordVault {
    pepper: Pepper,
    cost: u32,
}

impl PasswordVault {
    /// # Errors
    /// Returns `InvalidCost` if `cost` is outside `MIN_COST..=MAX_COST`
    pub fn new(pepper: Pepper, cost: u32) -> Result<Self, PasswordError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(PasswordError::InvalidCost(cost));
        }
        Ok(Self { pepper, cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn generate(&self, plaintext: &str) -> Result<String, PasswordError> {
        generate(self.pepper.as_bytes(), plaintext, self.cost)
    }

    pub fn compare(&self, plaintext: &str, credential: &str) -> Result<(), PasswordError> {
        compare(self.pepper.as_bytes(), plaintext, credential)
    }

    /// Burn one bcrypt round at the configured cost and discard the result.
    pub fn fake_work(&self) {
        let _ = self.generate(FAKE_WORK_PASSWORD);
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    if password.chars().count() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = MIN_COST;

    fn peppers() -> Vec<Vec<u8>> {
        vec![vec![0x11; 16], vec![0x22; 24], vec![0x33; 32]]
    }

    fn plaintexts() -> Vec<String> {
        vec![
            "ValidPassword123".to_string(),
            String::new(),
            "pässwörd mit ümlauten".to_string(),
            "with\0null\0bytes".to_string(),
            "x".repeat(4096),
        ]
    }

    #[test]
    fn test_generate_then_compare_succeeds() {
        for pepper in peppers() {
            for plaintext in plaintexts() {
                let credential =
                    generate(&pepper, &plaintext, TEST_COST).expect("Failed to generate");
                assert_eq!(compare(&pepper, &plaintext, &credential), Ok(()));
            }
        }
    }

    #[test]
    fn test_credential_is_not_plaintext() {
        let credential = generate(&[1u8; 32], "ValidPassword123", TEST_COST)
            .expect("Failed to generate");
        assert!(!credential.contains("ValidPassword123"));
        assert!(!credential.starts_with("$2"));
    }

    #[test]
    fn test_generate_never_repeats() {
        let pepper = [5u8; 32];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let credential = generate(&pepper, "SamePassword1", TEST_COST)
                .expect("Failed to generate");
            assert!(seen.insert(credential), "credential repeated");
        }
    }

    #[test]
    fn test_wrong_pepper_is_mismatch() {
        let credential = generate(&[1u8; 32], "ValidPassword123", TEST_COST)
            .expect("Failed to generate");
        assert_eq!(
            compare(&[2u8; 32], "ValidPassword123", &credential),
            Err(PasswordError::PasswordMismatch)
        );
        assert_eq!(
            compare(&[1u8; 16], "ValidPassword123", &credential),
            Err(PasswordError::PasswordMismatch)
        );
    }

    #[test]
    fn test_wrong_password_is_mismatch() {
        let credential = generate(&[1u8; 24], "ValidPassword123", TEST_COST)
            .expect("Failed to generate");
        assert_eq!(
            compare(&[1u8; 24], "WrongPassword123", &credential),
            Err(PasswordError::PasswordMismatch)
        );
    }

    #[test]
    fn test_corrupt_credential_is_mismatch() {
        let pepper = [1u8; 32];
        assert_eq!(
            compare(&pepper, "ValidPassword123", "garbage"),
            Err(PasswordError::PasswordMismatch)
        );
        assert_eq!(
            compare(&pepper, "ValidPassword123", ""),
            Err(PasswordError::PasswordMismatch)
        );
    }

    #[test]
    fn test_invalid_pepper_sizes() {
        let good = generate(&[1u8; 32], "ValidPassword123", TEST_COST)
            .expect("Failed to generate");
        for len in [15usize, 17, 33] {
            let pepper = vec![0u8; len];
            for plaintext in plaintexts() {
                assert_eq!(
                    generate(&pepper, &plaintext, TEST_COST),
                    Err(PasswordError::InvalidKeySize(len))
                );
                assert_eq!(
                    compare(&pepper, &plaintext, &good),
                    Err(PasswordError::InvalidKeySize(len))
                );
            }
        }
    }

    #[test]
    fn test_invalid_cost() {
        let pepper = [1u8; 32];
        assert_eq!(generate(&pepper, "pw", 3), Err(PasswordError::InvalidCost(3)));
        assert_eq!(generate(&pepper, "pw", 32), Err(PasswordError::InvalidCost(32)));
    }

    #[test]
    fn test_long_passwords_differing_after_72_bytes() {
        let pepper = [1u8; 32];
        let base = "a".repeat(100);
        let credential = generate(&pepper, &format!("{}1", base), TEST_COST)
            .expect("Failed to generate");
        assert_eq!(
            compare(&pepper, &format!("{}2", base), &credential),
            Err(PasswordError::PasswordMismatch)
        );
    }

    #[test]
    fn test_vault_round_trip() {
        let pepper = Pepper::new(vec![9u8; 32]).expect("Failed to build pepper");
        let vault = PasswordVault::new(pepper, TEST_COST).expect("Failed to build vault");

        let credential = vault.generate("ValidPassword123").expect("Failed to generate");
        assert!(vault.compare("ValidPassword123", &credential).is_ok());
        assert_eq!(
            vault.compare("nope", &credential),
            Err(PasswordError::PasswordMismatch)
        );
    }

    #[test]
    fn test_vault_rejects_bad_cost() {
        let pepper = Pepper::new(vec![9u8; 32]).expect("Failed to build pepper");
        assert!(PasswordVault::new(pepper, 40).is_err());
    }

    #[test]
    fn test_too_short_password() {
        assert!(validate_password_strength("Short1").is_err());
    }

    #[test]
    fn test_too_long_password() {
        let long_password = "a".repeat(MAX_PASSWORD_LENGTH + 1) + "A1";
        assert!(validate_password_strength(&long_password).is_err());
    }

    #[test]
    fn test_missing_character_classes() {
        assert!(validate_password_strength("NoDigitsPassword").is_err());
        assert!(validate_password_strength("NOLOWERCASE1").is_err());
        assert!(validate_password_strength("nouppercase1").is_err());
    }

    #[test]
    fn test_valid_password() {
        assert!(validate_password_strength("ValidPassword123").is_ok());
    }
}
