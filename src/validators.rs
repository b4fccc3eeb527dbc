//! Registration input validation
//!
//! E-mail addresses are the login key, so they are normalised here (trimmed,
//! lowercased) before anything is stored or looked up.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 6;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MAX_DISPLAY_NAME_LENGTH: usize = 100;
const MAX_NAME_SYMBOLS: usize = 5;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    )
    .expect("email pattern is a valid regex");
}

/// Normalise an e-mail address for storage and lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates and normalises an e-mail address
///
/// # Errors
/// Returns `ValidationError` naming the `email` field
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = normalize_email(email);

    if email.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if email.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }
    if email.contains('\0') || email.matches('@').count() != 1 {
        return Err(ValidationError::SuspiciousContent("email".to_string()));
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    let local_part = email.split('@').next().unwrap_or_default();
    if local_part.len() > MAX_LOCAL_PART_LENGTH {
        return Err(ValidationError::TooLong(
            "email local part".to_string(),
            MAX_LOCAL_PART_LENGTH,
        ));
    }

    Ok(email)
}

/// Validates the name shown to other riders and drivers
pub fn validate_display_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::EmptyField("display_name".to_string()));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::TooLong(
            "display_name".to_string(),
            MAX_DISPLAY_NAME_LENGTH,
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("display_name".to_string()));
    }

    let symbols = name
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace() && !"-._'".contains(*c))
        .count();
    if symbols > MAX_NAME_SYMBOLS {
        return Err(ValidationError::SuspiciousContent("display_name".to_string()));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("test.email@domain.co.uk").is_ok());
        assert!(validate_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_is_normalised() {
        assert_eq!(
            validate_email("  Driver@Example.COM ").expect("valid email"),
            "driver@example.com"
        );
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@@example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            validate_email(&too_long),
            Err(ValidationError::TooLong(_, _))
        ));

        let long_local = format!("{}@example.com", "a".repeat(65));
        assert!(validate_email(&long_local).is_err());

        assert!(matches!(validate_email("a@b.c"), Err(ValidationError::TooShort(_, _))));
        assert!(matches!(validate_email("   "), Err(ValidationError::EmptyField(_))));
    }

    #[test]
    fn test_valid_display_name() {
        assert_eq!(validate_display_name(" John Doe ").expect("valid name"), "John Doe");
        assert!(validate_display_name("Jean-Pierre").is_ok());
        assert!(validate_display_name("O'Brien").is_ok());
        assert!(validate_display_name("Zoë").is_ok());
    }

    #[test]
    fn test_display_name_limits() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name(&"a".repeat(101)).is_err());
        assert!(validate_display_name(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_display_name_control_characters() {
        assert!(validate_display_name("Name\0with\0null").is_err());
        assert!(validate_display_name("Line\nbreak").is_err());
    }

    #[test]
    fn test_display_name_symbol_soup() {
        assert!(validate_display_name("!!!!!!@@@@").is_err());
    }
}
