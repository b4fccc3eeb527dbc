//! JWT Token Generation and Validation
//!
//! Issues and verifies HS256 signed bearer tokens. A token is self-describing:
//! verifying it yields the token id, its lifetime and the user identity
//! without a database round trip.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::claims::{Claims, UserClaims, AUTHENTICATION_SUBJECT};
use crate::auth::keys::SigningKey;
use crate::auth::token::{Token, VerifiedToken};
use crate::configuration::AuthSettings;
use crate::error::ConfigError;

/// Tokens live for 24 hours
pub const DEFAULT_VALIDITY_SECONDS: i64 = 24 * 60 * 60;
pub const DEFAULT_ISSUER: &str = "cargonaut";
pub const DEFAULT_AUDIENCE: &str = "cargonaut";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    BadSignature,
    Expired,
    NotYetValid,
    MalformedClaims,
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::BadSignature => write!(f, "token signature does not verify"),
            TokenError::Expired => write!(f, "token has expired"),
            TokenError::NotYetValid => write!(f, "token is not valid yet"),
            TokenError::MalformedClaims => write!(f, "token claims are missing or malformed"),
            TokenError::Signing(msg) => write!(f, "token signing failed: {}", msg),
        }
    }
}

impl StdError for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingAlgorithm => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::ImmatureSignature => TokenError::NotYetValid,
            _ => TokenError::MalformedClaims,
        }
    }
}

/// Signs and verifies bearer tokens under one signing key
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    validity_seconds: i64,
    leeway_seconds: u64,
}

impl TokenCodec {
    /// Codec with the default issuer, audience and 24h validity, no leeway
    pub fn new(key: &SigningKey) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            validity_seconds: DEFAULT_VALIDITY_SECONDS,
            leeway_seconds: 0,
        }
    }

    /// # Errors
    /// Returns `InvalidValue` if the configured validity is not positive
    pub fn from_settings(key: &SigningKey, settings: &AuthSettings) -> Result<Self, ConfigError> {
        if settings.token_validity_seconds <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "token_validity_seconds must be positive, got {}",
                settings.token_validity_seconds
            )));
        }

        Ok(Self::new(key)
            .with_issuer(settings.issuer.clone(), settings.audience.clone())
            .with_validity(settings.token_validity_seconds)
            .with_leeway(settings.leeway_seconds))
    }

    pub fn with_issuer(mut self, issuer: String, audience: String) -> Self {
        self.issuer = issuer;
        self.audience = audience;
        self
    }

    pub fn with_validity(mut self, seconds: i64) -> Self {
        self.validity_seconds = seconds;
        self
    }

    /// Clock skew tolerated on `exp` and `nbf`
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn leeway_seconds(&self) -> u64 {
        self.leeway_seconds
    }

    /// Issue a new token for `user`, valid from now
    ///
    /// # Errors
    /// Returns error if token serialization fails
    pub fn issue(&self, user: &UserClaims) -> Result<Token, TokenError> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(&self, user: &UserClaims, now: DateTime<Utc>) -> Result<Token, TokenError> {
        let claims = Claims::new(
            user.clone(),
            now,
            self.validity_seconds,
            self.issuer.clone(),
            self.audience.clone(),
        );

        let serialized = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        let expires_at = claims
            .expires_at()
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?;
        let created_at = claims
            .issued_at()
            .ok_or_else(|| TokenError::Signing("issue time out of range".to_string()))?;

        Ok(Token {
            id: claims.jti,
            user_id: user.id,
            serialized,
            expires_at,
            created_at,
        })
    }

    /// Check the signature and time claims of `serialized` and extract its
    /// claims.
    ///
    /// # Errors
    /// - `BadSignature` if the MAC does not verify under this codec's key
    /// - `Expired` / `NotYetValid` if now is outside `nbf..exp`
    /// - `MalformedClaims` if required claims are missing or mistyped
    pub fn parse_and_verify(&self, serialized: &str) -> Result<VerifiedToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.sub = Some(AUTHENTICATION_SUBJECT.to_string());
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        let claims = decode::<Claims>(serialized, &self.decoding_key, &validation)?.claims;

        Ok(VerifiedToken {
            id: claims.jti,
            expires_at: claims.expires_at().ok_or(TokenError::MalformedClaims)?,
            created_at: claims.issued_at().ok_or(TokenError::MalformedClaims)?,
            user: claims.user,
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("validity_seconds", &self.validity_seconds)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish_non_exhaustive()
    }
}
