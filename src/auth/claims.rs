//! JWT Claims structure
//!
//! Represents the payload of a bearer token: the standard registered claims
//! (RFC 7519) plus a nested `user` object identifying the subject.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `sub` claim for every authentication token
pub const AUTHENTICATION_SUBJECT: &str = "authentication";

/// Identity carried inside a token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UserClaims {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

/// JWT claims for authentication tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Token ID
    pub jti: Uuid,
    /// Subject, always [`AUTHENTICATION_SUBJECT`]
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub user: UserClaims,
}

impl Claims {
    /// Create claims for a fresh token issued at `now`
    ///
    /// # Arguments
    /// * `user` - Identity to embed
    /// * `now` - Issue time, also used as not-before
    /// * `validity_seconds` - Lifetime from `now`
    /// * `issuer` - Issuer identifier
    /// * `audience` - Audience identifier
    pub fn new(
        user: UserClaims,
        now: DateTime<Utc>,
        validity_seconds: i64,
        issuer: String,
        audience: String,
    ) -> Self {
        let now = now.timestamp();
        Self {
            jti: Uuid::new_v4(),
            sub: AUTHENTICATION_SUBJECT.to_string(),
            iss: issuer,
            aud: audience,
            exp: now + validity_seconds,
            nbf: now,
            iat: now,
            user,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}
