use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::UserClaims;

/// An issued bearer token.
///
/// `serialized` is what the client holds. Server-side records refer to the
/// token by `id` only; the serialized form is never persisted.
#[derive(Clone)]
pub struct Token {
    pub id: Uuid,
    pub user_id: Uuid,
    pub serialized: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn issued(&self) -> IssuedToken {
        IssuedToken {
            token: self.serialized.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A token whose signature and time claims checked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub user: UserClaims,
}

impl VerifiedToken {
    /// Time left until natural expiry as seen at `now`, clamped at zero
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// What login and refresh hand back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Server-side view of an issued token, without the serialized form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Token> for TokenRecord {
    fn from(token: &Token) -> Self {
        Self {
            id: token.id,
            user_id: token.user_id,
            expires_at: token.expires_at,
            created_at: token.created_at,
        }
    }
}
