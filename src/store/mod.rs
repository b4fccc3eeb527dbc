//! Storage collaborators
//!
//! The session service only talks to these traits. Any backend with the same
//! semantics will do: `memory` for tests and single-process deployments,
//! `postgres` for the real thing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::token::TokenRecord;
use crate::error::DatabaseError;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryRevocationStore, InMemoryTokenRepository, InMemoryUserRepository};
pub use postgres::{PgRevocationStore, PgTokenRepository, PgUserRepository};

/// A registered account
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Opaque credential from the password vault. Empty means the account
    /// cannot log in.
    pub credential: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Data needed to create an account
#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub credential: String,
    pub display_name: String,
}

/// Account lookup and creation
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    /// Returns `DatabaseError::NotFound` if no account uses `email`
    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError>;

    /// # Errors
    /// Returns `DatabaseError::UniqueConstraintViolation` if the e-mail is taken
    async fn create(&self, user: NewUser) -> Result<User, DatabaseError>;
}

/// Durable record of issued tokens.
///
/// Advisory only: used to enumerate a user's sessions and for cleanup, never
/// to decide whether a token is valid.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn put(&self, token: &TokenRecord) -> Result<(), DatabaseError>;

    /// Deleting a record that does not exist succeeds.
    async fn delete(&self, user_id: Uuid, token_id: Uuid) -> Result<(), DatabaseError>;

    async fn list(&self, user_id: Uuid) -> Result<Vec<TokenRecord>, DatabaseError>;

    /// Drop records whose token expired at or before `now`, returning how
    /// many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError>;
}

/// Time-indexed set of revoked token ids
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn is_blacklisted(&self, token_id: Uuid) -> Result<bool, DatabaseError>;

    /// Keep `token_id` on the blacklist for `ttl`. A zero ttl is a no-op.
    async fn blacklist(&self, token_id: Uuid, ttl: Duration) -> Result<(), DatabaseError>;

    /// Drop entries whose ttl ran out, returning how many were removed.
    async fn sweep(&self) -> Result<u64, DatabaseError>;
}
