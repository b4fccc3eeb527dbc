//! In-memory storage backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::auth::token::TokenRecord;
use crate::error::DatabaseError;
use crate::store::{NewUser, RevocationStore, TokenRepository, User, UserRepository};

/// Accounts keyed by e-mail
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an account as-is, replacing any with the same e-mail
    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.email.clone(), user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        self.users
            .read()
            .await
            .get(email)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()))
    }

    async fn create(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "users.email".to_string(),
            ));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            credential: user.credential,
            display_name: user.display_name,
            created_at: Utc::now(),
        };
        users.insert(created.email.clone(), created.clone());
        Ok(created)
    }
}

/// Token records keyed by token id
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenRepository {
    tokens: Arc<RwLock<HashMap<Uuid, TokenRecord>>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn put(&self, token: &TokenRecord) -> Result<(), DatabaseError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.id) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "user_token.id".to_string(),
            ));
        }
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, token_id: Uuid) -> Result<(), DatabaseError> {
        let mut tokens = self.tokens.write().await;
        if tokens.get(&token_id).map(|t| t.user_id) == Some(user_id) {
            tokens.remove(&token_id);
        }
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<TokenRecord>, DatabaseError> {
        let mut records: Vec<TokenRecord> = self
            .tokens
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}

/// Blacklist with per-entry deadlines.
///
/// An entry past its deadline reads as absent even before [`sweep`] removes
/// it.
///
/// [`sweep`]: RevocationStore::sweep
#[derive(Debug, Clone, Default)]
pub struct InMemoryRevocationStore {
    entries: Arc<RwLock<HashMap<Uuid, Instant>>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn is_blacklisted(&self, token_id: Uuid) -> Result<bool, DatabaseError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(&token_id)
            .is_some_and(|deadline| *deadline > now))
    }

    async fn blacklist(&self, token_id: Uuid, ttl: Duration) -> Result<(), DatabaseError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + ttl;

        let mut entries = self.entries.write().await;
        let entry = entries.entry(token_id).or_insert(deadline);
        if *entry < deadline {
            *entry = deadline;
        }
        Ok(())
    }

    async fn sweep(&self) -> Result<u64, DatabaseError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, deadline| *deadline > now);
        Ok((before - entries.len()) as u64)
    }
}
