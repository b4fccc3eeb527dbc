//! Postgres storage backends
//!
//! Tables are created by the SQL files under `migrations/`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::token::TokenRecord;
use crate::error::DatabaseError;
use crate::store::{NewUser, RevocationStore, TokenRepository, User, UserRepository};

#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_by_email(&self, email: &str) -> Result<User, DatabaseError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, DateTime<Utc>)>(
            r#"
            SELECT id, email, password_hash, display_name, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let (id, email, credential, display_name, created_at) =
            row.ok_or_else(|| DatabaseError::NotFound("user".to_string()))?;

        Ok(User {
            id,
            email,
            credential,
            display_name,
            created_at,
        })
    }

    async fn create(&self, user: NewUser) -> Result<User, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.credential)
        .bind(&user.display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            email: user.email,
            credential: user.credential,
            display_name: user.display_name,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn put(&self, token: &TokenRecord) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO user_token (id, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: Uuid, token_id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM user_token WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(token_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<TokenRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT id, user_id, expires_at, created_at
            FROM user_token
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, expires_at, created_at)| TokenRecord {
                id,
                user_id,
                expires_at,
                created_at,
            })
            .collect())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM user_token WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Blacklist table for deployments running more than one process
#[derive(Debug, Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn is_blacklisted(&self, token_id: Uuid) -> Result<bool, DatabaseError> {
        let blacklisted = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM revoked_token
                WHERE token_id = $1 AND revoked_until > now()
            )
            "#,
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(blacklisted)
    }

    async fn blacklist(&self, token_id: Uuid, ttl: Duration) -> Result<(), DatabaseError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| DatabaseError::UnexpectedError(e.to_string()))?;
        let revoked_until = Utc::now() + ttl;

        sqlx::query(
            r#"
            INSERT INTO revoked_token (token_id, revoked_until)
            VALUES ($1, $2)
            ON CONFLICT (token_id)
            DO UPDATE SET revoked_until = GREATEST(revoked_token.revoked_until, EXCLUDED.revoked_until)
            "#,
        )
        .bind(token_id)
        .bind(revoked_until)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn sweep(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM revoked_token WHERE revoked_until <= now()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
