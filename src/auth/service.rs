//! Session lifecycle: register, login, refresh, logout
//!
//! A token is valid when its signature and time claims verify and its id is
//! not on the revocation blacklist. Token records are kept for listing a
//! user's sessions and are never consulted to decide validity.
//!
//! Refresh blacklists the old token before issuing its replacement, but the
//! blacklist check and write are not atomic. Two concurrent refreshes of the
//! same token can both pass the check and both receive a replacement; the old
//! token still ends up revoked.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::claims::UserClaims;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::{validate_password_strength, PasswordVault};
use crate::auth::token::{IssuedToken, TokenRecord, VerifiedToken};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::{NewUser, RevocationStore, TokenRepository, User, UserRepository};
use crate::validators::{normalize_email, validate_display_name, validate_email};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counts from one garbage collection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub blacklist_entries: u64,
    pub token_records: u64,
}

#[derive(Clone)]
pub struct SessionService {
    vault: PasswordVault,
    codec: TokenCodec,
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    revocations: Arc<dyn RevocationStore>,
    store_timeout: Duration,
}

impl SessionService {
    pub fn new(
        vault: PasswordVault,
        codec: TokenCodec,
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            vault,
            codec,
            users,
            tokens,
            revocations,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Bound every storage call made by this service
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an account.
    ///
    /// # Errors
    /// - `Validation` for a bad e-mail, display name or weak password
    /// - `Database(UniqueConstraintViolation)` if the e-mail is taken
    /// - `Internal` for hashing or storage failures
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, AppError> {
        let email = validate_email(email)?;
        let display_name = validate_display_name(display_name)?;
        validate_password_strength(password)?;

        let vault = self.vault.clone();
        let password = password.to_string();
        let credential = run_blocking(move || vault.generate(&password)).await??;

        let new_user = NewUser {
            email,
            credential,
            display_name,
        };
        match self.bounded("create user", self.users.create(new_user)).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Account registered");
                Ok(user)
            }
            Err(e @ DatabaseError::UniqueConstraintViolation(_)) => Err(AppError::Database(e)),
            Err(e) => Err(storage_failure(e)),
        }
    }

    /// Exchange an e-mail and password for a fresh token.
    ///
    /// An unknown e-mail costs the same bcrypt round as a wrong password, so
    /// response time does not reveal whether an account exists.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken, AppError> {
        let email = normalize_email(email);

        let user = match self.bounded("find user", self.users.get_by_email(&email)).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                let vault = self.vault.clone();
                run_blocking(move || vault.fake_work()).await?;
                tracing::info!("Login rejected: unknown account");
                return Err(AuthError::InvalidCredentials.into());
            }
            Err(e) => return Err(storage_failure(e)),
        };

        if !user.has_credential() {
            tracing::info!(user_id = %user.id, "Login rejected: account has no credential");
            return Err(AuthError::InvalidCredentials.into());
        }

        let vault = self.vault.clone();
        let password = password.to_string();
        let credential = user.credential.clone();
        if let Err(e) = run_blocking(move || vault.compare(&password, &credential)).await? {
            let err = AppError::from(e);
            if err.is_unauthorized() {
                tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            }
            return Err(err);
        }

        let claims = UserClaims {
            id: user.id,
            email: user.email,
            name: user.display_name,
        };
        let issued = self.issue(&claims).await?;
        tracing::info!(user_id = %claims.id, "Login succeeded");
        Ok(issued)
    }

    /// Rotate a live token: the old one is revoked, a new one is returned.
    pub async fn refresh(&self, old: &str) -> Result<IssuedToken, AppError> {
        let verified = self.authenticate(old).await?;
        self.revoke(&verified).await?;

        let issued = self.issue(&verified.user).await?;
        tracing::info!(
            user_id = %verified.user.id,
            old_token_id = %verified.id,
            "Token refreshed"
        );
        Ok(issued)
    }

    /// Revoke a live token. Succeeds whether or not a record was on file.
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        let verified = self.authenticate(token).await?;
        self.revoke(&verified).await?;

        tracing::info!(user_id = %verified.user.id, token_id = %verified.id, "Logged out");
        Ok(())
    }

    /// Verify a bearer token and make sure it has not been revoked.
    ///
    /// # Errors
    /// - `Auth(TokenExpired)` past expiry
    /// - `Auth(TokenInvalid)` for bad signatures and malformed tokens
    /// - `Auth(TokenRevoked)` if the token was logged out or rotated
    /// - `Internal` if the blacklist cannot be read in time
    pub async fn authenticate(&self, serialized: &str) -> Result<VerifiedToken, AppError> {
        let verified = self.codec.parse_and_verify(serialized)?;

        let revoked = self
            .bounded("check blacklist", self.revocations.is_blacklisted(verified.id))
            .await
            .map_err(storage_failure)?;
        if revoked {
            tracing::info!(token_id = %verified.id, "Revoked token presented");
            return Err(AuthError::TokenRevoked.into());
        }

        Ok(verified)
    }

    /// Issued tokens on record for `user_id`, newest first. Includes tokens
    /// that have since expired but not been purged.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<TokenRecord>, AppError> {
        self.bounded("list tokens", self.tokens.list(user_id))
            .await
            .map_err(storage_failure)
    }

    /// Drop expired blacklist entries and token records
    pub async fn sweep_expired(&self) -> Result<SweepReport, AppError> {
        let blacklist_entries = self
            .bounded("sweep blacklist", self.revocations.sweep())
            .await
            .map_err(storage_failure)?;
        let token_records = self
            .bounded("purge tokens", self.tokens.purge_expired(Utc::now()))
            .await
            .map_err(storage_failure)?;

        Ok(SweepReport {
            blacklist_entries,
            token_records,
        })
    }

    async fn issue(&self, user: &UserClaims) -> Result<IssuedToken, AppError> {
        let token = self.codec.issue(user)?;

        self.bounded("store token", self.tokens.put(&TokenRecord::from(&token)))
            .await
            .map_err(storage_failure)?;

        Ok(token.issued())
    }

    /// Blacklist for as long as the codec would still accept the token,
    /// then drop its record.
    async fn revoke(&self, token: &VerifiedToken) -> Result<(), AppError> {
        let ttl = token
            .remaining_lifetime(Utc::now() - chrono::Duration::seconds(self.leeway()))
            .to_std()
            .unwrap_or(Duration::ZERO);

        if ttl.is_zero() {
            tracing::debug!(token_id = %token.id, "Token already expired, not blacklisting");
        } else {
            self.bounded("blacklist token", self.revocations.blacklist(token.id, ttl))
                .await
                .map_err(storage_failure)?;
        }

        self.bounded("delete token", self.tokens.delete(token.user.id, token.id))
            .await
            .map_err(storage_failure)
    }

    fn leeway(&self) -> i64 {
        self.codec.leeway_seconds().min(u64::from(u32::MAX)) as i64
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout(format!(
                "{} exceeded {:?}",
                operation, self.store_timeout
            ))),
        }
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("codec", &self.codec)
            .field("cost", &self.vault.cost())
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

/// Run CPU-heavy hashing off the async workers
async fn run_blocking<T, F>(work: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::Internal(format!("hashing worker failed: {}", e)))
}

fn storage_failure(err: DatabaseError) -> AppError {
    tracing::error!(error = %err, "Storage call failed");
    AppError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::{Pepper, SigningKey};
    use crate::auth::password::MIN_COST;
    use crate::store::{InMemoryRevocationStore, InMemoryTokenRepository, InMemoryUserRepository};

    struct Fixture {
        service: SessionService,
        users: InMemoryUserRepository,
        tokens: InMemoryTokenRepository,
        revocations: InMemoryRevocationStore,
    }

    fn fixture() -> Fixture {
        let users = InMemoryUserRepository::new();
        let tokens = InMemoryTokenRepository::new();
        let revocations = InMemoryRevocationStore::new();

        let pepper = Pepper::new(vec![7; 32]).expect("Failed to build pepper");
        let key = SigningKey::new(vec![9; 32]).expect("Failed to build signing key");
        let vault = PasswordVault::new(pepper, MIN_COST).expect("Failed to build vault");

        let service = SessionService::new(
            vault,
            TokenCodec::new(&key),
            Arc::new(users.clone()),
            Arc::new(tokens.clone()),
            Arc::new(revocations.clone()),
        );

        Fixture {
            service,
            users,
            tokens,
            revocations,
        }
    }

    const PASSWORD: &str = "Passw0rdLong";

    #[tokio::test]
    async fn test_register_then_login() {
        let f = fixture();
        let user = f
            .service
            .register("Rider@Example.com", PASSWORD, "Rider")
            .await
            .expect("Failed to register");
        assert_eq!(user.email, "rider@example.com");
        assert_ne!(user.credential, PASSWORD);

        let issued = f
            .service
            .login("rider@example.com", PASSWORD)
            .await
            .expect("Failed to login");
        let verified = f
            .service
            .authenticate(&issued.token)
            .await
            .expect("Failed to authenticate");

        assert_eq!(verified.user.id, user.id);
        assert_eq!(verified.user.name, "Rider");
        assert_eq!(f.tokens.list(user.id).await.expect("Failed to list").len(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let f = fixture();
        f.service
            .register("rider@example.com", PASSWORD, "Rider")
            .await
            .expect("Failed to register");

        let result = f.service.register("rider@example.com", PASSWORD, "Other").await;
        assert!(matches!(
            result,
            Err(AppError::Database(DatabaseError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let f = fixture();
        let result = f.service.register("rider@example.com", "short", "Rider").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let f = fixture();
        f.service
            .register("rider@example.com", PASSWORD, "Rider")
            .await
            .expect("Failed to register");

        let result = f.service.login("rider@example.com", "Wr0ngPassword").await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    #[tokio::test]
    async fn test_login_unknown_account() {
        let f = fixture();
        let result = f.service.login("nobody@example.com", PASSWORD).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    #[tokio::test]
    async fn test_login_account_without_credential() {
        let f = fixture();
        f.users
            .insert(User {
                id: Uuid::new_v4(),
                email: "disabled@example.com".to_string(),
                credential: String::new(),
                display_name: "Disabled".to_string(),
                created_at: Utc::now(),
            })
            .await;

        let result = f.service.login("disabled@example.com", "").await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    #[tokio::test]
    async fn test_corrupt_credential_reads_as_mismatch() {
        let f = fixture();
        f.users
            .insert(User {
                id: Uuid::new_v4(),
                email: "corrupt@example.com".to_string(),
                credential: "bm90IGEgY3JlZGVudGlhbA==".to_string(),
                display_name: "Corrupt".to_string(),
                created_at: Utc::now(),
            })
            .await;

        let result = f.service.login("corrupt@example.com", PASSWORD).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::InvalidCredentials))));
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let f = fixture();
        f.service
            .register("rider@example.com", PASSWORD, "Rider")
            .await
            .expect("Failed to register");
        let first = f
            .service
            .login("rider@example.com", PASSWORD)
            .await
            .expect("Failed to login");

        let second = f.service.refresh(&first.token).await.expect("Failed to refresh");
        assert_ne!(first.token, second.token);

        assert!(f.service.authenticate(&second.token).await.is_ok());
        assert!(matches!(
            f.service.authenticate(&first.token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
        assert!(matches!(
            f.service.refresh(&first.token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let f = fixture();
        f.service
            .register("rider@example.com", PASSWORD, "Rider")
            .await
            .expect("Failed to register");
        let issued = f
            .service
            .login("rider@example.com", PASSWORD)
            .await
            .expect("Failed to login");
        let user_id = f
            .service
            .authenticate(&issued.token)
            .await
            .expect("Failed to authenticate")
            .user
            .id;

        f.service.logout(&issued.token).await.expect("Failed to logout");

        assert!(f.service.list_sessions(user_id).await.expect("Failed to list").is_empty());
        assert!(matches!(
            f.service.logout(&issued.token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
        assert!(matches!(
            f.service.refresh(&issued.token).await,
            Err(AppError::Auth(AuthError::TokenRevoked))
        ));
    }

    #[tokio::test]
    async fn test_logout_without_record_succeeds() {
        let f = fixture();
        let user = UserClaims {
            id: Uuid::new_v4(),
            email: "ghost@example.com".to_string(),
            name: "Ghost".to_string(),
        };
        let token = f.service.codec().issue(&user).expect("Failed to issue token");

        f.service.logout(&token.serialized).await.expect("Failed to logout");
        assert!(f.revocations.is_blacklisted(token.id).await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_expired_token_cannot_be_refreshed() {
        let f = fixture();
        let user = UserClaims {
            id: Uuid::new_v4(),
            email: "late@example.com".to_string(),
            name: "Late".to_string(),
        };
        let token = f
            .service
            .codec()
            .issue_at(&user, Utc::now() - chrono::Duration::hours(25))
            .expect("Failed to issue token");

        assert!(matches!(
            f.service.refresh(&token.serialized).await,
            Err(AppError::Auth(AuthError::TokenExpired))
        ));
        assert!(f.revocations.is_empty().await);
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let f = fixture();
        assert!(matches!(
            f.service.authenticate("not-a-token").await,
            Err(AppError::Auth(AuthError::TokenInvalid))
        ));
    }

    #[tokio::test]
    async fn test_blacklist_ttl_covers_remaining_lifetime() {
        let f = fixture();
        let user = UserClaims {
            id: Uuid::new_v4(),
            email: "ttl@example.com".to_string(),
            name: "Ttl".to_string(),
        };
        let token = f.service.codec().issue(&user).expect("Failed to issue token");
        f.service.logout(&token.serialized).await.expect("Failed to logout");

        // nothing to sweep while the token could still verify
        let report = f.service.sweep_expired().await.expect("Failed to sweep");
        assert_eq!(report.blacklist_entries, 0);
        assert_eq!(f.revocations.len().await, 1);
    }
}
