use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::{PasswordVault, SessionService, TokenCodec};
use crate::configuration::{AuthSettings, RevocationBackend, RevocationSettings};
use crate::error::AppError;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{get_current_user, health_check, list_sessions, login, logout, refresh, register};
use crate::store::{
    InMemoryRevocationStore, PgRevocationStore, PgTokenRepository, PgUserRepository,
    RevocationStore,
};

/// Wire the session service to Postgres-backed accounts and token records.
///
/// # Errors
/// Returns `AppError::Config` if a key is malformed or the cost is out of range
pub fn build_session_service(
    auth: &AuthSettings,
    revocation: &RevocationSettings,
    pool: PgPool,
) -> Result<SessionService, AppError> {
    let vault = PasswordVault::new(auth.pepper()?, auth.password_cost)
        .map_err(|e| AppError::Config(crate::error::ConfigError::InvalidValue(e.to_string())))?;
    let codec = TokenCodec::from_settings(&auth.signing_key()?, auth)?;

    let revocations: Arc<dyn RevocationStore> = match revocation.backend {
        RevocationBackend::Memory => Arc::new(InMemoryRevocationStore::new()),
        RevocationBackend::Postgres => Arc::new(PgRevocationStore::new(pool.clone())),
    };
    tracing::info!(backend = ?revocation.backend, "Revocation store selected");

    Ok(SessionService::new(
        vault,
        codec,
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgTokenRepository::new(pool)),
        revocations,
    )
    .with_store_timeout(auth.store_timeout()))
}

/// Periodically drop expired blacklist entries and token records
pub fn spawn_sweeper(sessions: web::Data<SessionService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(report) => tracing::info!(
                    blacklist_entries = report.blacklist_entries,
                    token_records = report.token_records,
                    "Expired session data swept"
                ),
                Err(e) => tracing::error!(error = %e, "Sweeping expired session data failed"),
            }
        }
    })
}

pub fn run(
    listener: TcpListener,
    sessions: web::Data<SessionService>,
) -> Result<Server, std::io::Error> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(sessions.clone())
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/refresh", web::patch().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            .service(
                web::resource("/auth/me")
                    .wrap(JwtMiddleware::new(sessions.clone()))
                    .route(web::get().to(get_current_user)),
            )
            .service(
                web::resource("/auth/sessions")
                    .wrap(JwtMiddleware::new(sessions.clone()))
                    .route(web::get().to(list_sessions)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
