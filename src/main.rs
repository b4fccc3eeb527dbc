use actix_web::web;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::time::Duration;

use cargonaut::configuration::get_configuration;
use cargonaut::startup::{build_session_service, run, spawn_sweeper};
use cargonaut::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(configuration.auth.store_timeout())
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;

    let sessions = build_session_service(&configuration.auth, &configuration.revocation, pool)
        .map_err(|e| {
            tracing::error!("Invalid authentication settings: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
    let sessions = web::Data::new(sessions);

    let _sweeper = spawn_sweeper(
        sessions.clone(),
        Duration::from_secs(configuration.revocation.sweep_interval_seconds.max(1)),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions)?.await
}
