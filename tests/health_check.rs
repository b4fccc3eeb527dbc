//! Integration tests for the health endpoint

use actix_web::web;
use std::net::TcpListener;
use std::sync::Arc;

use cargonaut::auth::{Pepper, PasswordVault, SessionService, SigningKey, TokenCodec};
use cargonaut::startup::run;
use cargonaut::store::{InMemoryRevocationStore, InMemoryTokenRepository, InMemoryUserRepository};

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().expect("Failed to read address").port();

    let pepper = Pepper::new(vec![1; 32]).expect("Failed to build pepper");
    let key = SigningKey::new(vec![2; 32]).expect("Failed to build signing key");
    let sessions = SessionService::new(
        PasswordVault::new(pepper, 4).expect("Failed to build vault"),
        TokenCodec::new(&key),
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemoryTokenRepository::new()),
        Arc::new(InMemoryRevocationStore::new()),
    );

    let server = run(listener, web::Data::new(sessions)).expect("Failed to create server");
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.expect("Failed to read body"), "OK");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/nowhere", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}
