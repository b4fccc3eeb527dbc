//! Authentication routes
//!
//! Thin wrappers around [`SessionService`]. Every failure is logged with the
//! operation, method and route; the response body only ever carries a generic
//! message.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{SessionService, TokenRecord, VerifiedToken};
use crate::error::{AppError, ErrorContext};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

/// Body of refresh and logout
#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<TokenRecord>,
}

fn logged<T>(context: ErrorContext, result: Result<T, AppError>) -> Result<T, AppError> {
    if let Err(e) = &result {
        context.log_error(e);
    }
    result
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid e-mail, display name or weak password
/// - 409: e-mail already registered
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("register").with_route("POST", "/auth/register");

    let user = logged(
        context,
        sessions
            .register(&form.email, &form.password, &form.display_name)
            .await,
    )?;

    Ok(HttpResponse::Created().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        display_name: user.display_name,
    }))
}

/// POST /auth/login
///
/// Unknown e-mail and wrong password both answer 401 with the same body.
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("login").with_route("POST", "/auth/login");

    let issued = logged(context, sessions.login(&form.email, &form.password).await)?;
    Ok(HttpResponse::Ok().json(issued))
}

/// POST /auth/refresh
pub async fn refresh(
    form: web::Json<TokenRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("refresh").with_route("POST", "/auth/refresh");

    let issued = logged(context, sessions.refresh(&form.token).await)?;
    Ok(HttpResponse::Ok().json(issued))
}

/// POST /auth/logout
pub async fn logout(
    form: web::Json<TokenRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("logout").with_route("POST", "/auth/logout");

    logged(context, sessions.logout(&form.token).await)?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Serialize)]
pub struct CurrentUserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/// GET /auth/me
///
/// Answers from the token claims alone.
pub async fn get_current_user(token: web::ReqData<VerifiedToken>) -> HttpResponse {
    let token = token.into_inner();
    HttpResponse::Ok().json(CurrentUserResponse {
        id: token.user.id.to_string(),
        email: token.user.email,
        display_name: token.user.name,
        token_id: token.id.to_string(),
        expires_at: token.expires_at,
    })
}

/// GET /auth/sessions
pub async fn list_sessions(
    token: web::ReqData<VerifiedToken>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user_id = token.user.id;
    let context = ErrorContext::new("list_sessions")
        .with_route("GET", "/auth/sessions")
        .with_user_id(user_id.to_string());

    let records = logged(context, sessions.list_sessions(user_id).await)?;
    Ok(HttpResponse::Ok().json(SessionsResponse { sessions: records }))
}
