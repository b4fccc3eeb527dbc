//! Bearer token authentication middleware
//!
//! Verifies the token in the `Authorization` header through
//! [`SessionService::authenticate`], so revoked tokens are rejected as well as
//! forged or expired ones. On success the [`VerifiedToken`] is placed in the
//! request extensions for handlers to pick up with `web::ReqData`.
//!
//! [`VerifiedToken`]: crate::auth::VerifiedToken

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::SessionService;
use crate::error::{AppError, AuthError, ErrorContext};

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub struct JwtMiddleware {
    sessions: web::Data<SessionService>,
}

impl JwtMiddleware {
    pub fn new(sessions: web::Data<SessionService>) -> Self {
        Self { sessions }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            sessions: self.sessions.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    sessions: web::Data<SessionService>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let sessions = self.sessions.clone();
        let context = ErrorContext::new("authenticate_request")
            .with_route(req.method().as_str(), req.path());

        Box::pin(async move {
            let token = bearer_token(req.headers())
                .ok_or_else(|| AppError::from(AuthError::MissingToken));

            let verified = match token {
                Ok(token) => sessions.authenticate(&token).await,
                Err(e) => Err(e),
            };

            match verified {
                Ok(verified) => {
                    tracing::debug!(
                        user_id = %verified.user.id,
                        token_id = %verified.id,
                        "Bearer token accepted"
                    );
                    req.extensions_mut().insert(verified);
                    service.call(req).await
                }
                Err(e) => {
                    context.log_error(&e);
                    Err(e.into())
                }
            }
        })
    }
}
