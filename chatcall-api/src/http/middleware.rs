// HTTP middleware

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use chatcall_core::models::Identity;

use super::{AppError, AppState};

/// Authenticated identity extracted from a JWT bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        // Extract Authorization header
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|e| AppError::unauthorized(format!("Invalid Authorization header: {e}")))?;

        let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::unauthorized("Authorization header must carry a bearer token")
        })?;

        // The claims embed the full identity snapshot, so no user store
        // lookup happens on the request path.
        let claims = app_state
            .jwt_service
            .verify_token(token)
            .map_err(|e| AppError::unauthorized(format!("{e}")))?;

        Ok(Self {
            identity: claims.identity(),
        })
    }
}
