//! Request authentication extractor
//!
//! Pulls the bearer token off the `Authorization` header and verifies it
//! against the server's [`JwtService`]. Handlers take `CurrentUser` as an
//! argument; unauthenticated requests never reach them.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::common::AppError;
use crate::core::ServerState;

use super::Claims;

/// Authenticated caller of the current request
pub struct CurrentUser(pub Claims);

impl FromRequestParts<Arc<ServerState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::Unauthorized)?;

        let claims = state
            .jwt
            .verify_token(token)
            .map_err(|_| AppError::InvalidToken)?;
        Ok(CurrentUser(claims))
    }
}
