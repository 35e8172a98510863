//! Owner identification from the `Authorization` header.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;

/// Principal whose usage a request reads or changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

/// Token of a `Bearer <token>` header value, if non-empty
pub fn bearer_token(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("Bearer ")?;
    let token = rest.split(' ').next().unwrap_or_default().trim();
    (!token.is_empty()).then_some(token)
}

impl<S> FromRequestParts<S> for Owner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .map(|token| Owner(token.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
