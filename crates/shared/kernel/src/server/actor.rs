use crate::error::ApiError;
use crate::security::{SecurityError, TokenService};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::Span;

/// The authenticated caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub login: String,
}

impl Actor {
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| SecurityError::MissingToken {
                message: "expected 'Authorization: Bearer <token>'".into(),
                context: None,
            })?;

        let claims = TokenService::from_ref(state).verify(token)?;
        Span::current().record("actor", claims.sub.as_str());
        Ok(Self { login: claims.sub })
    }
}
