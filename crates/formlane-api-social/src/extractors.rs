//! Axum extractors for authentication handlers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use formlane_core::UserId;

use crate::error::AuthFlowError;

/// The authenticated caller, required.
///
/// The application's session middleware validates the bearer token upstream
/// and inserts the resolved [`UserId`] into request extensions; this
/// extractor only reads it back out.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthFlowError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .copied()
            .map(AuthenticatedUser)
            .ok_or(AuthFlowError::Unauthenticated)
    }
}

/// The authenticated caller, if any. Public flow endpoints accept both
/// anonymous and signed-in callers and branch on intent.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthenticatedUser(pub Option<UserId>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticatedUser(
            parts.extensions.get::<UserId>().copied(),
        ))
    }
}

/// Opaque per-browser session key, when the client supplies one. Used to
/// correlate widget flows with context stashed at page render.
#[derive(Debug, Clone)]
pub struct SessionKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionKey(
            parts
                .headers
                .get("X-Session-Key")
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string),
        ))
    }
}
