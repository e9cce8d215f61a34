//! Handlers for managing linked providers on the authenticated account.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::error::{AuthFlowResult, ProviderKind};
use crate::extractors::AuthenticatedUser;
use crate::models::{LinkResponse, LinksListResponse};
use crate::AuthState;

/// List the caller's linked providers. Stored tokens are never included.
pub async fn list_links(
    State(state): State<AuthState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AuthFlowResult<Json<LinksListResponse>> {
    let links = state
        .links
        .list_for_user(user_id)
        .await?
        .into_iter()
        .map(|link| LinkResponse {
            provider: link.provider,
            external_id: link.external_id,
            email: link.email,
            display_name: link.display_name,
            created_at: link.created_at,
        })
        .collect();
    Ok(Json(LinksListResponse { links }))
}

/// Unlink a provider from the caller's account.
///
/// Refused when it would remove the account's only sign-in method.
pub async fn unlink(
    State(state): State<AuthState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(provider): Path<String>,
) -> AuthFlowResult<StatusCode> {
    let provider: ProviderKind = provider.parse()?;
    state.linker.unlink(user_id, provider).await?;
    info!(user_id = %user_id, provider = %provider, "Provider unlinked");
    Ok(StatusCode::NO_CONTENT)
}
