//! Handler for provider redirect callbacks.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::error::{AuthFlowResult, ProviderKind};
use crate::models::{CallbackParams, SessionResponse};
use crate::AuthState;

/// Complete a redirect flow from the provider's callback.
///
/// The `state` parameter is the single-use correlation token issued at
/// redirect-start; a replayed or never-issued value yields a 400 with
/// `context_expired`.
pub async fn callback(
    State(state): State<AuthState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> AuthFlowResult<Json<SessionResponse>> {
    let provider: ProviderKind = provider.parse()?;

    let result = state.orchestrator.complete_redirect(provider, &params).await?;

    info!(
        provider = %provider,
        user_id = %result.user.id,
        is_new_user = result.is_new_user,
        "Redirect flow completed"
    );
    Ok(Json(SessionResponse::from_result(&result)))
}
