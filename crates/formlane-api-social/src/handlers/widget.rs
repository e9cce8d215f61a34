//! Handler for widget sign-in callbacks.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::error::{AuthFlowResult, ProviderKind};
use crate::extractors::{MaybeAuthenticatedUser, SessionKey};
use crate::models::{SessionResponse, WidgetCallbackRequest};
use crate::AuthState;

/// Complete a widget flow from the signed payload the client posted.
///
/// No correlation token is involved; the payload itself proves the flow
/// completed at the provider.
pub async fn widget_callback(
    State(state): State<AuthState>,
    MaybeAuthenticatedUser(session_user): MaybeAuthenticatedUser,
    SessionKey(session_key): SessionKey,
    Path(provider): Path<String>,
    Json(request): Json<WidgetCallbackRequest>,
) -> AuthFlowResult<Json<SessionResponse>> {
    let provider: ProviderKind = provider.parse()?;
    let intent = request
        .intent
        .as_deref()
        .and_then(|i| i.parse().ok())
        .unwrap_or_default();

    let result = state
        .orchestrator
        .complete_widget(
            provider,
            &request.payload,
            intent,
            request.invite_token.as_deref(),
            session_user,
            session_key.as_deref(),
        )
        .await?;

    info!(
        provider = %provider,
        user_id = %result.user.id,
        is_new_user = result.is_new_user,
        "Widget flow completed"
    );
    Ok(Json(SessionResponse::from_result(&result)))
}
