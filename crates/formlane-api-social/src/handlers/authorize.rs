//! Handlers for starting redirect flows and listing providers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::error::{AuthFlowResult, ProviderKind};
use crate::extractors::MaybeAuthenticatedUser;
use crate::models::{
    AvailableProvider, AvailableProvidersResponse, StartRedirectQuery, StartRedirectResponse,
};
use crate::services::StartOptions;
use crate::AuthState;

/// Begin a provider redirect flow.
///
/// Returns the provider authorization URL and the correlation token carried
/// through it as `state`.
pub async fn start_redirect(
    State(state): State<AuthState>,
    MaybeAuthenticatedUser(session_user): MaybeAuthenticatedUser,
    Path(provider): Path<String>,
    Query(query): Query<StartRedirectQuery>,
) -> AuthFlowResult<Json<StartRedirectResponse>> {
    let provider: ProviderKind = provider.parse()?;
    // Unknown intents fall back to plain sign-in, which only ever asks for
    // identity scopes.
    let intent = query
        .intent
        .as_deref()
        .and_then(|i| i.parse().ok())
        .unwrap_or_default();

    info!(provider = %provider, intent = %intent, "Starting provider redirect");

    let utm_data = query.utm_data();
    let started = state
        .orchestrator
        .start_redirect(
            provider,
            intent,
            StartOptions {
                invite_token: query.invite_token,
                utm_data,
                caller_intention: query.caller_intention,
                auto_close: query.auto_close.unwrap_or(false),
            },
            session_user,
        )
        .await?;

    Ok(Json(StartRedirectResponse {
        authorization_url: started.authorization_url,
        correlation_token: started.correlation_token,
    }))
}

/// List the providers enabled on this instance, for the login page.
pub async fn available_providers(
    State(state): State<AuthState>,
) -> AuthFlowResult<Json<AvailableProvidersResponse>> {
    let providers = state
        .registry
        .available()
        .into_iter()
        .map(|(provider, widget_based)| AvailableProvider {
            provider,
            widget_based,
        })
        .collect();
    Ok(Json(AvailableProvidersResponse { providers }))
}
