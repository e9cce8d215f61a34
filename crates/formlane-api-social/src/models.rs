//! Request/response models and the transient flow types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use formlane_core::UserId;

use crate::error::{AuthFlowError, ProviderKind};
use crate::ports::{IssuedToken, User};

/// What the caller wants out of a provider flow.
///
/// `Auth` signs a user in (or up); `Integration` attaches provider
/// credentials to an already-authenticated user without touching login state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthIntent {
    Auth,
    Integration,
}

impl Default for AuthIntent {
    fn default() -> Self {
        AuthIntent::Auth
    }
}

impl std::fmt::Display for AuthIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthIntent::Auth => write!(f, "auth"),
            AuthIntent::Integration => write!(f, "integration"),
        }
    }
}

impl std::str::FromStr for AuthIntent {
    type Err = AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auth" => Ok(AuthIntent::Auth),
            "integration" => Ok(AuthIntent::Integration),
            other => Err(AuthFlowError::Internal {
                message: format!("unknown intent '{other}'"),
            }),
        }
    }
}

/// Ephemeral state correlating the two legs of a redirect flow.
///
/// Written at redirect-start under a random correlation token, read and
/// deleted exactly once at callback time. Never persisted durably.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowContext {
    pub intent: AuthIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_data: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_intention: Option<String>,
    #[serde(default)]
    pub auto_close: bool,
    /// Authenticated caller, carried across the redirect for integration
    /// intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl FlowContext {
    /// A minimal context for the given intent.
    #[must_use]
    pub fn for_intent(intent: AuthIntent) -> Self {
        Self {
            intent,
            utm_data: None,
            invited_email: None,
            invite_token: None,
            caller_intention: None,
            auto_close: false,
            user_id: None,
        }
    }
}

/// Provider-shaped user data as returned by a driver, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawProviderUser {
    /// Stable identifier at the provider (`sub`, numeric id, ...).
    pub external_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
}

/// One canonical identity record, normalized from any provider.
///
/// Transient: built fresh per request and never stored as-is.
#[derive(Debug, Clone)]
pub struct CanonicalIdentity {
    pub external_id: String,
    pub name: String,
    /// Lowercased when present. Some widget providers cannot supply one.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
}

/// Outcome of a completed flow, handed back to the HTTP boundary.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: User,
    /// Present for auth intent; integration intent leaves login state alone.
    pub session: Option<IssuedToken>,
    pub is_new_user: bool,
    pub auto_close: bool,
    pub caller_intention: Option<String>,
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

/// Query parameters accepted at redirect-start.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRedirectQuery {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub invite_token: Option<String>,
    #[serde(default)]
    pub caller_intention: Option<String>,
    #[serde(default)]
    pub auto_close: Option<bool>,
    #[serde(default, rename = "utm_source")]
    pub utm_source: Option<String>,
    #[serde(default, rename = "utm_medium")]
    pub utm_medium: Option<String>,
    #[serde(default, rename = "utm_campaign")]
    pub utm_campaign: Option<String>,
    #[serde(default, rename = "utm_term")]
    pub utm_term: Option<String>,
    #[serde(default, rename = "utm_content")]
    pub utm_content: Option<String>,
}

impl StartRedirectQuery {
    /// Collect the `utm_*` attribution parameters, if any were sent.
    #[must_use]
    pub fn utm_data(&self) -> Option<HashMap<String, String>> {
        let pairs = [
            ("utm_source", &self.utm_source),
            ("utm_medium", &self.utm_medium),
            ("utm_campaign", &self.utm_campaign),
            ("utm_term", &self.utm_term),
            ("utm_content", &self.utm_content),
        ];
        let utm: HashMap<String, String> = pairs
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
            .collect();
        if utm.is_empty() {
            None
        } else {
            Some(utm)
        }
    }
}

/// Response for redirect-start.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRedirectResponse {
    pub authorization_url: String,
    pub correlation_token: String,
}

/// Parameters a provider sends back to the callback endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// Body of a widget callback.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetCallbackRequest {
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub invite_token: Option<String>,
    /// The raw payload produced by the provider widget. Shape is
    /// provider-specific: One Tap posts `{ "credential": "<jwt>" }`,
    /// Telegram posts the signed field map.
    pub payload: serde_json::Value,
}

/// Minimal user projection returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// Successful completion of a callback or widget flow.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,
    pub is_new_user: bool,
    pub user: UserResponse,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_close: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_intention: Option<String>,
}

impl SessionResponse {
    /// Build the wire shape from a flow outcome.
    #[must_use]
    pub fn from_result(result: &AuthResult) -> Self {
        let now = Utc::now();
        Self {
            session_token: result.session.as_ref().map(|s| s.token.clone()),
            token_type: "bearer",
            expires_in_seconds: result
                .session
                .as_ref()
                .map(|s| (s.expires_at - now).num_seconds()),
            is_new_user: result.is_new_user,
            user: UserResponse::from(&result.user),
            auto_close: result.auto_close,
            caller_intention: result.caller_intention.clone(),
        }
    }
}

/// A linked provider, without its stored secrets.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub provider: ProviderKind,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Response for the linked-provider listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksListResponse {
    pub links: Vec<LinkResponse>,
}

/// A provider available for sign-in on this instance.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableProvider {
    pub provider: ProviderKind,
    pub widget_based: bool,
}

/// Response for the available-provider listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableProvidersResponse {
    pub providers: Vec<AvailableProvider>,
}
