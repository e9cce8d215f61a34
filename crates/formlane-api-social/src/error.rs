//! Authentication flow error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity provider enumeration.
///
/// `Github` is served by the generic OAuth2 driver; `Oidc` is the enterprise
/// single-sign-on driver configured per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    GoogleOneTap,
    Telegram,
    Github,
    Oidc,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Google => write!(f, "google"),
            ProviderKind::GoogleOneTap => write!(f, "google_one_tap"),
            ProviderKind::Telegram => write!(f, "telegram"),
            ProviderKind::Github => write!(f, "github"),
            ProviderKind::Oidc => write!(f, "oidc"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "google" => Ok(ProviderKind::Google),
            "google_one_tap" => Ok(ProviderKind::GoogleOneTap),
            "telegram" => Ok(ProviderKind::Telegram),
            "github" => Ok(ProviderKind::Github),
            "oidc" => Ok(ProviderKind::Oidc),
            _ => Err(AuthFlowError::InvalidProvider {
                provider: s.to_string(),
            }),
        }
    }
}

/// Authentication flow errors.
///
/// Every failure mode a caller can branch on has its own variant; none of
/// them are retried internally.
#[derive(Debug, Error)]
pub enum AuthFlowError {
    // Token verification
    #[error("Token is malformed: {reason}")]
    MalformedToken { reason: String },

    #[error("Token is outside its validity window")]
    Expired,

    #[error("Token audience does not match this application")]
    BadAudience,

    #[error("Token issuer is not trusted for provider {provider}")]
    BadIssuer { provider: ProviderKind },

    #[error("Token is missing required claims: {fields}")]
    MissingFields { fields: String },

    #[error("Token signature verification failed")]
    InvalidSignature,

    #[error("Token algorithm is not allowed (only RS256 is accepted)")]
    AlgorithmNotAllowed,

    // Flow correlation
    #[error("Sign-in flow has expired, please start again")]
    ContextExpired,

    // Invites
    #[error("Invitation is not valid")]
    InvalidInvite,

    #[error("Invitation has expired")]
    ExpiredInvite,

    #[error("Signed-in identity does not match the invited email address")]
    EmailMismatch,

    #[error("Invitation has already been used")]
    InviteAlreadyConsumed,

    // Account linking
    #[error("An account with this email already exists under a different sign-in method")]
    EmailAlreadyExists,

    #[error("This {provider} account is already linked to another user")]
    ProviderAlreadyLinked { provider: ProviderKind },

    #[error("New registrations are disabled on this instance")]
    RegistrationDisabled,

    #[error("This account has been blocked")]
    UserBlocked,

    #[error("Cannot unlink: {reason}")]
    UnlinkForbidden { reason: String },

    #[error("No {provider} account is linked to this user")]
    LinkNotFound { provider: ProviderKind },

    // Providers
    #[error("Unknown provider: {provider}")]
    InvalidProvider { provider: String },

    #[error("Provider {provider} does not support this flow")]
    UnsupportedFlow { provider: ProviderKind },

    #[error("Provider {provider} is unreachable")]
    ProviderUnavailable { provider: ProviderKind },

    #[error("Sign-in was cancelled at the provider")]
    ProviderDenied,

    #[error("Code exchange with {provider} failed: HTTP {status}")]
    CodeExchangeFailed { provider: ProviderKind, status: u16 },

    #[error("Provider identity is missing required field '{field}'")]
    MissingRequiredField { field: &'static str },

    // Session / authorization
    #[error("Connecting an integration requires an authenticated session")]
    UnauthenticatedForIntegration,

    #[error("Authentication required")]
    Unauthenticated,

    // Infrastructure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<sqlx::Error> for AuthFlowError {
    fn from(err: sqlx::Error) -> Self {
        AuthFlowError::Storage(err.to_string())
    }
}

/// Error response body for API responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AuthFlowError {
    /// Stable error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthFlowError::MalformedToken { .. } => "malformed_token",
            AuthFlowError::Expired => "expired",
            AuthFlowError::BadAudience => "bad_audience",
            AuthFlowError::BadIssuer { .. } => "bad_issuer",
            AuthFlowError::MissingFields { .. } => "missing_fields",
            AuthFlowError::InvalidSignature => "invalid_signature",
            AuthFlowError::AlgorithmNotAllowed => "algorithm_not_allowed",
            AuthFlowError::ContextExpired => "context_expired",
            AuthFlowError::InvalidInvite => "invalid_invite",
            AuthFlowError::ExpiredInvite => "expired_invite",
            AuthFlowError::EmailMismatch => "email_mismatch",
            AuthFlowError::InviteAlreadyConsumed => "invite_already_consumed",
            AuthFlowError::EmailAlreadyExists => "email_already_exists_different_provider",
            AuthFlowError::ProviderAlreadyLinked { .. } => "provider_already_linked",
            AuthFlowError::RegistrationDisabled => "registration_disabled",
            AuthFlowError::UserBlocked => "user_blocked",
            AuthFlowError::UnlinkForbidden { .. } => "unlink_forbidden",
            AuthFlowError::LinkNotFound { .. } => "link_not_found",
            AuthFlowError::InvalidProvider { .. } => "invalid_provider",
            AuthFlowError::UnsupportedFlow { .. } => "unsupported_flow",
            AuthFlowError::ProviderUnavailable { .. } => "provider_unavailable",
            AuthFlowError::ProviderDenied => "provider_denied",
            AuthFlowError::CodeExchangeFailed { .. } => "code_exchange_failed",
            AuthFlowError::MissingRequiredField { .. } => "missing_required_field",
            AuthFlowError::UnauthenticatedForIntegration => "unauthenticated_for_integration",
            AuthFlowError::Unauthenticated => "unauthenticated",
            AuthFlowError::Storage(_) => "storage_error",
            AuthFlowError::Http(_) => "http_error",
            AuthFlowError::Json(_) => "json_error",
            AuthFlowError::Internal { .. } => "internal_error",
        }
    }

    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthFlowError::MalformedToken { .. }
            | AuthFlowError::Expired
            | AuthFlowError::BadAudience
            | AuthFlowError::BadIssuer { .. }
            | AuthFlowError::MissingFields { .. }
            | AuthFlowError::InvalidSignature
            | AuthFlowError::AlgorithmNotAllowed
            | AuthFlowError::ContextExpired
            | AuthFlowError::InvalidInvite
            | AuthFlowError::ExpiredInvite
            | AuthFlowError::EmailMismatch
            | AuthFlowError::InvalidProvider { .. }
            | AuthFlowError::UnsupportedFlow { .. }
            | AuthFlowError::ProviderDenied
            | AuthFlowError::CodeExchangeFailed { .. }
            | AuthFlowError::MissingRequiredField { .. } => StatusCode::BAD_REQUEST,
            AuthFlowError::UnauthenticatedForIntegration | AuthFlowError::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            AuthFlowError::RegistrationDisabled
            | AuthFlowError::UserBlocked
            | AuthFlowError::UnlinkForbidden { .. } => StatusCode::FORBIDDEN,
            AuthFlowError::LinkNotFound { .. } => StatusCode::NOT_FOUND,
            AuthFlowError::InviteAlreadyConsumed
            | AuthFlowError::EmailAlreadyExists
            | AuthFlowError::ProviderAlreadyLinked { .. } => StatusCode::CONFLICT,
            AuthFlowError::ProviderUnavailable { .. } | AuthFlowError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthFlowError::Storage(_)
            | AuthFlowError::Json(_)
            | AuthFlowError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthFlowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Infrastructure details stay in the logs; clients get a generic line.
        // Token material and emails never appear in either.
        let message = match &self {
            AuthFlowError::Storage(e) => {
                tracing::error!("Auth storage error: {e}");
                "A storage error occurred".to_string()
            }
            AuthFlowError::Http(e) => {
                tracing::error!("Auth HTTP client error: {e:?}");
                "An upstream request failed".to_string()
            }
            AuthFlowError::Json(e) => {
                tracing::error!("Auth JSON error: {e}");
                "A data processing error occurred".to_string()
            }
            AuthFlowError::Internal { message } => {
                tracing::error!("Auth internal error: {message}");
                "An internal error occurred".to_string()
            }
            AuthFlowError::MalformedToken { reason } => {
                tracing::debug!("Malformed token rejected: {reason}");
                "Credential is malformed".to_string()
            }
            AuthFlowError::CodeExchangeFailed { provider, status } => {
                tracing::warn!(provider = %provider, status = %status, "Code exchange failed");
                format!("Code exchange failed with {provider}")
            }
            _ => self.to_string(),
        };
        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias for authentication flow operations.
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;
