//! Google OAuth2/OIDC redirect driver.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{
    async_trait, AuthUrlParams, EmailRestrictable, ProviderDriver, RedirectDriver,
};
use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, CallbackParams, RawProviderUser};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Scopes granting access to the spreadsheets an integration exports to.
const INTEGRATION_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[allow(dead_code)]
    expires_in: Option<i64>,
    #[allow(dead_code)]
    id_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

/// Google authorization-code driver.
#[derive(Clone)]
pub struct GoogleDriver {
    client_id: String,
    client_secret: String,
    http_client: Client,
    auth_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

impl GoogleDriver {
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http_client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            auth_endpoint: AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            userinfo_endpoint: USERINFO_ENDPOINT.to_string(),
        }
    }

    /// Point the driver at non-default endpoints (tests).
    #[must_use]
    pub fn with_endpoints(
        mut self,
        auth_endpoint: String,
        token_endpoint: String,
        userinfo_endpoint: String,
    ) -> Self {
        self.auth_endpoint = auth_endpoint;
        self.token_endpoint = token_endpoint;
        self.userinfo_endpoint = userinfo_endpoint;
        self
    }
}

impl ProviderDriver for GoogleDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn scopes_for_intent(&self, intent: AuthIntent) -> Vec<String> {
        let mut scopes = vec![
            "openid".to_string(),
            "email".to_string(),
            "profile".to_string(),
        ];
        if intent == AuthIntent::Integration {
            scopes.extend(INTEGRATION_SCOPES.iter().map(ToString::to_string));
        }
        scopes
    }

    fn as_redirect(&self) -> Option<&dyn RedirectDriver> {
        Some(self)
    }

    fn as_email_restrictable(&self) -> Option<&dyn EmailRestrictable> {
        Some(self)
    }
}

impl EmailRestrictable for GoogleDriver {
    fn email_hint_param(&self) -> &'static str {
        "login_hint"
    }
}

#[async_trait]
impl RedirectDriver for GoogleDriver {
    fn authorization_url(
        &self,
        scopes: &[String],
        state: &str,
        params: &AuthUrlParams,
    ) -> AuthFlowResult<String> {
        let mut url = Url::parse(&self.auth_endpoint).map_err(|e| AuthFlowError::Internal {
            message: format!("invalid authorization endpoint: {e}"),
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        if let Some(hint) = &params.login_hint {
            url.query_pairs_mut()
                .append_pair(self.email_hint_param(), hint);
        }
        Ok(url.into())
    }

    async fn exchange_and_fetch(
        &self,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> AuthFlowResult<RawProviderUser> {
        let code = params
            .code
            .as_deref()
            .ok_or(AuthFlowError::MissingRequiredField { field: "code" })?;

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable {
                provider: ProviderKind::Google,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthFlowError::CodeExchangeFailed {
                provider: ProviderKind::Google,
                status: status.as_u16(),
            });
        }

        let tokens: GoogleTokenResponse = response.json().await?;

        let response = self
            .http_client
            .get(&self.userinfo_endpoint)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable {
                provider: ProviderKind::Google,
            })?;

        if !response.status().is_success() {
            return Err(AuthFlowError::ProviderUnavailable {
                provider: ProviderKind::Google,
            });
        }

        let info: GoogleUserInfo = response.json().await?;

        let name = info.name.or_else(|| match (info.given_name, info.family_name) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (Some(given), None) => Some(given),
            (None, Some(family)) => Some(family),
            _ => None,
        });

        Ok(RawProviderUser {
            external_id: info.sub,
            name,
            email: info.email,
            email_verified: info.email_verified,
            avatar_url: info.picture,
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            scopes: tokens
                .scope
                .map(|s| s.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> GoogleDriver {
        GoogleDriver::new("client-id".to_string(), "client-secret".to_string())
    }

    fn url_params() -> AuthUrlParams {
        AuthUrlParams {
            redirect_uri: "https://app.example.com/auth/google/callback".to_string(),
            login_hint: None,
        }
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let scopes = driver().scopes_for_intent(AuthIntent::Auth);
        let url = driver()
            .authorization_url(&scopes, "corr-token-123", &url_params())
            .unwrap();

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("state=corr-token-123"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("access_type=offline"));
        assert!(!url.contains("login_hint"));
    }

    #[test]
    fn test_authorization_url_with_login_hint() {
        let mut params = url_params();
        params.login_hint = Some("invitee@example.com".to_string());
        let scopes = driver().scopes_for_intent(AuthIntent::Auth);
        let url = driver()
            .authorization_url(&scopes, "s", &params)
            .unwrap();
        assert!(url.contains("login_hint=invitee%40example.com"));
    }

    #[test]
    fn test_auth_intent_gets_identity_scopes_only() {
        let scopes = driver().scopes_for_intent(AuthIntent::Auth);
        assert_eq!(scopes, vec!["openid", "email", "profile"]);
    }

    #[test]
    fn test_integration_intent_adds_spreadsheet_scopes() {
        let scopes = driver().scopes_for_intent(AuthIntent::Integration);
        assert!(scopes.contains(&"https://www.googleapis.com/auth/spreadsheets".to_string()));
        assert!(scopes.contains(&"openid".to_string()));
    }

    #[test]
    fn test_capabilities() {
        let d = driver();
        assert!(d.as_redirect().is_some());
        assert!(d.as_email_restrictable().is_some());
        assert!(d.as_widget().is_none());
    }
}
