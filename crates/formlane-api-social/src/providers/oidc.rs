//! Enterprise OIDC single-sign-on driver.
//!
//! Configured per deployment against a customer's identity provider. The
//! authorization-code exchange must return an ID token, which is verified
//! against the configured issuer and JWKS endpoint before any claim is used.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{
    async_trait, AuthUrlParams, EmailRestrictable, IdTokenVerifier, ProviderDriver,
    RedirectDriver,
};
use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, CallbackParams, RawProviderUser};

/// Endpoint configuration for one enterprise identity provider.
#[derive(Debug, Clone)]
pub struct EnterpriseOidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct OidcTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Enterprise OIDC driver.
#[derive(Clone)]
pub struct EnterpriseOidcDriver {
    config: EnterpriseOidcConfig,
    verifier: IdTokenVerifier,
    http_client: Client,
}

impl EnterpriseOidcDriver {
    #[must_use]
    pub fn new(config: EnterpriseOidcConfig, verifier: IdTokenVerifier) -> Self {
        Self {
            config,
            verifier,
            http_client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl ProviderDriver for EnterpriseOidcDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Oidc
    }

    fn scopes_for_intent(&self, _intent: AuthIntent) -> Vec<String> {
        // SSO is sign-in only; there is no wider integration grant to ask
        // for, so every intent gets the identity set.
        vec![
            "openid".to_string(),
            "email".to_string(),
            "profile".to_string(),
        ]
    }

    fn as_redirect(&self) -> Option<&dyn RedirectDriver> {
        Some(self)
    }

    fn as_email_restrictable(&self) -> Option<&dyn EmailRestrictable> {
        Some(self)
    }
}

impl EmailRestrictable for EnterpriseOidcDriver {
    fn email_hint_param(&self) -> &'static str {
        "login_hint"
    }
}

#[async_trait]
impl RedirectDriver for EnterpriseOidcDriver {
    fn authorization_url(
        &self,
        scopes: &[String],
        state: &str,
        params: &AuthUrlParams,
    ) -> AuthFlowResult<String> {
        let mut url =
            Url::parse(&self.config.auth_endpoint).map_err(|e| AuthFlowError::Internal {
                message: format!("invalid authorization endpoint: {e}"),
            })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);
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
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable {
                provider: ProviderKind::Oidc,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthFlowError::CodeExchangeFailed {
                provider: ProviderKind::Oidc,
                status: status.as_u16(),
            });
        }

        let tokens: OidcTokenResponse = response.json().await?;
        let id_token = tokens.id_token.ok_or(AuthFlowError::MissingFields {
            fields: "id_token".to_string(),
        })?;

        let claims = self
            .verifier
            .verify(
                &id_token,
                &self.config.client_id,
                &[self.config.issuer.as_str()],
                &self.config.jwks_uri,
                ProviderKind::Oidc,
            )
            .await?;

        let name = claims
            .name
            .clone()
            .or_else(|| match (&claims.given_name, &claims.family_name) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (Some(given), None) => Some(given.clone()),
                (None, Some(family)) => Some(family.clone()),
                _ => None,
            });

        Ok(RawProviderUser {
            external_id: claims.sub,
            name,
            email: claims.email,
            email_verified: claims.email_verified,
            avatar_url: claims.picture,
            access_token: tokens.access_token,
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

    fn config() -> EnterpriseOidcConfig {
        EnterpriseOidcConfig {
            issuer: "https://sso.customer.example".to_string(),
            client_id: "formlane-sso".to_string(),
            client_secret: "secret".to_string(),
            auth_endpoint: "https://sso.customer.example/oauth2/authorize".to_string(),
            token_endpoint: "https://sso.customer.example/oauth2/token".to_string(),
            jwks_uri: "https://sso.customer.example/oauth2/jwks".to_string(),
        }
    }

    fn driver() -> EnterpriseOidcDriver {
        EnterpriseOidcDriver::new(config(), IdTokenVerifier::new())
    }

    #[test]
    fn test_authorization_url_state_roundtrip() {
        let scopes = driver().scopes_for_intent(AuthIntent::Auth);
        let url = driver()
            .authorization_url(
                &scopes,
                "sso-state",
                &AuthUrlParams {
                    redirect_uri: "https://app.example.com/auth/oidc/callback".to_string(),
                    login_hint: Some("staff@customer.example".to_string()),
                },
            )
            .unwrap();
        assert!(url.contains("state=sso-state"));
        assert!(url.contains("login_hint=staff%40customer.example"));
        assert!(url.contains("scope=openid+email+profile"));
    }

    #[test]
    fn test_capabilities() {
        let d = driver();
        assert!(d.as_redirect().is_some());
        assert!(d.as_email_restrictable().is_some());
        assert!(d.as_widget().is_none());
    }

    fn driver_against(server: &wiremock::MockServer) -> EnterpriseOidcDriver {
        let base = server.uri();
        EnterpriseOidcDriver::new(
            EnterpriseOidcConfig {
                issuer: "https://sso.customer.example".to_string(),
                client_id: "formlane-sso".to_string(),
                client_secret: "secret".to_string(),
                auth_endpoint: format!("{base}/oauth2/authorize"),
                token_endpoint: format!("{base}/oauth2/token"),
                jwks_uri: format!("{base}/oauth2/jwks"),
            },
            IdTokenVerifier::new(),
        )
    }

    fn code_callback() -> CallbackParams {
        CallbackParams {
            code: Some("sso-code".to_string()),
            ..CallbackParams::default()
        }
    }

    #[tokio::test]
    async fn test_exchange_without_id_token_is_missing_fields() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let result = driver_against(&server)
            .exchange_and_fetch(&code_callback(), "https://app.example.com/cb")
            .await;
        assert!(matches!(result, Err(AuthFlowError::MissingFields { .. })));
    }

    #[tokio::test]
    async fn test_rejected_code_is_exchange_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let result = driver_against(&server)
            .exchange_and_fetch(&code_callback(), "https://app.example.com/cb")
            .await;
        assert!(matches!(
            result,
            Err(AuthFlowError::CodeExchangeFailed { status: 400, .. })
        ));
    }
}
