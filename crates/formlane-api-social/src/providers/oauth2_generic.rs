//! Generic OAuth2 authorization-code driver.
//!
//! Covers providers that speak plain OAuth2 without OIDC: endpoint URLs,
//! scopes, and profile-field names are configuration. The GitHub sign-in
//! registration is a preset of this driver.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{async_trait, AuthUrlParams, ProviderDriver, RedirectDriver};
use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, CallbackParams, RawProviderUser};

/// Profile-response field names for a provider.
#[derive(Debug, Clone)]
pub struct UserInfoFieldMap {
    pub id: &'static str,
    pub name: &'static str,
    /// Fallback when `name` is absent (e.g. GitHub's `login`).
    pub name_fallback: Option<&'static str>,
    pub email: &'static str,
    pub avatar: &'static str,
}

/// Endpoint and scope configuration for a generic OAuth2 provider.
#[derive(Debug, Clone)]
pub struct GenericOAuth2Config {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub identity_scopes: Vec<String>,
    pub integration_scopes: Vec<String>,
    pub fields: UserInfoFieldMap,
}

#[derive(Debug, Deserialize)]
struct OAuth2TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Generic OAuth2 driver.
#[derive(Clone)]
pub struct GenericOAuth2Driver {
    config: GenericOAuth2Config,
    http_client: Client,
}

impl GenericOAuth2Driver {
    #[must_use]
    pub fn new(config: GenericOAuth2Config) -> Self {
        Self {
            config,
            http_client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// GitHub sign-in preset.
    #[must_use]
    pub fn github(client_id: String, client_secret: String) -> Self {
        Self::new(GenericOAuth2Config {
            kind: ProviderKind::Github,
            client_id,
            client_secret,
            auth_endpoint: "https://github.com/login/oauth/authorize".to_string(),
            token_endpoint: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_endpoint: "https://api.github.com/user".to_string(),
            identity_scopes: vec!["read:user".to_string(), "user:email".to_string()],
            integration_scopes: vec![],
            fields: UserInfoFieldMap {
                id: "id",
                name: "name",
                name_fallback: Some("login"),
                email: "email",
                avatar: "avatar_url",
            },
        })
    }

    fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
        match value.get(key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl ProviderDriver for GenericOAuth2Driver {
    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn scopes_for_intent(&self, intent: AuthIntent) -> Vec<String> {
        let mut scopes = self.config.identity_scopes.clone();
        if intent == AuthIntent::Integration {
            scopes.extend(self.config.integration_scopes.iter().cloned());
        }
        scopes
    }

    fn as_redirect(&self) -> Option<&dyn RedirectDriver> {
        Some(self)
    }
}

#[async_trait]
impl RedirectDriver for GenericOAuth2Driver {
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
        Ok(url.into())
    }

    async fn exchange_and_fetch(
        &self,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> AuthFlowResult<RawProviderUser> {
        let kind = self.config.kind;
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
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable { provider: kind })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthFlowError::CodeExchangeFailed {
                provider: kind,
                status: status.as_u16(),
            });
        }

        let tokens: OAuth2TokenResponse = response.json().await?;

        let response = self
            .http_client
            .get(&self.config.userinfo_endpoint)
            .header("User-Agent", "formlane")
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|_| AuthFlowError::ProviderUnavailable { provider: kind })?;

        if !response.status().is_success() {
            return Err(AuthFlowError::ProviderUnavailable { provider: kind });
        }

        let profile: serde_json::Value = response.json().await?;
        let fields = &self.config.fields;

        let external_id = Self::string_field(&profile, fields.id).unwrap_or_default();
        let name = Self::string_field(&profile, fields.name).or_else(|| {
            fields
                .name_fallback
                .and_then(|key| Self::string_field(&profile, key))
        });

        Ok(RawProviderUser {
            external_id,
            name,
            email: Self::string_field(&profile, fields.email),
            email_verified: None,
            avatar_url: Self::string_field(&profile, fields.avatar),
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            scopes: tokens
                .scope
                .map(|s| {
                    s.split([' ', ','])
                        .filter(|part| !part.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> GenericOAuth2Driver {
        GenericOAuth2Driver::github("gh-client".to_string(), "gh-secret".to_string())
    }

    #[test]
    fn test_github_authorization_url() {
        let scopes = driver().scopes_for_intent(AuthIntent::Auth);
        let url = driver()
            .authorization_url(
                &scopes,
                "corr",
                &AuthUrlParams {
                    redirect_uri: "https://app.example.com/auth/github/callback".to_string(),
                    login_hint: None,
                },
            )
            .unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize"));
        assert!(url.contains("state=corr"));
        assert!(url.contains("scope=read%3Auser+user%3Aemail"));
    }

    #[test]
    fn test_unknown_intent_shape_keeps_identity_scopes() {
        // Integration scopes are empty for GitHub, so both intents collapse
        // to the identity set.
        assert_eq!(
            driver().scopes_for_intent(AuthIntent::Integration),
            driver().scopes_for_intent(AuthIntent::Auth)
        );
    }

    #[test]
    fn test_no_email_restriction_capability() {
        assert!(driver().as_email_restrictable().is_none());
        assert!(driver().as_redirect().is_some());
    }

    #[test]
    fn test_numeric_profile_id_rendered_as_string() {
        let profile = serde_json::json!({"id": 583231, "login": "octocat"});
        assert_eq!(
            GenericOAuth2Driver::string_field(&profile, "id").as_deref(),
            Some("583231")
        );
    }
}
