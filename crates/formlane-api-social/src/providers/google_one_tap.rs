//! Google One Tap widget driver.
//!
//! One Tap hands the browser a signed ID token ("credential") without a
//! redirect leg. The credential is verified against Google's published keys
//! before any field in it is trusted.

use super::{async_trait, IdTokenVerifier, ProviderDriver, WidgetDriver};
use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, RawProviderUser};

const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Google issues One Tap credentials under both spellings.
const GOOGLE_ISSUERS: &[&str] = &["https://accounts.google.com", "accounts.google.com"];

/// Google One Tap driver.
#[derive(Clone)]
pub struct GoogleOneTapDriver {
    client_id: String,
    verifier: IdTokenVerifier,
    jwks_uri: String,
}

impl GoogleOneTapDriver {
    #[must_use]
    pub fn new(client_id: String, verifier: IdTokenVerifier) -> Self {
        Self {
            client_id,
            verifier,
            jwks_uri: GOOGLE_JWKS_URI.to_string(),
        }
    }

    /// Point the driver at a non-default JWKS endpoint (tests).
    #[must_use]
    pub fn with_jwks_uri(mut self, jwks_uri: String) -> Self {
        self.jwks_uri = jwks_uri;
        self
    }

    fn credential<'a>(&self, payload: &'a serde_json::Value) -> AuthFlowResult<&'a str> {
        payload
            .get("credential")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(AuthFlowError::MalformedToken {
                reason: "widget payload is missing 'credential'".to_string(),
            })
    }
}

impl ProviderDriver for GoogleOneTapDriver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleOneTap
    }

    fn scopes_for_intent(&self, _intent: AuthIntent) -> Vec<String> {
        // The widget only ever yields identity claims.
        vec![
            "openid".to_string(),
            "email".to_string(),
            "profile".to_string(),
        ]
    }

    fn as_widget(&self) -> Option<&dyn WidgetDriver> {
        Some(self)
    }
}

#[async_trait]
impl WidgetDriver for GoogleOneTapDriver {
    async fn verify_payload(&self, payload: &serde_json::Value) -> AuthFlowResult<()> {
        let credential = self.credential(payload)?;
        self.verifier
            .verify(
                credential,
                &self.client_id,
                GOOGLE_ISSUERS,
                &self.jwks_uri,
                ProviderKind::GoogleOneTap,
            )
            .await?;
        Ok(())
    }

    async fn extract_identity(
        &self,
        payload: &serde_json::Value,
    ) -> AuthFlowResult<RawProviderUser> {
        let credential = self.credential(payload)?;
        // Full verification again; extraction never reads unverified claims.
        let claims = self
            .verifier
            .verify(
                credential,
                &self.client_id,
                GOOGLE_ISSUERS,
                &self.jwks_uri,
                ProviderKind::GoogleOneTap,
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
            access_token: None,
            refresh_token: None,
            scopes: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver() -> GoogleOneTapDriver {
        GoogleOneTapDriver::new("client-id".to_string(), IdTokenVerifier::new())
    }

    #[tokio::test]
    async fn test_payload_without_credential_is_malformed() {
        let result = driver().verify_payload(&json!({"select_by": "user"})).await;
        assert!(matches!(result, Err(AuthFlowError::MalformedToken { .. })));
    }

    #[tokio::test]
    async fn test_empty_credential_is_malformed() {
        let result = driver().verify_payload(&json!({"credential": ""})).await;
        assert!(matches!(result, Err(AuthFlowError::MalformedToken { .. })));
    }

    #[test]
    fn test_widget_capability_only() {
        let d = driver();
        assert!(d.as_widget().is_some());
        assert!(d.as_redirect().is_none());
        assert!(d.as_email_restrictable().is_none());
    }

    #[test]
    fn test_intent_never_widens_scopes() {
        let d = driver();
        assert_eq!(
            d.scopes_for_intent(AuthIntent::Auth),
            d.scopes_for_intent(AuthIntent::Integration)
        );
    }
}
