//! Identity provider drivers.
//!
//! One driver per provider, each implementing the small capability traits it
//! actually supports. Capabilities are discovered through the `as_*`
//! accessors rather than flags, so a claimed capability always has a real
//! implementation behind it.

pub mod google;
pub mod google_one_tap;
pub mod id_token_verifier;
pub mod oauth2_generic;
pub mod oidc;
pub mod telegram;

pub use async_trait::async_trait;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, CallbackParams, RawProviderUser};

pub use google::GoogleDriver;
pub use google_one_tap::GoogleOneTapDriver;
pub use id_token_verifier::{IdTokenVerifier, VerifiedIdToken};
pub use oauth2_generic::GenericOAuth2Driver;
pub use oidc::EnterpriseOidcDriver;
pub use telegram::TelegramDriver;

/// Context for building an authorization URL.
#[derive(Debug, Clone)]
pub struct AuthUrlParams {
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Pre-scopes the provider's account chooser to an email. UX hint only;
    /// the post-callback email check remains the enforcement point.
    pub login_hint: Option<String>,
}

/// Common driver surface.
pub trait ProviderDriver: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Scopes to request for an intent. Unknown intents get the minimal
    /// identity scope set.
    fn scopes_for_intent(&self, intent: AuthIntent) -> Vec<String>;

    /// Redirect capability, when the provider runs an authorization-code
    /// flow.
    fn as_redirect(&self) -> Option<&dyn RedirectDriver> {
        None
    }

    /// Widget capability, when the provider hands the client a signed
    /// payload directly.
    fn as_widget(&self) -> Option<&dyn WidgetDriver> {
        None
    }

    /// Email-restriction capability. Drivers without it simply never receive
    /// a login hint; invoking the hint on them is a no-op by construction.
    fn as_email_restrictable(&self) -> Option<&dyn EmailRestrictable> {
        None
    }
}

/// Authorization-code redirect flow.
#[async_trait]
pub trait RedirectDriver: Send + Sync {
    /// Build the provider authorization URL. Pure construction; the `state`
    /// must round-trip through the provider unmodified.
    fn authorization_url(
        &self,
        scopes: &[String],
        state: &str,
        params: &AuthUrlParams,
    ) -> AuthFlowResult<String>;

    /// Exchange the callback for provider tokens and profile data.
    ///
    /// Network failures surface as `ProviderUnavailable`; a rejected code is
    /// `CodeExchangeFailed`. Neither is retried here.
    async fn exchange_and_fetch(
        &self,
        params: &CallbackParams,
        redirect_uri: &str,
    ) -> AuthFlowResult<RawProviderUser>;
}

/// Signed-widget flow (One Tap, Telegram login widget).
#[async_trait]
pub trait WidgetDriver: Send + Sync {
    /// Verify the widget payload's authenticity. Fails descriptively on
    /// malformed or forged payloads.
    async fn verify_payload(&self, payload: &serde_json::Value) -> AuthFlowResult<()>;

    /// Extract the identity from a payload. Implementations re-verify before
    /// trusting any field.
    async fn extract_identity(&self, payload: &serde_json::Value)
        -> AuthFlowResult<RawProviderUser>;
}

/// Provider-side email restriction for the authorization request.
pub trait EmailRestrictable: Send + Sync {
    /// The query parameter carrying the email hint (e.g. `login_hint`).
    fn email_hint_param(&self) -> &'static str;
}

/// Explicit driver registry, built once at startup and injected into the
/// orchestrator.
#[derive(Default)]
pub struct ProviderRegistry {
    drivers: HashMap<ProviderKind, Arc<dyn ProviderDriver>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own kind. Replaces any previous driver of
    /// the same kind.
    #[must_use]
    pub fn register(mut self, driver: Arc<dyn ProviderDriver>) -> Self {
        self.drivers.insert(driver.kind(), driver);
        self
    }

    /// Look up a driver.
    pub fn get(&self, kind: ProviderKind) -> AuthFlowResult<&Arc<dyn ProviderDriver>> {
        self.drivers
            .get(&kind)
            .ok_or_else(|| AuthFlowError::InvalidProvider {
                provider: kind.to_string(),
            })
    }

    /// All registered kinds, with their widget capability.
    #[must_use]
    pub fn available(&self) -> Vec<(ProviderKind, bool)> {
        let mut list: Vec<(ProviderKind, bool)> = self
            .drivers
            .values()
            .map(|d| (d.kind(), d.as_widget().is_some()))
            .collect();
        list.sort_by_key(|(kind, _)| kind.to_string());
        list
    }
}
