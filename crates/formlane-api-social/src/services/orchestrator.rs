//! Flow orchestration façade.
//!
//! One entry point per flow shape: redirect-start, redirect-callback, and
//! widget-callback. No state lives here between requests; everything a
//! callback needs rides in the ephemeral context store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use formlane_core::UserId;

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::{AuthIntent, AuthResult, CallbackParams, FlowContext};
use crate::ports::SessionTokenIssuer;
use crate::providers::{AuthUrlParams, ProviderRegistry};
use crate::services::context_service::FlowContextStore;
use crate::services::invite_service::InviteResolver;
use crate::services::link_service::AccountLinker;
use crate::services::normalizer::normalize;

/// Optional inputs at redirect-start.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub invite_token: Option<String>,
    pub utm_data: Option<HashMap<String, String>>,
    pub caller_intention: Option<String>,
    pub auto_close: bool,
}

/// Output of redirect-start.
#[derive(Debug, Clone)]
pub struct StartedRedirect {
    pub authorization_url: String,
    pub correlation_token: String,
}

/// Sequences drivers, verification, normalization, invites, and linking per
/// entry point.
#[derive(Clone)]
pub struct FlowOrchestrator {
    registry: Arc<ProviderRegistry>,
    contexts: FlowContextStore,
    invites: InviteResolver,
    linker: AccountLinker,
    sessions: Arc<dyn SessionTokenIssuer>,
    base_url: String,
}

impl FlowOrchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        contexts: FlowContextStore,
        invites: InviteResolver,
        linker: AccountLinker,
        sessions: Arc<dyn SessionTokenIssuer>,
        base_url: String,
    ) -> Self {
        Self {
            registry,
            contexts,
            invites,
            linker,
            sessions,
            base_url,
        }
    }

    fn callback_uri(&self, provider: ProviderKind) -> String {
        format!("{}/auth/{}/callback", self.base_url, provider)
    }

    /// Begin a redirect flow: validate the request, park the context, and
    /// hand back the provider authorization URL.
    pub async fn start_redirect(
        &self,
        provider: ProviderKind,
        intent: AuthIntent,
        options: StartOptions,
        session_user: Option<UserId>,
    ) -> AuthFlowResult<StartedRedirect> {
        let driver = self.registry.get(provider)?;
        let redirect = driver
            .as_redirect()
            .ok_or(AuthFlowError::UnsupportedFlow { provider })?;

        // Checked before anything is written: a failed start leaves no
        // context behind.
        if intent == AuthIntent::Integration && session_user.is_none() {
            return Err(AuthFlowError::UnauthenticatedForIntegration);
        }

        let invited_email = match &options.invite_token {
            Some(token) => Some(self.invites.resolve(token).await?.email),
            None => None,
        };

        let context = FlowContext {
            intent,
            utm_data: options.utm_data,
            invited_email: invited_email.clone(),
            invite_token: options.invite_token,
            caller_intention: options.caller_intention,
            auto_close: options.auto_close,
            user_id: if intent == AuthIntent::Integration {
                session_user
            } else {
                None
            },
        };
        let correlation_token = self.contexts.put(&context).await?;

        // Pre-scope the provider login screen to the invited email where the
        // driver can. The post-callback match check still runs regardless.
        let login_hint = match driver.as_email_restrictable() {
            Some(_) => invited_email,
            None => None,
        };

        let scopes = driver.scopes_for_intent(intent);
        let authorization_url = redirect.authorization_url(
            &scopes,
            &correlation_token,
            &AuthUrlParams {
                redirect_uri: self.callback_uri(provider),
                login_hint,
            },
        )?;

        info!(provider = %provider, intent = %intent, "Started redirect flow");
        Ok(StartedRedirect {
            authorization_url,
            correlation_token,
        })
    }

    /// Complete a redirect flow from provider callback parameters.
    pub async fn complete_redirect(
        &self,
        provider: ProviderKind,
        params: &CallbackParams,
    ) -> AuthFlowResult<AuthResult> {
        let driver = self.registry.get(provider)?;
        let redirect = driver
            .as_redirect()
            .ok_or(AuthFlowError::UnsupportedFlow { provider })?;

        if let Some(error) = &params.error {
            warn!(provider = %provider, error = %error, "Provider returned callback error");
            return Err(if error == "access_denied" {
                AuthFlowError::ProviderDenied
            } else {
                AuthFlowError::ProviderUnavailable { provider }
            });
        }

        // Single use: the context is deleted on read, so replaying this
        // callback with the same state fails even if a later step errors.
        let state = params
            .state
            .as_deref()
            .ok_or(AuthFlowError::ContextExpired)?;
        let context = self.contexts.take(state).await?;

        let raw = redirect
            .exchange_and_fetch(params, &self.callback_uri(provider))
            .await?;
        let identity = normalize(raw)?;

        // Invite enforcement runs before any user lookup or creation.
        InviteResolver::enforce_email_match(
            identity.email.as_deref(),
            context.invited_email.as_deref(),
        )?;

        let invite = match &context.invite_token {
            Some(token) => Some(self.invites.resolve(token).await?),
            None => None,
        };

        let (resolution, session) = match context.intent {
            AuthIntent::Auth => {
                let resolution = self
                    .linker
                    .resolve_auth(provider, &identity, invite.as_ref(), context.utm_data.clone())
                    .await?;
                let session = self.sessions.issue(resolution.user.id).await?;
                (resolution, Some(session))
            }
            AuthIntent::Integration => {
                let user_id = context
                    .user_id
                    .ok_or(AuthFlowError::UnauthenticatedForIntegration)?;
                let resolution = self
                    .linker
                    .resolve_integration(provider, &identity, user_id)
                    .await?;
                (resolution, None)
            }
        };

        Ok(AuthResult {
            user: resolution.user,
            session,
            is_new_user: resolution.is_new_user,
            auto_close: context.auto_close,
            caller_intention: context.caller_intention,
        })
    }

    /// Complete a widget flow. The signed payload is itself the proof of
    /// completion, so no correlation token is involved.
    pub async fn complete_widget(
        &self,
        provider: ProviderKind,
        payload: &serde_json::Value,
        intent: AuthIntent,
        invite_token: Option<&str>,
        session_user: Option<UserId>,
        session_key: Option<&str>,
    ) -> AuthFlowResult<AuthResult> {
        let driver = self.registry.get(provider)?;
        let widget = driver
            .as_widget()
            .ok_or(AuthFlowError::UnsupportedFlow { provider })?;

        widget.verify_payload(payload).await?;
        let identity = normalize(widget.extract_identity(payload).await?)?;

        let invite = match invite_token {
            Some(token) => Some(self.invites.resolve(token).await?),
            None => None,
        };
        InviteResolver::enforce_email_match(
            identity.email.as_deref(),
            invite.as_ref().map(|i| i.email.as_str()),
        )?;

        // Pick up any context stashed for this session (UTM attribution,
        // window behavior) and clear it once used.
        let stashed = match session_key {
            Some(key) => self.contexts.get_for_session(key).await?,
            None => None,
        };

        let (resolution, session) = match intent {
            AuthIntent::Auth => {
                let utm = stashed.as_ref().and_then(|c| c.utm_data.clone());
                let resolution = self
                    .linker
                    .resolve_auth(provider, &identity, invite.as_ref(), utm)
                    .await?;
                let session = self.sessions.issue(resolution.user.id).await?;
                (resolution, Some(session))
            }
            AuthIntent::Integration => {
                let user_id = session_user.ok_or(AuthFlowError::UnauthenticatedForIntegration)?;
                let resolution = self
                    .linker
                    .resolve_integration(provider, &identity, user_id)
                    .await?;
                (resolution, None)
            }
        };

        if let Some(key) = session_key {
            self.contexts.clear_for_session(key).await?;
        }

        info!(provider = %provider, intent = %intent, "Completed widget flow");
        Ok(AuthResult {
            user: resolution.user,
            session,
            is_new_user: resolution.is_new_user,
            auto_close: stashed.as_ref().map(|c| c.auto_close).unwrap_or(false),
            caller_intention: stashed.and_then(|c| c.caller_intention),
        })
    }

    /// Stash flow context for a widget round-trip, keyed by the caller's
    /// session. The application calls this when rendering a page that hosts
    /// a sign-in widget.
    pub async fn stash_widget_context(
        &self,
        session_key: &str,
        context: &FlowContext,
    ) -> AuthFlowResult<()> {
        self.contexts.put_for_session(session_key, context).await
    }
}
