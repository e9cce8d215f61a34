//! Router and shared state for the authentication endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::error::AuthFlowResult;
use crate::handlers;
use crate::ports::{
    InviteRepository, KeyValueStore, ProviderLinkRepository, SessionTokenIssuer, UserRepository,
    WorkspaceService,
};
use crate::providers::ProviderRegistry;
use crate::services::{AccountLinker, FlowContextStore, FlowOrchestrator, InviteResolver,
    RegistrationPolicy};

/// Configuration for the auth subsystem.
pub struct AuthConfig {
    /// Public base URL, used to build provider callback URIs.
    pub base_url: String,
    /// Whether sign-ups without an invitation are accepted.
    pub allow_open_signup: bool,
}

/// The collaborator implementations the application wires in.
pub struct AuthPorts {
    pub users: Arc<dyn UserRepository>,
    pub workspaces: Arc<dyn WorkspaceService>,
    pub invites: Arc<dyn InviteRepository>,
    pub links: Arc<dyn ProviderLinkRepository>,
    pub sessions: Arc<dyn SessionTokenIssuer>,
    pub kv: Arc<dyn KeyValueStore>,
}

/// Shared state for authentication handlers.
#[derive(Clone)]
pub struct AuthState {
    pub orchestrator: Arc<FlowOrchestrator>,
    pub registry: Arc<ProviderRegistry>,
    pub linker: AccountLinker,
    pub links: Arc<dyn ProviderLinkRepository>,
}

impl AuthState {
    /// Wire the services from configuration, a driver registry, and port
    /// implementations.
    pub fn new(
        config: AuthConfig,
        registry: Arc<ProviderRegistry>,
        ports: AuthPorts,
    ) -> AuthFlowResult<Self> {
        let contexts = FlowContextStore::new(ports.kv);
        let invites = InviteResolver::new(ports.invites.clone());
        let linker = AccountLinker::new(
            ports.users,
            ports.links.clone(),
            ports.invites,
            ports.workspaces,
            RegistrationPolicy {
                allow_open_signup: config.allow_open_signup,
            },
        );
        let orchestrator = Arc::new(FlowOrchestrator::new(
            registry.clone(),
            contexts,
            invites,
            linker.clone(),
            ports.sessions,
            config.base_url,
        ));

        Ok(Self {
            orchestrator,
            registry,
            linker,
            links: ports.links,
        })
    }
}

/// Public flow routes. Anonymous callers are fine; integration intent is
/// rejected inside the orchestrator when no session is present.
pub fn public_auth_router() -> Router<AuthState> {
    Router::new()
        .route("/providers", get(handlers::available_providers))
        .route("/:provider/start", get(handlers::start_redirect))
        .route("/:provider/callback", get(handlers::callback))
        .route("/:provider/widget", post(handlers::widget_callback))
}

/// Routes that require an authenticated session.
pub fn authenticated_auth_router() -> Router<AuthState> {
    Router::new()
        .route("/links", get(handlers::list_links))
        .route("/links/:provider", delete(handlers::unlink))
}

/// The complete auth router, typically mounted at `/auth`.
pub fn auth_router() -> Router<AuthState> {
    Router::new()
        .merge(public_auth_router())
        .merge(authenticated_auth_router())
}
