//! External identity federation for Formlane.
//!
//! This crate lets a user authenticate or link an external account through
//! OAuth2/OIDC redirect flows (Google, GitHub, enterprise SSO), widget flows
//! (Google One Tap, the Telegram login widget), and reconciles the result
//! with Formlane's user/workspace model.
//!
//! # Overview
//!
//! - **Provider drivers** normalize each provider's protocol behind small
//!   capability traits; a [`providers::ProviderRegistry`] built at startup
//!   holds the enabled set.
//! - **Token verification** checks structure, claims, and signature in that
//!   order, pinned to RS256, before any claim is trusted.
//! - **Account linking** decides sign-in vs. sign-up vs. conflict, enforces
//!   invite restrictions, and owns the only mandatory atomic transition
//!   (invite acceptance).
//! - **Collaborators** (users, workspaces, invites, sessions, ephemeral
//!   storage) are reached only through the traits in [`ports`].
//!
//! # Example
//!
//! ```rust,ignore
//! use formlane_api_social::router::{auth_router, AuthConfig, AuthPorts, AuthState};
//!
//! let state = AuthState::new(config, registry, ports)?;
//! let app = Router::new().nest("/auth", auth_router().with_state(state));
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod ports;
pub mod providers;
pub mod router;
pub mod services;
pub mod storage;

pub use error::{AuthFlowError, AuthFlowResult, ProviderKind};
pub use models::{AuthIntent, AuthResult, CanonicalIdentity, FlowContext};
pub use router::{auth_router, authenticated_auth_router, public_auth_router, AuthConfig,
    AuthPorts, AuthState};
