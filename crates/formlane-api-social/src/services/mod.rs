//! Flow services: context correlation, normalization, invites, account
//! linking, and the orchestrator tying them together.

pub mod context_service;
pub mod invite_service;
pub mod link_service;
pub mod normalizer;
pub mod orchestrator;

pub use context_service::FlowContextStore;
pub use invite_service::InviteResolver;
pub use link_service::{AccountLinker, LinkResolution, RegistrationPolicy};
pub use normalizer::normalize;
pub use orchestrator::{FlowOrchestrator, StartOptions, StartedRedirect};
