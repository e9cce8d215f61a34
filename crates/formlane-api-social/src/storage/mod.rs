//! Port adapters.
//!
//! `memory` backs tests and single-process deployments; `postgres` is the
//! durable implementation for invites, users, workspaces, and provider
//! links. The ephemeral key/value store stays process-external in
//! production (any TTL-capable store satisfies the port).

pub mod memory;
pub mod postgres;
