//! Collaborator ports.
//!
//! The auth core touches the rest of the application only through these
//! narrow traits. Adapters live in [`crate::storage`]; the application wires
//! its own implementations when it has richer ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use formlane_core::{InviteId, LinkId, UserId, WorkspaceId};

use crate::error::{AuthFlowResult, ProviderKind};

/// Minimal user projection the auth core reads and creates.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    /// Unique, lowercased. Absent for users created by email-less providers.
    pub email: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub signup_provider: Option<ProviderKind>,
    pub signup_provider_user_id: Option<String>,
    pub has_password: bool,
    pub is_blocked: bool,
}

/// Fields for creating a user from an external identity.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Option<String>,
    pub name: String,
    pub avatar_url: Option<String>,
    pub signup_provider: ProviderKind,
    pub signup_provider_user_id: String,
    pub utm_data: Option<HashMap<String, String>>,
}

/// User lookup and creation.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by lowercased email.
    async fn find_by_email(&self, email: &str) -> AuthFlowResult<Option<User>>;

    /// Create a user. The repository owns id assignment.
    async fn create(&self, fields: NewUser) -> AuthFlowResult<User>;

    /// Load a user by id.
    async fn load(&self, id: UserId) -> AuthFlowResult<Option<User>>;
}

/// Role a user holds inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Member,
}

impl std::fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceRole::Owner => write!(f, "owner"),
            WorkspaceRole::Admin => write!(f, "admin"),
            WorkspaceRole::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for WorkspaceRole {
    type Err = crate::error::AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(WorkspaceRole::Owner),
            "admin" => Ok(WorkspaceRole::Admin),
            "member" => Ok(WorkspaceRole::Member),
            other => Err(crate::error::AuthFlowError::Internal {
                message: format!("unknown workspace role '{other}'"),
            }),
        }
    }
}

/// Workspace handle returned on creation.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
}

/// Workspace creation and membership assignment.
#[async_trait]
pub trait WorkspaceService: Send + Sync {
    /// Create a fresh personal workspace for a new user.
    async fn create_default_workspace(&self) -> AuthFlowResult<Workspace>;

    /// Add a user to a workspace with a role.
    async fn assign_user(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: WorkspaceRole,
    ) -> AuthFlowResult<()>;
}

/// Invitation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Expired,
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InviteStatus::Pending => write!(f, "pending"),
            InviteStatus::Accepted => write!(f, "accepted"),
            InviteStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for InviteStatus {
    type Err = crate::error::AuthFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "expired" => Ok(InviteStatus::Expired),
            other => Err(crate::error::AuthFlowError::Internal {
                message: format!("unknown invite status '{other}'"),
            }),
        }
    }
}

/// A workspace invitation row.
#[derive(Debug, Clone)]
pub struct Invite {
    pub id: InviteId,
    pub email: String,
    pub token: String,
    pub workspace_id: WorkspaceId,
    pub role: WorkspaceRole,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of the conditional Pending -> Accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    AlreadyConsumed,
}

/// Invitation lookup and single-use consumption.
#[async_trait]
pub trait InviteRepository: Send + Sync {
    /// Find an invitation by its raw token, regardless of status.
    async fn find_by_token(&self, token: &str) -> AuthFlowResult<Option<Invite>>;

    /// Transition Pending -> Accepted.
    ///
    /// Must be atomic: two concurrent calls for the same invite yield exactly
    /// one `Accepted` and one `AlreadyConsumed`.
    async fn mark_accepted(&self, id: InviteId) -> AuthFlowResult<AcceptOutcome>;
}

/// A durable link between a user and an external identity.
///
/// `(provider, external_id)` maps to at most one user. Tokens are secrets and
/// never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderLink {
    pub id: LinkId,
    pub user_id: UserId,
    pub provider: ProviderKind,
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a provider link.
#[derive(Debug, Clone)]
pub struct NewProviderLink {
    pub user_id: UserId,
    pub provider: ProviderKind,
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
}

/// Durable storage for provider links.
#[async_trait]
pub trait ProviderLinkRepository: Send + Sync {
    async fn find_by_provider_user(
        &self,
        provider: ProviderKind,
        external_id: &str,
    ) -> AuthFlowResult<Option<ProviderLink>>;

    async fn list_for_user(&self, user_id: UserId) -> AuthFlowResult<Vec<ProviderLink>>;

    /// Insert a new link. A concurrent insert for the same
    /// `(provider, external_id)` under a different user must fail rather
    /// than overwrite.
    async fn create(&self, link: NewProviderLink) -> AuthFlowResult<ProviderLink>;

    /// Refresh stored tokens/scopes on an existing link.
    async fn update_tokens(
        &self,
        id: LinkId,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        scopes: &[String],
    ) -> AuthFlowResult<()>;

    /// Delete a user's link for a provider. Returns whether a row was removed.
    async fn delete(&self, user_id: UserId, provider: ProviderKind) -> AuthFlowResult<bool>;
}

/// An application session token issued after authentication.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues application session tokens. Opaque to this core.
#[async_trait]
pub trait SessionTokenIssuer: Send + Sync {
    async fn issue(&self, user_id: UserId) -> AuthFlowResult<IssuedToken>;
}

/// Ephemeral key/value storage with per-entry TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> AuthFlowResult<()>;

    /// Absent or expired keys yield `None`; callers decide what that means.
    async fn get(&self, key: &str) -> AuthFlowResult<Option<String>>;

    async fn delete(&self, key: &str) -> AuthFlowResult<()>;
}
