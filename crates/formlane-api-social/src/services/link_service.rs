//! Account linking: the decision engine behind every completed flow.
//!
//! Given a canonical identity and an intent, decides whether to sign an
//! existing user in, create a new one, attach the identity to the current
//! session's user, or reject the attempt as a conflict.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use formlane_core::UserId;

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::models::CanonicalIdentity;
use crate::ports::{
    AcceptOutcome, Invite, InviteRepository, NewProviderLink, NewUser, ProviderLink,
    ProviderLinkRepository, User, UserRepository, WorkspaceRole, WorkspaceService,
};

/// Whether this instance accepts sign-ups without an invitation.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationPolicy {
    pub allow_open_signup: bool,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            allow_open_signup: true,
        }
    }
}

/// Result of a linking decision.
#[derive(Debug, Clone)]
pub struct LinkResolution {
    pub user: User,
    pub is_new_user: bool,
}

/// The linking decision engine.
#[derive(Clone)]
pub struct AccountLinker {
    users: Arc<dyn UserRepository>,
    links: Arc<dyn ProviderLinkRepository>,
    invites: Arc<dyn InviteRepository>,
    workspaces: Arc<dyn WorkspaceService>,
    policy: RegistrationPolicy,
}

impl AccountLinker {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        links: Arc<dyn ProviderLinkRepository>,
        invites: Arc<dyn InviteRepository>,
        workspaces: Arc<dyn WorkspaceService>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            users,
            links,
            invites,
            workspaces,
            policy,
        }
    }

    /// Resolve an auth-intent identity: sign in, sign up, or reject.
    pub async fn resolve_auth(
        &self,
        provider: ProviderKind,
        identity: &CanonicalIdentity,
        invite: Option<&Invite>,
        utm_data: Option<HashMap<String, String>>,
    ) -> AuthFlowResult<LinkResolution> {
        // Known identity: this is a sign-in.
        if let Some(link) = self
            .links
            .find_by_provider_user(provider, &identity.external_id)
            .await?
        {
            return self.sign_in_existing(provider, link, identity).await;
        }

        // Unknown identity whose email belongs to an existing user: reject.
        // Accepting here would hand the account to whoever controls that
        // email at a different provider.
        if let Some(email) = &identity.email {
            if let Some(existing) = self.users.find_by_email(email).await? {
                warn!(
                    user_id = %existing.id,
                    provider = %provider,
                    "Rejected sign-in: email already registered under another method"
                );
                return Err(AuthFlowError::EmailAlreadyExists);
            }
        }

        self.sign_up(provider, identity, invite, utm_data).await
    }

    /// Attach an identity to the already-authenticated user. Login state is
    /// untouched.
    pub async fn resolve_integration(
        &self,
        provider: ProviderKind,
        identity: &CanonicalIdentity,
        user_id: UserId,
    ) -> AuthFlowResult<LinkResolution> {
        match self
            .links
            .find_by_provider_user(provider, &identity.external_id)
            .await?
        {
            Some(link) if link.user_id != user_id => {
                return Err(AuthFlowError::ProviderAlreadyLinked { provider });
            }
            Some(link) => {
                self.links
                    .update_tokens(
                        link.id,
                        identity.access_token.as_deref(),
                        identity.refresh_token.as_deref(),
                        &identity.scopes,
                    )
                    .await?;
            }
            None => {
                self.links.create(new_link(provider, identity, user_id)).await?;
                info!(user_id = %user_id, provider = %provider, "Linked provider to user");
            }
        }

        let user = self
            .users
            .load(user_id)
            .await?
            .ok_or_else(|| AuthFlowError::Internal {
                message: "authenticated user no longer exists".to_string(),
            })?;

        Ok(LinkResolution {
            user,
            is_new_user: false,
        })
    }

    /// Remove a provider link from a user, refusing to strand them without
    /// any way to sign in.
    pub async fn unlink(&self, user_id: UserId, provider: ProviderKind) -> AuthFlowResult<()> {
        let user = self
            .users
            .load(user_id)
            .await?
            .ok_or(AuthFlowError::Unauthenticated)?;

        let links = self.links.list_for_user(user_id).await?;
        if !links.iter().any(|l| l.provider == provider) {
            return Err(AuthFlowError::LinkNotFound { provider });
        }
        if !user.has_password && links.len() <= 1 {
            return Err(AuthFlowError::UnlinkForbidden {
                reason: "this is the only sign-in method on the account; set a password first"
                    .to_string(),
            });
        }

        self.links.delete(user_id, provider).await?;
        info!(user_id = %user_id, provider = %provider, "Unlinked provider from user");
        Ok(())
    }

    async fn sign_in_existing(
        &self,
        provider: ProviderKind,
        link: ProviderLink,
        identity: &CanonicalIdentity,
    ) -> AuthFlowResult<LinkResolution> {
        let user = self
            .users
            .load(link.user_id)
            .await?
            .ok_or_else(|| AuthFlowError::Internal {
                message: "provider link points at a missing user".to_string(),
            })?;

        if user.is_blocked {
            return Err(AuthFlowError::UserBlocked);
        }

        // Idempotent re-link: same identity, same user; only freshen tokens.
        self.links
            .update_tokens(
                link.id,
                identity.access_token.as_deref(),
                identity.refresh_token.as_deref(),
                &identity.scopes,
            )
            .await?;

        info!(user_id = %user.id, provider = %provider, "User signed in via provider");
        Ok(LinkResolution {
            user,
            is_new_user: false,
        })
    }

    async fn sign_up(
        &self,
        provider: ProviderKind,
        identity: &CanonicalIdentity,
        invite: Option<&Invite>,
        utm_data: Option<HashMap<String, String>>,
    ) -> AuthFlowResult<LinkResolution> {
        if !self.policy.allow_open_signup && invite.is_none() {
            return Err(AuthFlowError::RegistrationDisabled);
        }

        // Claim the invite before creating anything. The conditional
        // transition makes exactly one of any concurrent pair win; the loser
        // stops here having created no user.
        if let Some(invite) = invite {
            match self.invites.mark_accepted(invite.id).await? {
                AcceptOutcome::Accepted => {}
                AcceptOutcome::AlreadyConsumed => {
                    return Err(AuthFlowError::InviteAlreadyConsumed);
                }
            }
        }

        let user = self
            .users
            .create(NewUser {
                email: identity.email.clone(),
                name: identity.name.clone(),
                avatar_url: identity.avatar_url.clone(),
                signup_provider: provider,
                signup_provider_user_id: identity.external_id.clone(),
                utm_data,
            })
            .await?;

        match invite {
            Some(invite) => {
                self.workspaces
                    .assign_user(invite.workspace_id, user.id, invite.role)
                    .await?;
            }
            None => {
                let workspace = self.workspaces.create_default_workspace().await?;
                self.workspaces
                    .assign_user(workspace.id, user.id, WorkspaceRole::Owner)
                    .await?;
            }
        }

        self.links.create(new_link(provider, identity, user.id)).await?;

        info!(
            user_id = %user.id,
            provider = %provider,
            invited = invite.is_some(),
            "Created user via provider sign-up"
        );
        Ok(LinkResolution {
            user,
            is_new_user: true,
        })
    }
}

fn new_link(
    provider: ProviderKind,
    identity: &CanonicalIdentity,
    user_id: UserId,
) -> NewProviderLink {
    NewProviderLink {
        user_id,
        provider,
        external_id: identity.external_id.clone(),
        email: identity.email.clone(),
        display_name: Some(identity.name.clone()),
        access_token: identity.access_token.clone(),
        refresh_token: identity.refresh_token.clone(),
        scopes: identity.scopes.clone(),
    }
}
