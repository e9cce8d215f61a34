//! Workspace invitation resolution.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{AuthFlowError, AuthFlowResult};
use crate::ports::{Invite, InviteRepository, InviteStatus};

/// Validates invitation tokens and enforces invited-email restrictions.
///
/// Resolution never consumes the invite; consumption happens atomically in
/// the account linker once a user is actually being created, so a failed
/// flow does not burn the invitation.
#[derive(Clone)]
pub struct InviteResolver {
    invites: Arc<dyn InviteRepository>,
}

impl InviteResolver {
    #[must_use]
    pub fn new(invites: Arc<dyn InviteRepository>) -> Self {
        Self { invites }
    }

    /// Look up an invitation and check it is still usable.
    pub async fn resolve(&self, token: &str) -> AuthFlowResult<Invite> {
        let invite = self
            .invites
            .find_by_token(token)
            .await?
            .ok_or(AuthFlowError::InvalidInvite)?;

        match invite.status {
            InviteStatus::Accepted => return Err(AuthFlowError::InviteAlreadyConsumed),
            InviteStatus::Expired => return Err(AuthFlowError::ExpiredInvite),
            InviteStatus::Pending => {}
        }
        if invite.expires_at <= Utc::now() {
            return Err(AuthFlowError::ExpiredInvite);
        }

        Ok(invite)
    }

    /// Enforce that the provider identity matches the invited email.
    ///
    /// This is the actual security control; any provider-side restriction is
    /// only a pre-scoping hint. An invite that names an email can never be
    /// satisfied by an identity that carries none.
    pub fn enforce_email_match(
        actual: Option<&str>,
        invited: Option<&str>,
    ) -> AuthFlowResult<()> {
        let Some(invited) = invited else {
            return Ok(());
        };
        match actual {
            Some(actual) if actual.eq_ignore_ascii_case(invited) => Ok(()),
            _ => Err(AuthFlowError::EmailMismatch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::WorkspaceRole;
    use crate::storage::memory::InMemoryInviteRepository;
    use chrono::Duration;
    use formlane_core::{InviteId, WorkspaceId};

    fn invite(status: InviteStatus, expires_in_hours: i64) -> Invite {
        Invite {
            id: InviteId::new(),
            email: "invitee@example.com".to_string(),
            token: "invite-token".to_string(),
            workspace_id: WorkspaceId::new(),
            role: WorkspaceRole::Member,
            status,
            expires_at: Utc::now() + Duration::hours(expires_in_hours),
        }
    }

    async fn resolver_with(invite: Invite) -> InviteResolver {
        let repo = InMemoryInviteRepository::new();
        repo.seed(invite).await;
        InviteResolver::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn test_pending_invite_resolves() {
        let resolver = resolver_with(invite(InviteStatus::Pending, 24)).await;
        let resolved = resolver.resolve("invite-token").await.unwrap();
        assert_eq!(resolved.email, "invitee@example.com");
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let resolver = resolver_with(invite(InviteStatus::Pending, 24)).await;
        let result = resolver.resolve("no-such-token").await;
        assert!(matches!(result, Err(AuthFlowError::InvalidInvite)));
    }

    #[tokio::test]
    async fn test_past_expiry_is_expired() {
        let resolver = resolver_with(invite(InviteStatus::Pending, -1)).await;
        let result = resolver.resolve("invite-token").await;
        assert!(matches!(result, Err(AuthFlowError::ExpiredInvite)));
    }

    #[tokio::test]
    async fn test_accepted_invite_is_consumed() {
        let resolver = resolver_with(invite(InviteStatus::Accepted, 24)).await;
        let result = resolver.resolve("invite-token").await;
        assert!(matches!(result, Err(AuthFlowError::InviteAlreadyConsumed)));
    }

    #[test]
    fn test_email_match_is_case_insensitive() {
        assert!(InviteResolver::enforce_email_match(
            Some("Invitee@Example.COM"),
            Some("invitee@example.com")
        )
        .is_ok());
    }

    #[test]
    fn test_email_mismatch_fails() {
        let result =
            InviteResolver::enforce_email_match(Some("other@example.com"), Some("invitee@example.com"));
        assert!(matches!(result, Err(AuthFlowError::EmailMismatch)));
    }

    #[test]
    fn test_emailless_identity_cannot_satisfy_invite() {
        let result = InviteResolver::enforce_email_match(None, Some("invitee@example.com"));
        assert!(matches!(result, Err(AuthFlowError::EmailMismatch)));
    }

    #[test]
    fn test_no_invite_means_no_restriction() {
        assert!(InviteResolver::enforce_email_match(Some("anyone@example.com"), None).is_ok());
        assert!(InviteResolver::enforce_email_match(None, None).is_ok());
    }
}
