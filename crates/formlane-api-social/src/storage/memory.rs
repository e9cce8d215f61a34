//! In-memory port adapters.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use formlane_core::{InviteId, LinkId, UserId, WorkspaceId};

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::ports::{
    AcceptOutcome, Invite, InviteRepository, InviteStatus, IssuedToken, KeyValueStore,
    NewProviderLink, NewUser, ProviderLink, ProviderLinkRepository, SessionTokenIssuer, User,
    UserRepository, Workspace, WorkspaceRole, WorkspaceService,
};

/// TTL'd key/value store held in process memory.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> AuthFlowResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> AuthFlowResult<Option<String>> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> AuthFlowResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// User store backed by a map.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built user (test setup).
    pub async fn seed(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn set_blocked(&self, id: UserId, blocked: bool) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.is_blocked = blocked;
        }
    }

    pub async fn set_password(&self, id: UserId, has_password: bool) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.has_password = has_password;
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> AuthFlowResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.as_deref() == Some(email.as_str()))
            .cloned())
    }

    async fn create(&self, fields: NewUser) -> AuthFlowResult<User> {
        let user = User {
            id: UserId::new(),
            email: fields.email.map(|e| e.to_lowercase()),
            name: fields.name,
            avatar_url: fields.avatar_url,
            signup_provider: Some(fields.signup_provider),
            signup_provider_user_id: Some(fields.signup_provider_user_id),
            has_password: false,
            is_blocked: false,
        };
        self.users.write().await.insert(user.id, user.clone());
        Ok(user)
    }

    async fn load(&self, id: UserId) -> AuthFlowResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

/// Workspace store recording memberships.
#[derive(Default)]
pub struct InMemoryWorkspaceService {
    workspaces: RwLock<HashMap<WorkspaceId, Workspace>>,
    memberships: RwLock<Vec<(WorkspaceId, UserId, WorkspaceRole)>>,
}

impl InMemoryWorkspaceService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Memberships for one user, in assignment order (test assertions).
    pub async fn memberships_for(&self, user_id: UserId) -> Vec<(WorkspaceId, WorkspaceRole)> {
        self.memberships
            .read()
            .await
            .iter()
            .filter(|(_, uid, _)| *uid == user_id)
            .map(|(wid, _, role)| (*wid, *role))
            .collect()
    }
}

#[async_trait]
impl WorkspaceService for InMemoryWorkspaceService {
    async fn create_default_workspace(&self) -> AuthFlowResult<Workspace> {
        let workspace = Workspace {
            id: WorkspaceId::new(),
            name: "My workspace".to_string(),
        };
        self.workspaces
            .write()
            .await
            .insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn assign_user(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: WorkspaceRole,
    ) -> AuthFlowResult<()> {
        self.memberships
            .write()
            .await
            .push((workspace_id, user_id, role));
        Ok(())
    }
}

/// Invite store. A single mutex makes the Pending -> Accepted transition
/// atomic, mirroring the conditional UPDATE the Postgres adapter uses.
#[derive(Default)]
pub struct InMemoryInviteRepository {
    invites: Mutex<HashMap<InviteId, Invite>>,
}

impl InMemoryInviteRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built invite (test setup).
    pub async fn seed(&self, invite: Invite) {
        self.invites.lock().await.insert(invite.id, invite);
    }

    pub async fn status_of(&self, id: InviteId) -> Option<InviteStatus> {
        self.invites.lock().await.get(&id).map(|i| i.status)
    }
}

#[async_trait]
impl InviteRepository for InMemoryInviteRepository {
    async fn find_by_token(&self, token: &str) -> AuthFlowResult<Option<Invite>> {
        Ok(self
            .invites
            .lock()
            .await
            .values()
            .find(|i| i.token == token)
            .cloned())
    }

    async fn mark_accepted(&self, id: InviteId) -> AuthFlowResult<AcceptOutcome> {
        let mut invites = self.invites.lock().await;
        let invite = invites
            .get_mut(&id)
            .ok_or(AuthFlowError::InvalidInvite)?;
        if invite.status != InviteStatus::Pending {
            return Ok(AcceptOutcome::AlreadyConsumed);
        }
        invite.status = InviteStatus::Accepted;
        Ok(AcceptOutcome::Accepted)
    }
}

/// Provider-link store enforcing the `(provider, external_id)` uniqueness
/// invariant.
#[derive(Default)]
pub struct InMemoryProviderLinkRepository {
    links: RwLock<HashMap<LinkId, ProviderLink>>,
}

impl InMemoryProviderLinkRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.links.read().await.len()
    }
}

#[async_trait]
impl ProviderLinkRepository for InMemoryProviderLinkRepository {
    async fn find_by_provider_user(
        &self,
        provider: ProviderKind,
        external_id: &str,
    ) -> AuthFlowResult<Option<ProviderLink>> {
        Ok(self
            .links
            .read()
            .await
            .values()
            .find(|l| l.provider == provider && l.external_id == external_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> AuthFlowResult<Vec<ProviderLink>> {
        let mut links: Vec<ProviderLink> = self
            .links
            .read()
            .await
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.created_at);
        Ok(links)
    }

    async fn create(&self, fields: NewProviderLink) -> AuthFlowResult<ProviderLink> {
        let mut links = self.links.write().await;
        if let Some(existing) = links
            .values()
            .find(|l| l.provider == fields.provider && l.external_id == fields.external_id)
        {
            if existing.user_id != fields.user_id {
                return Err(AuthFlowError::ProviderAlreadyLinked {
                    provider: fields.provider,
                });
            }
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let link = ProviderLink {
            id: LinkId::new(),
            user_id: fields.user_id,
            provider: fields.provider,
            external_id: fields.external_id,
            email: fields.email,
            display_name: fields.display_name,
            access_token: fields.access_token,
            refresh_token: fields.refresh_token,
            scopes: fields.scopes,
            created_at: now,
            updated_at: now,
        };
        links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn update_tokens(
        &self,
        id: LinkId,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        scopes: &[String],
    ) -> AuthFlowResult<()> {
        let mut links = self.links.write().await;
        let link = links.get_mut(&id).ok_or_else(|| AuthFlowError::Internal {
            message: "provider link vanished during update".to_string(),
        })?;
        if let Some(token) = access_token {
            link.access_token = Some(token.to_string());
        }
        if let Some(token) = refresh_token {
            link.refresh_token = Some(token.to_string());
        }
        if !scopes.is_empty() {
            link.scopes = scopes.to_vec();
        }
        link.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, user_id: UserId, provider: ProviderKind) -> AuthFlowResult<bool> {
        let mut links = self.links.write().await;
        let ids: Vec<LinkId> = links
            .values()
            .filter(|l| l.user_id == user_id && l.provider == provider)
            .map(|l| l.id)
            .collect();
        for id in &ids {
            links.remove(id);
        }
        Ok(!ids.is_empty())
    }
}

/// Session issuer handing out opaque random tokens.
pub struct InMemorySessionIssuer {
    lifetime: ChronoDuration,
}

impl Default for InMemorySessionIssuer {
    fn default() -> Self {
        Self {
            lifetime: ChronoDuration::hours(24),
        }
    }
}

impl InMemorySessionIssuer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionTokenIssuer for InMemorySessionIssuer {
    async fn issue(&self, _user_id: UserId) -> AuthFlowResult<IssuedToken> {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Ok(IssuedToken {
            token: hex::encode(bytes),
            expires_at: Utc::now() + self.lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kv_ttl_expiry() {
        let kv = InMemoryKeyValueStore::new();
        kv.put("k", "v".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_uniqueness_across_users() {
        let repo = InMemoryProviderLinkRepository::new();
        let fields = NewProviderLink {
            user_id: UserId::new(),
            provider: ProviderKind::Google,
            external_id: "ext".to_string(),
            email: None,
            display_name: None,
            access_token: None,
            refresh_token: None,
            scopes: vec![],
        };
        repo.create(fields.clone()).await.unwrap();

        let mut stolen = fields;
        stolen.user_id = UserId::new();
        let result = repo.create(stolen).await;
        assert!(matches!(
            result,
            Err(AuthFlowError::ProviderAlreadyLinked { .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_accepted_once() {
        let repo = InMemoryInviteRepository::new();
        let invite = Invite {
            id: InviteId::new(),
            email: "a@example.com".to_string(),
            token: "t".to_string(),
            workspace_id: WorkspaceId::new(),
            role: WorkspaceRole::Member,
            status: InviteStatus::Pending,
            expires_at: Utc::now() + ChronoDuration::days(1),
        };
        let id = invite.id;
        repo.invites.lock().await.insert(id, invite);

        assert_eq!(
            repo.mark_accepted(id).await.unwrap(),
            AcceptOutcome::Accepted
        );
        assert_eq!(
            repo.mark_accepted(id).await.unwrap(),
            AcceptOutcome::AlreadyConsumed
        );
    }

    #[tokio::test]
    async fn test_session_tokens_are_unique_with_future_expiry() {
        let issuer = InMemorySessionIssuer::new();
        let a = issuer.issue(UserId::new()).await.unwrap();
        let b = issuer.issue(UserId::new()).await.unwrap();
        assert_ne!(a.token, b.token);
        assert!(a.expires_at > Utc::now());
    }
}
