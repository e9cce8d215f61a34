//! Postgres port adapters.
//!
//! Durable storage for users, workspaces, invites, and provider links. The
//! invite Pending -> Accepted transition is a conditional UPDATE so two
//! concurrent acceptances resolve to exactly one winner at the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use formlane_core::{InviteId, LinkId, UserId, WorkspaceId};

use crate::error::{AuthFlowError, AuthFlowResult, ProviderKind};
use crate::ports::{
    AcceptOutcome, Invite, InviteRepository, InviteStatus, NewProviderLink, NewUser, ProviderLink,
    ProviderLinkRepository, User, UserRepository, Workspace, WorkspaceRole, WorkspaceService,
};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: Option<String>,
    name: String,
    avatar_url: Option<String>,
    signup_provider: Option<String>,
    signup_provider_user_id: Option<String>,
    has_password: bool,
    is_blocked: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            name: row.name,
            avatar_url: row.avatar_url,
            signup_provider: row.signup_provider.and_then(|p| p.parse().ok()),
            signup_provider_user_id: row.signup_provider_user_id,
            has_password: row.has_password,
            is_blocked: row.is_blocked,
        }
    }
}

const USER_COLUMNS: &str = r"
    id, email, name, avatar_url, signup_provider, signup_provider_user_id,
    password_hash IS NOT NULL AS has_password, is_blocked
";

/// User storage on Postgres.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> AuthFlowResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn create(&self, fields: NewUser) -> AuthFlowResult<User> {
        let utm = fields
            .utm_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let row: UserRow = sqlx::query_as(&format!(
            r"
            INSERT INTO users (email, name, avatar_url, signup_provider, signup_provider_user_id, utm_data)
            VALUES (LOWER($1), $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&fields.email)
        .bind(&fields.name)
        .bind(&fields.avatar_url)
        .bind(fields.signup_provider.to_string())
        .bind(&fields.signup_provider_user_id)
        .bind(utm)
        .fetch_one(&self.pool)
        .await?;
        Ok(User::from(row))
    }

    async fn load(&self, id: UserId) -> AuthFlowResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }
}

/// Workspace storage on Postgres.
#[derive(Clone)]
pub struct PgWorkspaceService {
    pool: PgPool,
}

impl PgWorkspaceService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkspaceService for PgWorkspaceService {
    async fn create_default_workspace(&self) -> AuthFlowResult<Workspace> {
        let (id, name): (Uuid, String) = sqlx::query_as(
            r"
            INSERT INTO workspaces (name)
            VALUES ('My workspace')
            RETURNING id, name
            ",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(Workspace {
            id: WorkspaceId::from_uuid(id),
            name,
        })
    }

    async fn assign_user(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
        role: WorkspaceRole,
    ) -> AuthFlowResult<()> {
        sqlx::query(
            r"
            INSERT INTO workspace_members (workspace_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (workspace_id, user_id) DO NOTHING
            ",
        )
        .bind(workspace_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InviteRow {
    id: Uuid,
    email: String,
    token: String,
    workspace_id: Uuid,
    role: String,
    status: String,
    expires_at: DateTime<Utc>,
}

impl TryFrom<InviteRow> for Invite {
    type Error = AuthFlowError;

    fn try_from(row: InviteRow) -> Result<Self, Self::Error> {
        Ok(Invite {
            id: InviteId::from_uuid(row.id),
            email: row.email,
            token: row.token,
            workspace_id: WorkspaceId::from_uuid(row.workspace_id),
            role: row.role.parse()?,
            status: row.status.parse()?,
            expires_at: row.expires_at,
        })
    }
}

/// Invite storage on Postgres.
#[derive(Clone)]
pub struct PgInviteRepository {
    pool: PgPool,
}

impl PgInviteRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InviteRepository for PgInviteRepository {
    async fn find_by_token(&self, token: &str) -> AuthFlowResult<Option<Invite>> {
        let row: Option<InviteRow> = sqlx::query_as(
            r"
            SELECT id, email, token, workspace_id, role, status, expires_at
            FROM workspace_invites
            WHERE token = $1
            ",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Invite::try_from).transpose()
    }

    async fn mark_accepted(&self, id: InviteId) -> AuthFlowResult<AcceptOutcome> {
        // Conditional transition: only one concurrent caller sees a row come
        // back.
        let updated: Option<(Uuid,)> = sqlx::query_as(
            r"
            UPDATE workspace_invites
            SET status = 'accepted', accepted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match updated {
            Some(_) => AcceptOutcome::Accepted,
            None => AcceptOutcome::AlreadyConsumed,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    external_id: String,
    email: Option<String>,
    display_name: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    scopes: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for ProviderLink {
    type Error = AuthFlowError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        Ok(ProviderLink {
            id: LinkId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            provider: row.provider.parse()?,
            external_id: row.external_id,
            email: row.email,
            display_name: row.display_name,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            scopes: row.scopes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const LINK_COLUMNS: &str = r"
    id, user_id, provider, external_id, email, display_name,
    access_token, refresh_token, scopes, created_at, updated_at
";

/// Provider-link storage on Postgres.
///
/// Uniqueness of `(provider, external_id)` is a database constraint; the
/// conditional insert below turns a concurrent duplicate into a conflict
/// error instead of an overwrite.
#[derive(Clone)]
pub struct PgProviderLinkRepository {
    pool: PgPool,
}

impl PgProviderLinkRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderLinkRepository for PgProviderLinkRepository {
    async fn find_by_provider_user(
        &self,
        provider: ProviderKind,
        external_id: &str,
    ) -> AuthFlowResult<Option<ProviderLink>> {
        let row: Option<LinkRow> = sqlx::query_as(&format!(
            "SELECT {LINK_COLUMNS} FROM provider_links WHERE provider = $1 AND external_id = $2"
        ))
        .bind(provider.to_string())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProviderLink::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> AuthFlowResult<Vec<ProviderLink>> {
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            r"
            SELECT {LINK_COLUMNS} FROM provider_links
            WHERE user_id = $1
            ORDER BY created_at ASC
            "
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProviderLink::try_from).collect()
    }

    async fn create(&self, fields: NewProviderLink) -> AuthFlowResult<ProviderLink> {
        let inserted: Option<LinkRow> = sqlx::query_as(&format!(
            r"
            INSERT INTO provider_links (
                user_id, provider, external_id, email, display_name,
                access_token, refresh_token, scopes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (provider, external_id) DO NOTHING
            RETURNING {LINK_COLUMNS}
            "
        ))
        .bind(fields.user_id.as_uuid())
        .bind(fields.provider.to_string())
        .bind(&fields.external_id)
        .bind(&fields.email)
        .bind(&fields.display_name)
        .bind(&fields.access_token)
        .bind(&fields.refresh_token)
        .bind(&fields.scopes)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return ProviderLink::try_from(row);
        }

        // Lost the race or the pair already exists: idempotent for the same
        // user, a conflict for anyone else.
        match self
            .find_by_provider_user(fields.provider, &fields.external_id)
            .await?
        {
            Some(existing) if existing.user_id == fields.user_id => Ok(existing),
            _ => Err(AuthFlowError::ProviderAlreadyLinked {
                provider: fields.provider,
            }),
        }
    }

    async fn update_tokens(
        &self,
        id: LinkId,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        scopes: &[String],
    ) -> AuthFlowResult<()> {
        sqlx::query(
            r"
            UPDATE provider_links
            SET
                access_token = COALESCE($2, access_token),
                refresh_token = COALESCE($3, refresh_token),
                scopes = CASE WHEN cardinality($4::text[]) > 0 THEN $4 ELSE scopes END,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(access_token)
        .bind(refresh_token)
        .bind(scopes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: UserId, provider: ProviderKind) -> AuthFlowResult<bool> {
        let result = sqlx::query(
            "DELETE FROM provider_links WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id.as_uuid())
        .bind(provider.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
