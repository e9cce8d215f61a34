//! Shared fixtures: in-memory ports plus a mock provider server.

// Each test binary uses a different slice of this fixture.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use formlane_core::{InviteId, WorkspaceId};
use formlane_api_social::ports::{Invite, InviteStatus, WorkspaceRole};
use formlane_api_social::providers::oauth2_generic::{GenericOAuth2Config, UserInfoFieldMap};
use formlane_api_social::providers::{
    GenericOAuth2Driver, GoogleDriver, ProviderRegistry, TelegramDriver,
};
use formlane_api_social::storage::memory::{
    InMemoryInviteRepository, InMemoryKeyValueStore, InMemoryProviderLinkRepository,
    InMemorySessionIssuer, InMemoryUserRepository, InMemoryWorkspaceService,
};
use formlane_api_social::{AuthConfig, AuthPorts, AuthState, ProviderKind};

pub const BOT_TOKEN: &str = "123456:fixture-bot-token";

pub struct TestHarness {
    pub state: AuthState,
    pub users: Arc<InMemoryUserRepository>,
    pub workspaces: Arc<InMemoryWorkspaceService>,
    pub invites: Arc<InMemoryInviteRepository>,
    pub links: Arc<InMemoryProviderLinkRepository>,
    pub kv: Arc<InMemoryKeyValueStore>,
    pub provider_server: MockServer,
}

/// Build a harness with Google and GitHub pointed at one mock provider
/// server, plus the Telegram widget driver.
pub async fn harness() -> TestHarness {
    harness_with_signup(true).await
}

pub async fn harness_with_signup(allow_open_signup: bool) -> TestHarness {
    let provider_server = MockServer::start().await;
    let base = provider_server.uri();

    let google = GoogleDriver::new("google-client".to_string(), "google-secret".to_string())
        .with_endpoints(
            format!("{base}/google/authorize"),
            format!("{base}/google/token"),
            format!("{base}/google/userinfo"),
        );
    let github = GenericOAuth2Driver::new(GenericOAuth2Config {
        kind: ProviderKind::Github,
        client_id: "github-client".to_string(),
        client_secret: "github-secret".to_string(),
        auth_endpoint: format!("{base}/github/authorize"),
        token_endpoint: format!("{base}/github/token"),
        userinfo_endpoint: format!("{base}/github/user"),
        identity_scopes: vec!["read:user".to_string(), "user:email".to_string()],
        integration_scopes: vec![],
        fields: UserInfoFieldMap {
            id: "id",
            name: "name",
            name_fallback: Some("login"),
            email: "email",
            avatar: "avatar_url",
        },
    });
    let telegram = TelegramDriver::new(BOT_TOKEN.to_string());

    let registry = Arc::new(
        ProviderRegistry::new()
            .register(Arc::new(google))
            .register(Arc::new(github))
            .register(Arc::new(telegram)),
    );

    let users = Arc::new(InMemoryUserRepository::new());
    let workspaces = Arc::new(InMemoryWorkspaceService::new());
    let invites = Arc::new(InMemoryInviteRepository::new());
    let links = Arc::new(InMemoryProviderLinkRepository::new());
    let kv = Arc::new(InMemoryKeyValueStore::new());

    let state = AuthState::new(
        AuthConfig {
            base_url: "https://app.formlane.test".to_string(),
            allow_open_signup,
        },
        registry,
        AuthPorts {
            users: users.clone(),
            workspaces: workspaces.clone(),
            invites: invites.clone(),
            links: links.clone(),
            sessions: Arc::new(InMemorySessionIssuer::new()),
            kv: kv.clone(),
        },
    )
    .expect("auth state");

    TestHarness {
        state,
        users,
        workspaces,
        invites,
        links,
        kv,
        provider_server,
    }
}

/// Mount a successful Google code exchange and userinfo response.
pub async fn mock_google_user(server: &MockServer, sub: &str, email: &str, name: &str) {
    Mock::given(method("POST"))
        .and(path("/google/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.mock_access",
            "refresh_token": "1//mock_refresh",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "openid email profile"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/google/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": sub,
            "email": email,
            "email_verified": true,
            "name": name,
            "picture": "https://lh3.example/photo.jpg"
        })))
        .mount(server)
        .await;
}

/// Mount a successful GitHub code exchange and profile response.
pub async fn mock_github_user(server: &MockServer, id: u64, login: &str, email: &str) {
    Mock::given(method("POST"))
        .and(path("/github/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_mock_access",
            "token_type": "bearer",
            "scope": "read:user,user:email"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/github/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "login": login,
            "name": null,
            "email": email,
            "avatar_url": "https://avatars.example/u/1"
        })))
        .mount(server)
        .await;
}

/// A signed Telegram widget payload for the fixture bot token.
pub fn telegram_payload(id: i64, first_name: &str) -> serde_json::Value {
    let mut payload = json!({
        "id": id,
        "first_name": first_name,
        "auth_date": Utc::now().timestamp(),
    });

    let object = payload.as_object().expect("payload object");
    let mut pairs: Vec<(String, String)> = object
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let check_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let secret_key = Sha256::digest(BOT_TOKEN.as_bytes());
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&secret_key).expect("hmac accepts any key length");
    mac.update(check_string.as_bytes());
    payload["hash"] = json!(hex::encode(mac.finalize().into_bytes()));
    payload
}

/// A pending invite seeded into the invite repository.
pub async fn seed_pending_invite(
    invites: &InMemoryInviteRepository,
    email: &str,
    token: &str,
) -> Invite {
    let invite = Invite {
        id: InviteId::new(),
        email: email.to_string(),
        token: token.to_string(),
        workspace_id: WorkspaceId::new(),
        role: WorkspaceRole::Member,
        status: InviteStatus::Pending,
        expires_at: Utc::now() + Duration::days(7),
    };
    invites.seed(invite.clone()).await;
    invite
}
