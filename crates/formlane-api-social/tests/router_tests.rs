//! HTTP-level tests over the mounted router.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{Extension, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{harness, mock_google_user, telegram_payload};
use formlane_api_social::auth_router;
use formlane_core::UserId;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_start_endpoint_returns_authorization_url() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/google/start?intent=auth&utm_source=newsletter")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let url = body["authorizationUrl"].as_str().unwrap();
    let token = body["correlationToken"].as_str().unwrap();
    assert!(url.contains(&format!("state={token}")));
}

#[tokio::test]
async fn test_integration_start_without_session_is_401() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/google/start?intent=integration")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthenticated_for_integration");
}

#[tokio::test]
async fn test_unknown_state_callback_is_400_context_expired() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/google/callback?code=abc&state=neverissued")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "context_expired");
}

#[tokio::test]
async fn test_unknown_provider_is_400() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/myspace/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_provider");
}

#[tokio::test]
async fn test_widget_callback_signs_in_new_user() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let request_body = json!({
        "intent": "auth",
        "payload": telegram_payload(31337, "Widget"),
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/telegram/widget")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isNewUser"], true);
    assert_eq!(body["tokenType"], "bearer");
    assert!(body["sessionToken"].as_str().is_some());
    assert!(body["expiresInSeconds"].as_i64().unwrap() > 0);
    assert!(body["user"]["email"].is_null());
}

#[tokio::test]
async fn test_links_listing_requires_auth() {
    let h = harness().await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/links")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_full_redirect_flow_over_http() {
    let h = harness().await;
    mock_google_user(&h.provider_server, "g-http-1", "http@example.com", "Http Person").await;
    let app: Router = Router::new().nest("/auth", auth_router().with_state(h.state));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/google/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let started = body_json(response).await;
    let token = started["correlationToken"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/auth/google/callback?code=mock-code&state={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isNewUser"], true);
    assert_eq!(body["user"]["email"], "http@example.com");
}

#[tokio::test]
async fn test_links_listing_with_session_omits_secrets() {
    let h = harness().await;
    mock_google_user(&h.provider_server, "g-http-2", "linked@example.com", "Linked").await;

    // Sign up through the orchestrator, then list links over HTTP as that
    // user.
    let started = h
        .state
        .orchestrator
        .start_redirect(
            formlane_api_social::ProviderKind::Google,
            formlane_api_social::AuthIntent::Auth,
            formlane_api_social::services::StartOptions::default(),
            None,
        )
        .await
        .unwrap();
    let result = h
        .state
        .orchestrator
        .complete_redirect(
            formlane_api_social::ProviderKind::Google,
            &formlane_api_social::models::CallbackParams {
                code: Some("mock-code".to_string()),
                state: Some(started.correlation_token.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let user_id: UserId = result.user.id;
    let app: Router = Router::new()
        .nest("/auth", auth_router().with_state(h.state))
        .layer(Extension(user_id));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/links")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let links = body["links"].as_array().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0]["provider"], "google");
    // Stored provider tokens never serialize.
    assert!(links[0].get("accessToken").is_none());
    assert!(links[0].get("access_token").is_none());
}
