//! Tests for the HTTP client and its renewal behavior.
//!
//! Lifecycle tests run against a real server on a random port. Renewal edge
//! cases run against a small stub server that counts refresh calls.

mod common;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use common::{TEST_PASSWORD, TestSetup};
use railpass::client::{AuthClient, ClientConfig, ClientError, MAX_REFRESH_ATTEMPTS, SignupForm};
use railpass::db::Database;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> AuthClient {
    let url = Url::parse(&format!("http://{}/", addr)).unwrap();
    AuthClient::new(ClientConfig::new(url)).unwrap()
}

async fn start_real_server() -> SocketAddr {
    let db = Database::open(":memory:").await.unwrap();
    let config = TestSetup::new().config(db);
    let (_handle, addr) = railpass::start_server(config, 0).await.unwrap();
    addr
}

fn alice() -> SignupForm {
    SignupForm {
        firstname: "Alice".to_string(),
        lastname: "Liddell".to_string(),
        username: "alice".to_string(),
        email: "alice@x.com".to_string(),
        password: TEST_PASSWORD.to_string(),
    }
}

#[tokio::test]
async fn test_client_lifecycle_against_server() {
    let addr = start_real_server().await;
    let client = client_for(addr);

    client.signup(&alice()).await.unwrap();
    assert!(!client.is_signed_in().await);

    client.signin("alice", TEST_PASSWORD).await.unwrap();
    let first_token = client.access_token().await.unwrap();

    let me: Value = client.get_json("auth/me").await.unwrap();
    assert_eq!(me["username"], "alice");
    assert_eq!(me["displayName"], "Alice Liddell");

    // The refresh cookie went into the jar at signin
    client.refresh().await.unwrap();
    assert!(client.access_token().await.is_some());

    client.signout().await.unwrap();
    assert!(!client.is_signed_in().await);

    let err = client.refresh().await.unwrap_err();
    assert!(err.requires_signin());
    assert!(!client.is_signed_in().await);
    assert!(!first_token.is_empty());
}

#[tokio::test]
async fn test_client_surfaces_api_errors() {
    let addr = start_real_server().await;
    let client = client_for(addr);

    client.signup(&alice()).await.unwrap();
    let err = client.signup(&alice()).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 409, .. }));

    let err = client.signin("alice", "wrong-password").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!client.is_signed_in().await);
}

#[derive(Clone, Default)]
struct Stub {
    refreshes: Arc<AtomicUsize>,
}

async fn stub_refresh(State(stub): State<Stub>) -> impl IntoResponse {
    let n = stub.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
    // Slow enough for concurrent callers to pile up behind one refresh
    tokio::time::sleep(Duration::from_millis(100)).await;
    Json(json!({ "accessToken": format!("token-{}", n) }))
}

async fn stub_rejecting_refresh(State(stub): State<Stub>) -> impl IntoResponse {
    stub.refreshes.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Refresh token expired" })),
    )
}

/// Always answers as if the access token had expired.
async fn always_expired() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Token expired" })),
    )
}

/// Accepts only tokens handed out by the stub refresh endpoint.
async fn guarded(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"));
    if authorized {
        (StatusCode::OK, Json(json!({ "ok": true })))
    } else {
        (StatusCode::FORBIDDEN, Json(json!({ "error": "Token expired" })))
    }
}

#[tokio::test]
async fn test_renewal_is_bounded() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/auth/refresh", get(stub_refresh))
        .route("/protected", get(always_expired))
        .with_state(stub.clone());
    let client = client_for(spawn_router(router).await);

    let err = client.get_json::<Value>("protected").await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::RetryLimit {
            attempts: MAX_REFRESH_ATTEMPTS
        }
    ));
    assert_eq!(
        stub.refreshes.load(Ordering::SeqCst),
        MAX_REFRESH_ATTEMPTS as usize
    );
}

#[tokio::test]
async fn test_expired_token_is_renewed_and_request_resent() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/auth/refresh", get(stub_refresh))
        .route("/guarded", get(guarded))
        .with_state(stub.clone());
    let client = client_for(spawn_router(router).await);

    let body: Value = client.get_json("guarded").await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.access_token().await.as_deref(), Some("token-1"));
}

#[tokio::test]
async fn test_concurrent_calls_share_one_refresh() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/auth/refresh", get(stub_refresh))
        .route("/guarded", get(guarded))
        .with_state(stub.clone());
    let client = client_for(spawn_router(router).await);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.get_json::<Value>("guarded").await
        }));
    }
    for handle in handles {
        let body = handle.await.unwrap().unwrap();
        assert_eq!(body["ok"], true);
    }

    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_refresh_returns_original_response() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/auth/refresh", get(stub_rejecting_refresh))
        .route("/protected", get(always_expired))
        .with_state(stub.clone());
    let client = client_for(spawn_router(router).await);

    let response = client
        .send(reqwest::Method::GET, "protected", None)
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Token expired");

    // One failed refresh ends the call, no further attempts
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
    assert!(!client.is_signed_in().await);

    let err = client.get_json::<Value>("protected").await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Token expired");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_cancelled_caller_still_completes_refresh() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/auth/refresh", get(stub_refresh))
        .with_state(stub.clone());
    let client = client_for(spawn_router(router).await);

    // Drop the caller while the refresh is still sleeping server-side
    let cancelled = tokio::time::timeout(Duration::from_millis(10), client.refresh()).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.access_token().await.as_deref(), Some("token-1"));
    assert_eq!(stub.refreshes.load(Ordering::SeqCst), 1);
}
