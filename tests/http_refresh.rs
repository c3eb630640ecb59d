//! End-to-end refresh behavior against a real HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_client::{ApiClient, ApiConfig, ApiError, CookieStore, CredentialSlot, CredentialStore, MemoryStore};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

// =============================================================================
// TEST SERVER
// =============================================================================

struct ServerState {
    valid_access: Mutex<String>,
    refresh_calls: AtomicUsize,
}

type Shared = Arc<ServerState>;

async fn refresh(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    if body["refreshToken"] != "r1" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    *state.valid_access.lock().unwrap() = "a2".into();
    Json(json!({ "accessToken": "a2", "refreshToken": "r2" })).into_response()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "hunter2" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "accessToken": "a2", "refreshToken": "r1" })).into_response()
}

async fn item(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<u32>) -> Response {
    let expected = format!("Bearer {}", state.valid_access.lock().unwrap());
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "id": id })).into_response()
}

async fn spawn_server() -> (String, Shared) {
    let state = Arc::new(ServerState { valid_access: Mutex::new("a2".into()), refresh_calls: AtomicUsize::new(0) });
    let app = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/login", post(login))
        .route("/api/items/{id}", get(item))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), state)
}

fn client_with(base_url: &str, store: Arc<dyn CredentialStore>) -> ApiClient {
    let config = ApiConfig::new(base_url).unwrap();
    ApiClient::from_config(&config, store).unwrap()
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_expired_requests_refresh_once() {
    let (base_url, server) = spawn_server().await;
    let store = Arc::new(MemoryStore::with_tokens(Some("a1"), Some("r1")));
    let client = client_with(&base_url, store.clone());

    let handles: Vec<_> = (1..=5)
        .map(|id| {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>(&format!("/items/{id}")).await })
        })
        .collect();

    for (idx, handle) in handles.into_iter().enumerate() {
        let body = handle.await.unwrap().unwrap();
        assert_eq!(body["id"], idx + 1);
    }
    assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(CredentialSlot::Access).as_deref(), Some("a2"));
    assert_eq!(store.get(CredentialSlot::Refresh).as_deref(), Some("r2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_refresh_logs_everyone_out() {
    let (base_url, server) = spawn_server().await;
    let store = Arc::new(MemoryStore::with_tokens(Some("a1"), Some("revoked")));
    let client = client_with(&base_url, store.clone());

    let handles: Vec<_> = (1..=3)
        .map(|id| {
            let client = client.clone();
            tokio::spawn(async move { client.get_json::<Value>(&format!("/items/{id}")).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)), "{err:?}");
    }
    assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get(CredentialSlot::Access), None);
    assert_eq!(store.get(CredentialSlot::Refresh), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_populates_cookie_store() {
    let (base_url, _server) = spawn_server().await;
    let store = Arc::new(CookieStore::new(false));
    let client = client_with(&base_url, store.clone());

    client
        .login(&json!({ "email": "ada@example.test", "password": "hunter2" }))
        .await
        .unwrap();
    let body: Value = client.get_json("/items/9").await.unwrap();

    assert_eq!(body["id"], 9);
    assert_eq!(store.cookie_header(), "access_token=a2; refresh_token=r1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_login_is_a_plain_status_error() {
    let (base_url, server) = spawn_server().await;
    let store = Arc::new(MemoryStore::new());
    let client = client_with(&base_url, store.clone());

    let err = client
        .login(&json!({ "email": "ada@example.test", "password": "wrong" }))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Status { status: 401, .. }), "{err:?}");
    assert_eq!(server.refresh_calls.load(Ordering::SeqCst), 0);
    assert!(!client.is_authenticated());
}
