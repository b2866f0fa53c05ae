// Fake account API served by axum on an ephemeral port.
//
// Accepts exactly one access token at a time; the refresh endpoint rotates it
// the way the real backend does.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mutopia::config::ApiConfig;
use mutopia::credentials::{Cipher, TokenPair, TokenStore};
use mutopia::storage::MemoryStore;
use mutopia::HttpClient;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct ApiState {
    /// Access token currently accepted
    pub valid_access: Mutex<String>,
    /// Refresh token currently accepted
    pub valid_refresh: Mutex<String>,
    /// Pair handed out by the next successful refresh
    pub next_pair: Mutex<TokenPair>,
    /// Status the refresh endpoint answers with (200 = rotate)
    pub refresh_status: AtomicU16,
    pub refresh_delay_ms: AtomicU64,
    /// Refresh answers 200 headers, then never finishes the body
    pub refresh_stall: AtomicBool,
    pub refresh_calls: AtomicUsize,
    pub slow_hits: AtomicUsize,
    /// Authorization header of every request to /api/auth/me
    pub seen_auth: Mutex<Vec<Option<String>>>,
}

impl ApiState {
    pub fn new(valid_access: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(valid_access.to_string()),
            valid_refresh: Mutex::new("R1".to_string()),
            next_pair: Mutex::new(TokenPair {
                access: "A2".to_string(),
                refresh: "R2".to_string(),
            }),
            refresh_status: AtomicU16::new(200),
            refresh_delay_ms: AtomicU64::new(0),
            refresh_stall: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
            slow_hits: AtomicUsize::new(0),
            seen_auth: Mutex::new(Vec::new()),
        })
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.seen_auth.lock().unwrap().clone()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn me(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> impl IntoResponse {
    let auth = bearer(&headers);
    state.seen_auth.lock().unwrap().push(auth.clone());

    let expected = format!("Bearer {}", state.valid_access.lock().unwrap());
    if auth.as_deref() == Some(expected.as_str()) {
        (
            StatusCode::OK,
            Json(json!({"email": "owner@mutopia.pet", "role": "customer"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
    }
}

async fn refresh(State(state): State<Arc<ApiState>>, Json(body): Json<Value>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.refresh_stall.load(Ordering::SeqCst) {
        let stalled = futures::stream::pending::<Result<Bytes, std::io::Error>>();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            Body::from_stream(stalled),
        )
            .into_response();
    }

    let status = state.refresh_status.load(Ordering::SeqCst);
    if status != 200 {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({"detail": "Token is invalid or expired"}))).into_response();
    }

    let presented = body.get("refresh").and_then(Value::as_str).unwrap_or("");
    let mut valid_refresh = state.valid_refresh.lock().unwrap();
    if presented != valid_refresh.as_str() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response();
    }

    let pair = state.next_pair.lock().unwrap().clone();
    *state.valid_access.lock().unwrap() = pair.access.clone();
    *valid_refresh = pair.refresh.clone();

    Json(json!({"access": pair.access, "refresh": pair.refresh})).into_response()
}

async fn login(State(state): State<Arc<ApiState>>, Json(body): Json<Value>) -> impl IntoResponse {
    if body.get("password").and_then(Value::as_str) != Some("hunter2") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid email or password"})),
        );
    }

    *state.valid_access.lock().unwrap() = "A1".to_string();
    *state.valid_refresh.lock().unwrap() = "R1".to_string();
    (StatusCode::OK, Json(json!({"access": "A1", "refresh": "R1"})))
}

async fn always_unauthorized() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Not allowed"})),
    )
}

async fn upload(headers: HeaderMap) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    Json(json!({"content_type": content_type}))
}

async fn slow(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.slow_hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    StatusCode::OK
}

async fn unavailable() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "Booking service is down"})),
    )
}

async fn ping() -> impl IntoResponse {
    "pong"
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/always-401", get(always_unauthorized))
        .route("/api/pets/photo", post(upload))
        .route("/api/slow", get(slow))
        .route("/api/bookings/bookings", get(unavailable))
        .route("/api/ping", get(ping))
        .with_state(state)
}

/// Serves the fake API and returns its base URL.
pub async fn spawn_api(state: Arc<ApiState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Client against `base_url` holding the given tokens.
pub fn create_client(base_url: &str, access: Option<&str>, refresh: Option<&str>) -> HttpClient {
    create_client_with(ApiConfig::with_base_url(base_url), access, refresh)
}

/// Same as [`create_client`] with explicit transport settings.
pub fn create_client_with(
    config: ApiConfig,
    access: Option<&str>,
    refresh: Option<&str>,
) -> HttpClient {
    let tokens = TokenStore::new(
        Arc::new(MemoryStore::new()),
        Cipher::for_origin("http://localhost"),
    );
    tokens.set_access_token(access).unwrap();
    tokens.set_refresh_token(refresh).unwrap();

    HttpClient::new(config, tokens).unwrap()
}

/// Counts session-expiry notifications.
pub fn count_expiries(client: &HttpClient) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    client.on_session_expired(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}
