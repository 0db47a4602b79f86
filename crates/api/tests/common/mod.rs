//! Shared harness for API integration tests.
//!
//! The app runs over the in-memory store with an in-app sender on the real
//! feed, a recording email sender and a recording webhook transport, so no
//! database, SMTP server or network is needed.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use courier_api::auth::jwt::{generate_access_token, JwtConfig};
use courier_api::config::ServerConfig;
use courier_api::router::build_app_router;
use courier_api::state::AppState;
use courier_api::ws::WsManager;
use courier_core::channels::Channel;
use courier_core::roles::{ROLE_ADMIN, ROLE_SERVICE, ROLE_USER};
use courier_events::delivery::{ChannelSender, ChannelSenders, InAppSender, OutboundMessage, SendError};
use courier_events::store::{MemoryStore, Stores};
use courier_events::webhook::{DeliveryError, WebhookRequest, WebhookResponse, WebhookTransport};
use courier_events::{Engine, EngineConfig, NotificationFeed};
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        embedded_scheduler: false,
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Email sender that records messages instead of talking SMTP.
#[derive(Default)]
pub struct RecordingEmail {
    pub messages: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl ChannelSender for RecordingEmail {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Webhook transport answering every request with `status`.
pub struct RecordingTransport {
    pub status: AtomicU16,
    pub requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingTransport {
    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            status: AtomicU16::new(200),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookResponse, DeliveryError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(WebhookResponse {
            status: self.status.load(Ordering::SeqCst),
            body: "ok".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub engine: Engine,
    pub email: Arc<RecordingEmail>,
    pub transport: Arc<RecordingTransport>,
}

/// Build the full router (same middleware stack as production).
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let feed = NotificationFeed::default();
    let email = Arc::new(RecordingEmail::default());
    let transport = Arc::new(RecordingTransport::default());

    let senders = ChannelSenders::new()
        .with(Arc::new(InAppSender::new(feed.clone())))
        .with(email.clone());
    let engine = Engine::new(
        Stores::memory(store.clone()),
        feed,
        senders,
        transport.clone(),
        EngineConfig::default(),
        CancellationToken::new(),
    )
    .unwrap();

    let state = AppState {
        engine: engine.clone(),
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
    };
    let router = build_app_router(state, &config).unwrap();

    TestApp {
        router,
        store,
        engine,
        email,
        transport,
    }
}

pub fn token(user_id: i64, role: &str) -> String {
    let config = test_config();
    generate_access_token(user_id, role, &config.jwt).unwrap()
}

pub fn user_token(user_id: i64) -> String {
    token(user_id, ROLE_USER)
}

pub fn service_token() -> String {
    token(900, ROLE_SERVICE)
}

pub fn admin_token() -> String {
    token(1, ROLE_ADMIN)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn post_json_auth(
    app: &Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json_auth(
    app: &Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete_auth(app: &Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
