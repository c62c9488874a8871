//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, Response},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use edge_gateway::auth::fresh_claims;
use edge_gateway::config::GatewayConfig;
use edge_gateway::http::{AppState, HttpServer};
use edge_gateway::store::{MemoryStore, Store, StoreError, StoreResult, WindowHit, WindowOutcome};

pub const SECRET: &str = "integration-secret-0123456789abcdef";
pub const CLIENT_IP: &str = "203.0.113.7";

/// Defaults with a secret and no external services.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.permission.service_url = String::new();
    config.health.auth_service_url = String::new();
    config
}

/// Upstream that echoes the identity and session headers it received.
pub fn echo_upstream() -> Router {
    Router::new().fallback(|headers: HeaderMap| async move {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "upstream": true,
            "user_id": get("x-user-id"),
            "email": get("x-user-email"),
            "role": get("x-user-role"),
            "tenant_id": get("x-tenant-id"),
            "session_id": get("x-session-id"),
            "session_user_id": get("x-session-user-id"),
        }))
    })
}

pub struct TestGateway {
    pub state: AppState,
    pub router: Router,
}

impl TestGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: GatewayConfig, store: Arc<dyn Store>) -> Self {
        let state = AppState::new(config, store).unwrap();
        let router = HttpServer::build_router(state.clone(), echo_upstream());
        Self { state, router }
    }

    /// A valid token for `user_id` with the given role.
    pub fn token(&self, user_id: &str, role: Option<&str>) -> String {
        let claims = fresh_claims(user_id, &format!("{}@example.com", user_id), role, Some("tenant-1"), 3600);
        self.state.validator.sign(&claims).unwrap()
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

/// Request builder with the connection info axum would attach.
pub fn request(method: Method, path: &str, token: Option<&str>) -> axum::http::request::Builder {
    let addr: SocketAddr = format!("{}:40000", CLIENT_IP).parse().unwrap();
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .extension(ConnectInfo(addr));
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder
}

pub fn get(path: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, path, token).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a programmable mock backend on an ephemeral port.
///
/// The handler receives the request body and returns (status, body).
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let body = read_request_body(&mut socket).await;
                        let (status, body) = f(body).await;
                        let status_text = match status {
                            200 => "200 OK",
                            403 => "403 Forbidden",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                return String::from_utf8_lossy(&buf[end + 4..end + 4 + content_length]).into_owned();
            }
        }
    }
    String::new()
}

/// A store whose every operation fails.
pub struct FailingStore;

impl FailingStore {
    fn fail<T>() -> StoreResult<T> {
        Err(StoreError::Unavailable("injected failure".into()))
    }
}

#[async_trait]
impl Store for FailingStore {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn ping(&self) -> StoreResult<()> {
        Self::fail()
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Self::fail()
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Self::fail()
    }

    async fn del(&self, _key: &str) -> StoreResult<()> {
        Self::fail()
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        Self::fail()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<()> {
        Self::fail()
    }

    async fn set_add(&self, _key: &str, _member: &str, _ttl: Duration) -> StoreResult<()> {
        Self::fail()
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> StoreResult<()> {
        Self::fail()
    }

    async fn set_members(&self, _key: &str) -> StoreResult<Vec<String>> {
        Self::fail()
    }

    async fn set_len(&self, _key: &str) -> StoreResult<usize> {
        Self::fail()
    }

    async fn window_hit(&self, _hit: &WindowHit<'_>) -> StoreResult<WindowOutcome> {
        Self::fail()
    }
}
