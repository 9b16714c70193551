//! Rate limiting on the authorization endpoints, against a real listener

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use ussp_server::{build_state, create_router_with_rate_limit, RateLimitConfig};

struct TestServer {
    addr: SocketAddr,
    _temp_dir: TempDir,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn new(rate_config: RateLimitConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let state = build_state(&common::test_config(&temp_dir)).await.unwrap();

        let (router, cleanup) = create_router_with_rate_limit(Arc::clone(&state), rate_config)
            .expect("valid rate limit");
        std::thread::spawn(cleanup);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        Self {
            addr,
            _temp_dir: temp_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn test_oauth_routes_are_rate_limited() {
    let server = TestServer::new(RateLimitConfig::new(1, 2)).await;
    let client = reqwest::Client::new();

    let mut limited = false;
    for _ in 0..10 {
        let response = client
            .post(server.url("/oauth/token"))
            .json(&serde_json::json!({ "grant_type": "password" }))
            .send()
            .await
            .unwrap();
        if response.status().as_u16() == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            limited = true;
            break;
        }
    }
    assert!(limited, "expected a 429 within ten rapid requests");
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let server = TestServer::new(RateLimitConfig::new(1, 1)).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = client.get(server.url("/health")).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}

#[test]
fn test_zero_rate_is_rejected() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let state = runtime
        .block_on(build_state(&common::test_config(&temp_dir)))
        .unwrap();
    assert!(create_router_with_rate_limit(state, RateLimitConfig::new(0, 1)).is_err());
}
