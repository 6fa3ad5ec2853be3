//! Shared utilities for integration and load testing.
//!
//! The mock upstream picks its behavior from a `"mock"` field in the JSON
//! request body, so one upstream can serve every scenario in a test:
//!
//! - `"echo"` (default): answers 200 with the exact request bytes
//! - `"stream"`: answers 200 with `chunks` SSE events, `interval_ms` apart
//! - `"slow"`: waits `delay_ms` before answering like `"echo"`
//! - `"stall"`: sends the head and one event, then never finishes
//! - `"error"`: answers 500 with a JSON error body

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures_util::stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

use llm_relay::config::ProxyConfig;
use llm_relay::lifecycle::{bind, Shutdown};
use llm_relay::telemetry::{Telemetry, TelemetryRecord};

pub const UPSTREAM_PATH: &str = "/v1/chat/completions";

/// One request as the mock upstream saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Default)]
pub struct MockUpstream {
    pub addr: Option<SocketAddr>,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockUpstream {
    pub fn url(&self) -> String {
        let addr = self.addr.expect("mock upstream not started");
        format!("http://{addr}{UPSTREAM_PATH}")
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().clone()
    }
}

/// Start the mock upstream on an ephemeral loopback port.
pub async fn start_mock_upstream() -> MockUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mock = MockUpstream {
        addr: Some(listener.local_addr().unwrap()),
        ..MockUpstream::default()
    };
    let app = Router::new()
        .route(UPSTREAM_PATH, post(mock_handler))
        .with_state(mock.captured.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    mock
}

async fn mock_handler(
    State(captured): State<Arc<Mutex<Vec<Captured>>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    captured.lock().push(Captured {
        headers,
        body: body.clone(),
    });

    let script: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let mode = script["mock"].as_str().unwrap_or("echo");
    let number = |key: &str, default: u64| script[key].as_u64().unwrap_or(default);

    match mode {
        "slow" => {
            tokio::time::sleep(Duration::from_millis(number("delay_ms", 1_000))).await;
            echo(body)
        }
        "stream" => {
            let chunks = number("chunks", 3);
            let interval = Duration::from_millis(number("interval_ms", 20));
            let events = stream::unfold(0u64, move |i| async move {
                if i >= chunks {
                    return None;
                }
                tokio::time::sleep(interval).await;
                let event = format!("data: {{\"chunk\":{i}}}\n\n");
                Some((Ok::<_, std::io::Error>(Bytes::from(event)), i + 1))
            });
            sse(Body::from_stream(events))
        }
        "stall" => {
            let events = stream::unfold(false, |sent| async move {
                if sent {
                    std::future::pending::<()>().await;
                }
                Some((Ok::<_, std::io::Error>(Bytes::from_static(b"data: {\"chunk\":0}\n\n")), true))
            });
            sse(Body::from_stream(events))
        }
        "error" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "application/json")],
            r#"{"error":{"message":"upstream exploded"}}"#,
        )
            .into_response(),
        _ => echo(body),
    }
}

fn echo(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [("content-type", "application/json"), ("x-upstream-echo", "1")],
        body,
    )
        .into_response()
}

fn sse(body: Body) -> Response {
    (StatusCode::OK, [("content-type", "text/event-stream")], body).into_response()
}

/// Config pointing at `upstream` with an in-memory telemetry store.
pub fn test_config(upstream: &MockUpstream) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.upstream.url = upstream.url();
    config.upstream.api_key = "sk-test-server".into();
    config.upstream.use_system_proxy = false;
    config.telemetry.db_path = ":memory:".into();
    config.timeouts.upstream_ms = 2_000;
    config.timeouts.client_idle_ms = 2_000;
    config
}

/// A relay running in the background of a test.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub telemetry: Telemetry,
    shutdown: Shutdown,
}

impl TestRelay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Poll the store until at least `n` records exist.
    pub async fn wait_for_records(&self, n: usize) -> Vec<TelemetryRecord> {
        let store = self.telemetry.store().expect("telemetry disabled");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let records = store.list_raw(None, None).await.unwrap();
            if records.len() >= n || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_relay(config: ProxyConfig) -> TestRelay {
    let (server, listener) = bind(config, None).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let telemetry = server.telemetry().clone();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    TestRelay {
        addr,
        telemetry,
        shutdown,
    }
}

/// Client that never routes loopback traffic through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
