//! The forwarding engine.
//!
//! Each forwarded request becomes an exchange running in its own task:
//!
//! ```text
//! handler ──spawn──▶ exchange task
//!    │                  │ POST upstream (deadline armed)
//!    │◀──oneshot head───┤ status + mirrored headers + relay body
//!    │                  │ pump chunks, count out_bytes
//!    ▼                  ▼ append exactly one telemetry record
//! caller
//! ```
//!
//! Running the exchange outside the handler future means a caller that
//! disconnects early cannot skip the telemetry write.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response};
use bytes::Bytes;
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::{TokenWarningConfig, UpstreamConfig};
use crate::forwarding::relay::{self, RelayOutcome};
use crate::http::request::X_REQUEST_ID;
use crate::http::response::{mirror_upstream_headers, ApiError};
use crate::observability::metrics;
use crate::resilience::TimeoutPolicy;
use crate::routing::AgentTag;
use crate::telemetry::{estimate_tokens, NewTelemetryRecord, Telemetry, NO_UPSTREAM_RESPONSE};

const HTTP_REFERER: &str = "http-referer";
const X_TITLE: &str = "x-title";

/// One inbound request, already read and classified.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub request_id: String,
    pub agent: AgentTag,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Relays requests to the single configured upstream.
#[derive(Clone)]
pub struct ForwardingEngine {
    client: reqwest::Client,
    upstream: Arc<UpstreamConfig>,
    timeouts: TimeoutPolicy,
    telemetry: Telemetry,
    token_warnings: Arc<ArcSwap<TokenWarningConfig>>,
}

impl ForwardingEngine {
    pub fn new(
        upstream: UpstreamConfig,
        timeouts: TimeoutPolicy,
        telemetry: Telemetry,
        token_warnings: Arc<ArcSwap<TokenWarningConfig>>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if !upstream.use_system_proxy {
            builder = builder.no_proxy();
        }
        Ok(Self {
            client: builder.build()?,
            upstream: Arc::new(upstream),
            timeouts,
            telemetry,
            token_warnings,
        })
    }

    /// Forward one request. Resolves once the upstream head is known; the body
    /// keeps streaming after this returns.
    pub async fn forward(&self, request: ForwardRequest) -> Result<Response<Body>, ApiError> {
        let (head_tx, head_rx) = oneshot::channel();
        let exchange = Exchange {
            engine: self.clone(),
            request,
        };
        tokio::spawn(exchange.run(head_tx));

        head_rx
            .await
            .unwrap_or_else(|_| Err(ApiError::Internal("forwarding task ended without a response".into())))
    }

    /// The current threshold for `agent`, if `estimated_tokens` is over it.
    pub(crate) fn exceeds_threshold(&self, agent: AgentTag, estimated_tokens: u64) -> Option<u64> {
        let threshold = self.token_warnings.load().threshold(agent);
        (estimated_tokens > threshold).then_some(threshold)
    }

    fn warn_if_oversized(&self, request: &ForwardRequest, estimated_tokens: u64) {
        if let Some(threshold) = self.exceeds_threshold(request.agent, estimated_tokens) {
            tracing::warn!(
                request_id = %request.request_id,
                agent = %request.agent,
                estimated_tokens,
                threshold,
                "Request exceeds the soft token threshold for this agent"
            );
            metrics::record_token_warning(request.agent);
        }
    }

    /// Upstream-facing headers. Authorization always comes from our config.
    fn outbound_headers(&self, request: &ForwardRequest) -> HeaderMap {
        let inbound = &request.headers;
        let mut headers = HeaderMap::new();

        headers.insert(
            header::CONTENT_TYPE,
            inbound
                .get(header::CONTENT_TYPE)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("application/json")),
        );
        headers.insert(
            header::ACCEPT,
            inbound
                .get(header::ACCEPT)
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("*/*")),
        );
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.upstream.api_key)) {
            headers.insert(header::AUTHORIZATION, value);
        }

        let referer = inbound
            .get(HTTP_REFERER)
            .or_else(|| inbound.get(header::REFERER))
            .cloned()
            .or_else(|| HeaderValue::from_str(&self.upstream.referer).ok());
        if let Some(referer) = referer {
            headers.insert(HTTP_REFERER, referer);
        }
        let title = inbound
            .get(X_TITLE)
            .cloned()
            .or_else(|| HeaderValue::from_str(&self.upstream.title).ok());
        if let Some(title) = title {
            headers.insert(X_TITLE, title);
        }
        if let Ok(id) = HeaderValue::from_str(&request.request_id) {
            headers.insert(X_REQUEST_ID, id);
        }
        headers
    }
}

/// Measurements fixed at dispatch time.
struct Meter {
    request_id: String,
    agent: AgentTag,
    in_bytes: u64,
    estimated_tokens: u64,
    dispatched: Instant,
}

struct Exchange {
    engine: ForwardingEngine,
    request: ForwardRequest,
}

type HeadSender = oneshot::Sender<Result<Response<Body>, ApiError>>;

impl Exchange {
    async fn run(self, mut head_tx: HeadSender) {
        let Exchange { engine, request } = self;

        let in_bytes = request.body.len() as u64;
        let estimated_tokens = estimate_tokens(in_bytes);
        engine.warn_if_oversized(&request, estimated_tokens);

        let headers = engine.outbound_headers(&request);
        let dispatched = Instant::now();
        let deadline = engine.timeouts.upstream_deadline(dispatched);
        let meter = Meter {
            request_id: request.request_id,
            agent: request.agent,
            in_bytes,
            estimated_tokens,
            dispatched,
        };

        tracing::debug!(
            request_id = %meter.request_id,
            agent = %meter.agent,
            in_bytes,
            upstream = %engine.upstream.url,
            "Dispatching to upstream"
        );

        let send = engine
            .client
            .post(engine.upstream.url.as_str())
            .headers(headers)
            .body(request.body)
            .send();

        let sent = tokio::select! {
            sent = TimeoutPolicy::until_deadline(deadline, send) => sent,
            _ = head_tx.closed() => {
                tracing::debug!(request_id = %meter.request_id, "Caller left while waiting for the upstream head");
                engine.finish(meter, NO_UPSTREAM_RESPONSE, 0, RelayOutcome::ClientGone).await;
                return;
            }
        };

        let upstream = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(request_id = %meter.request_id, error = %e, "Upstream request failed");
                let outcome = RelayOutcome::UpstreamError(e.to_string());
                let _ = head_tx.send(Err(ApiError::UpstreamUnavailable(e.to_string())));
                engine.finish(meter, NO_UPSTREAM_RESPONSE, 0, outcome).await;
                return;
            }
            Err(_) => {
                tracing::warn!(request_id = %meter.request_id, "Upstream timed out before responding");
                let _ = head_tx.send(Err(ApiError::UpstreamTimeout(engine.timeouts.upstream)));
                engine.finish(meter, NO_UPSTREAM_RESPONSE, 0, RelayOutcome::UpstreamTimeout).await;
                return;
            }
        };

        let status = upstream.status();
        let (sender, body) = relay::channel();
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = mirror_upstream_headers(upstream.headers());

        if head_tx.send(Ok(response)).is_err() {
            tracing::debug!(request_id = %meter.request_id, "Caller left before the upstream head arrived");
            drop(upstream);
            engine.finish(meter, status.as_u16(), 0, RelayOutcome::ClientGone).await;
            return;
        }

        let (out_bytes, outcome) = relay::pump(
            Box::pin(upstream.bytes_stream()),
            sender,
            deadline,
            engine.timeouts.client_idle,
        )
        .await;
        engine.finish(meter, status.as_u16(), out_bytes, outcome).await;
    }
}

impl ForwardingEngine {
    async fn finish(&self, meter: Meter, upstream_status: u16, out_bytes: u64, outcome: RelayOutcome) {
        let duration = meter.dispatched.elapsed();
        let duration_ms = duration.as_millis() as u64;

        if outcome.is_success() {
            tracing::info!(
                request_id = %meter.request_id,
                agent = %meter.agent,
                upstream_status,
                in_bytes = meter.in_bytes,
                out_bytes,
                duration_ms,
                "Request relayed"
            );
        } else {
            tracing::warn!(
                request_id = %meter.request_id,
                agent = %meter.agent,
                upstream_status,
                in_bytes = meter.in_bytes,
                out_bytes,
                duration_ms,
                outcome = ?outcome,
                "Request relay ended early"
            );
        }
        metrics::record_forward(meter.agent, upstream_status, outcome.label(), duration);
        metrics::record_bytes(meter.agent, meter.in_bytes, out_bytes);

        self.telemetry
            .record(NewTelemetryRecord {
                timestamp: Utc::now().timestamp_millis(),
                agent: meter.agent,
                in_bytes: meter.in_bytes,
                estimated_tokens: meter.estimated_tokens,
                out_bytes,
                upstream_status,
                duration_ms,
                request_id: Some(meter.request_id),
            })
            .await;
    }
}
