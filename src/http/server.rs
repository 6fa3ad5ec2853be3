//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for proxy, report and admin routes
//! - Wire up middleware (request ID, tracing, panic capture, admin timeout)
//! - Read, check and classify inbound bodies before forwarding
//! - Serve until the shutdown broadcast fires

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{AdminConfig, ProxyConfig, TokenWarningConfig};
use crate::forwarding::{ForwardRequest, ForwardingEngine};
use crate::http::request::{ensure_well_formed, read_body, request_id_of};
use crate::http::response::ApiError;
use crate::resilience::TimeoutPolicy;
use crate::routing::classify;
use crate::telemetry::Telemetry;

/// Paths accepted as chat-completion requests.
pub const PROXY_PATHS: [&str; 3] = ["/", "/v1/chat/completions", "/api/v1/chat/completions"];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: ForwardingEngine,
    pub telemetry: Telemetry,
    pub timeouts: TimeoutPolicy,
    pub max_body_bytes: usize,
    pub token_warnings: Arc<ArcSwap<TokenWarningConfig>>,
    pub config_path: Option<PathBuf>,
    pub admin: Arc<AdminConfig>,
    pub started_at: Instant,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP server for the relay.
pub struct HttpServer {
    config: ProxyConfig,
    config_path: Option<PathBuf>,
    telemetry: Telemetry,
    token_warnings: Arc<ArcSwap<TokenWarningConfig>>,
    engine: ForwardingEngine,
}

impl HttpServer {
    /// Create a server, opening the telemetry store named in the config.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let telemetry = Telemetry::negotiate(&config.telemetry);
        Self::with_telemetry(config, telemetry)
    }

    /// Create a server around an already negotiated telemetry store.
    pub fn with_telemetry(config: ProxyConfig, telemetry: Telemetry) -> Result<Self, ServerError> {
        let token_warnings = Arc::new(ArcSwap::from_pointee(config.token_warnings.clone()));
        let engine = ForwardingEngine::new(
            config.upstream.clone(),
            TimeoutPolicy::from_config(&config.timeouts),
            telemetry.clone(),
            token_warnings.clone(),
        )?;
        Ok(Self {
            config,
            config_path: None,
            telemetry,
            token_warnings,
            engine,
        })
    }

    /// Config file re-read by `POST /admin/reload`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let proxy = PROXY_PATHS
            .iter()
            .fold(Router::<AppState>::new(), |router, path| {
                router.route(path, post(proxy_handler))
            });

        let admin = admin::setup_admin_router(state.clone()).layer(middleware::from_fn_with_state(
            Duration::from_secs(config.timeouts.admin_request_secs),
            handler_deadline,
        ));

        proxy
            .merge(admin)
            .fallback(not_found)
            .method_not_allowed_fallback(not_found)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            request_id = %request_id_of(request.headers()),
                            method = %request.method(),
                            path = %request.uri().path(),
                        )
                    }))
                    .layer(CatchPanicLayer::custom(panic_response)),
            )
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let state = AppState {
            engine: self.engine,
            telemetry: self.telemetry.clone(),
            timeouts: TimeoutPolicy::from_config(&self.config.timeouts),
            max_body_bytes: self.config.limits.max_body_bytes,
            token_warnings: self.token_warnings,
            config_path: self.config_path,
            admin: Arc::new(self.config.admin.clone()),
            started_at: Instant::now(),
            port: addr.port(),
        };
        let app = Self::build_router(&self.config, state);

        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.url,
            persistence = self.telemetry.status_label(),
            "HTTP server starting"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Read, check and classify an inbound completion request, then forward it.
async fn proxy_handler(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    let request_id = request_id_of(request.headers());
    let agent = classify(request.uri().query());
    let (parts, body) = request.into_parts();

    let body = read_body(body, &parts.headers, state.max_body_bytes, &state.timeouts)
        .await
        .inspect_err(|e| tracing::warn!(request_id = %request_id, error = %e, "Rejected inbound body"))?;
    ensure_well_formed(&parts.headers, &body)?;

    tracing::debug!(
        request_id = %request_id,
        agent = %agent,
        in_bytes = body.len(),
        "Forwarding request"
    );

    state
        .engine
        .forward(ForwardRequest {
            request_id,
            agent,
            headers: parts.headers,
            body,
        })
        .await
}

/// Bound a non-streaming handler. Proxy routes are bounded by their own clocks instead.
async fn handler_deadline(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    tokio::time::timeout(limit, next.run(request))
        .await
        .map_err(|_| {
            tracing::warn!(limit_ms = limit.as_millis() as u64, "Handler exceeded its deadline");
            ApiError::HandlerTimeout(limit)
        })
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Handler panicked");
    ApiError::Internal("handler panicked".into()).into_response()
}
