//! Response handling and transformation.
//!
//! # Responsibilities
//! - Mirror upstream status and headers to the caller
//! - Map failures onto structured JSON error bodies
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped from the upstream head
//! - The caller always sees our `x-request-id`, never the upstream's
//! - Error bodies are `{"error": {"type": ..., "message": ...}}`

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::http::request::X_REQUEST_ID;

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Copy upstream response headers, minus the ones that must not cross a hop.
pub fn mirror_upstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if HOP_BY_HOP.contains(name)
            || name == header::UPGRADE
            || name.as_str() == "keep-alive"
            || name.as_str() == X_REQUEST_ID
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Every error the HTTP surface reports to a caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("client connection idle for more than {}ms", .0.as_millis())]
    ClientTimeout(Duration),
    #[error("upstream did not complete within {}ms", .0.as_millis())]
    UpstreamTimeout(Duration),
    #[error("request was not handled within {}ms", .0.as_millis())]
    HandlerTimeout(Duration),
    #[error("upstream request failed: {0}")]
    UpstreamUnavailable(String),
    #[error("telemetry persistence is disabled: {0}")]
    PersistenceDisabled(String),
    #[error("telemetry query failed: {0}")]
    QueryFailed(String),
    #[error("invalid query parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("no route for {method} {path}")]
    NotFound { method: String, path: String },
    #[error("missing or invalid admin token")]
    Unauthorized,
    #[error("reload unavailable: {0}")]
    ReloadUnavailable(String),
    #[error("reload failed: {0}")]
    ReloadFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MalformedBody(_) | ApiError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            ApiError::ClientTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::PersistenceDisabled(_) | ApiError::HandlerTimeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ReloadUnavailable(_) => StatusCode::CONFLICT,
            ApiError::QueryFailed(_) | ApiError::ReloadFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error type.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::PayloadTooLarge { .. } => "payload_too_large",
            ApiError::MalformedBody(_) => "malformed_body",
            ApiError::ClientTimeout(_) => "client_timeout",
            ApiError::UpstreamTimeout(_) => "upstream_timeout",
            ApiError::HandlerTimeout(_) => "handler_timeout",
            ApiError::UpstreamUnavailable(_) => "upstream_unavailable",
            ApiError::PersistenceDisabled(_) => "persistence_disabled",
            ApiError::QueryFailed(_) => "query_failed",
            ApiError::InvalidParameter { .. } => "invalid_parameter",
            ApiError::NotFound { .. } => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::ReloadUnavailable(_) => "reload_unavailable",
            ApiError::ReloadFailed(_) => "reload_failed",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": {"type": self.kind(), "message": self.to_string()}
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_hop_by_hop_and_upstream_request_id() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        upstream.insert(X_REQUEST_ID, HeaderValue::from_static("upstream-id"));
        upstream.append("x-ratelimit-remaining", HeaderValue::from_static("9"));

        let mirrored = mirror_upstream_headers(&upstream);
        assert_eq!(mirrored.len(), 2);
        assert_eq!(mirrored[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(mirrored["x-ratelimit-remaining"], "9");
    }

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(
            ApiError::UpstreamTimeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::UpstreamUnavailable("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::ClientTimeout(Duration::from_secs(1)).status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ApiError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn error_body_is_structured() {
        let response = ApiError::NotFound {
            method: "GET".into(),
            path: "/nope".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["type"], "not_found");
        assert_eq!(json["error"]["message"], "no route for GET /nope");
    }
}
