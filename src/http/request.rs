//! Request handling at the boundary.
//!
//! # Responsibilities
//! - Expose the correlation id assigned by the request-id middleware
//! - Read the inbound body under the size limit and the client idle clock
//! - Reject malformed JSON before the forwarding engine sees it
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Declared Content-Length checked before any body byte is read
//! - The body is validated, never re-encoded: the original bytes are forwarded

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::de::IgnoredAny;

use crate::http::response::ApiError;
use crate::resilience::TimeoutPolicy;

/// Correlation header, generated when the caller sends none.
pub const X_REQUEST_ID: &str = "x-request-id";

/// The request id set by `SetRequestIdLayer`.
pub fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Read the whole body. Each chunk must arrive within the client idle bound.
pub async fn read_body(
    body: Body,
    headers: &HeaderMap,
    max_bytes: usize,
    timeouts: &TimeoutPolicy,
) -> Result<Bytes, ApiError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > max_bytes as u64) {
        return Err(ApiError::PayloadTooLarge { limit: max_bytes });
    }

    let mut buf = BytesMut::with_capacity(declared.unwrap_or(0).min(max_bytes as u64) as usize);
    let mut stream = body.into_data_stream();
    loop {
        let chunk = timeouts
            .client_step(stream.next())
            .await
            .map_err(|_| ApiError::ClientTimeout(timeouts.client_idle))?;
        match chunk {
            None => break,
            Some(Ok(chunk)) => {
                if buf.len() + chunk.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge { limit: max_bytes });
                }
                buf.extend_from_slice(&chunk);
            }
            Some(Err(e)) => return Err(ApiError::MalformedBody(e.to_string())),
        }
    }
    Ok(buf.freeze())
}

/// Requests without a content type are forwarded as JSON, so they are checked as JSON too.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.to_ascii_lowercase().contains("json"))
}

/// Reject a non-empty JSON-typed body that does not parse. Nothing is kept from the parse.
pub fn ensure_well_formed(headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    if body.is_empty() || !is_json(headers) {
        return Ok(());
    }
    serde_json::from_slice::<IgnoredAny>(body)
        .map(|_| ())
        .map_err(|e| ApiError::MalformedBody(e.to_string()))
}
