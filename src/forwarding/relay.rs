//! Streaming relay of the upstream body to the caller.
//!
//! A pump task pulls chunks from the upstream stream and pushes them into a
//! bounded channel whose receiving end is the caller's response body. Bytes
//! are counted as they pass; nothing is buffered beyond the channel.
//!
//! ```text
//! upstream bytes_stream ──▶ pump (count, deadline) ──▶ mpsc(RELAY_CAPACITY) ──▶ Body
//! ```
//!
//! The channel gives both clocks a place to fire: the upstream deadline
//! bounds every read, and a full channel that stays full for the client
//! idle bound means the caller stopped reading.

use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::time::Instant;

use crate::resilience::TimeoutPolicy;

/// Chunks in flight between the pump and the caller.
pub const RELAY_CAPACITY: usize = 16;

/// Error delivered to the caller's body when the relay is aborted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("response stream aborted: {0}")]
pub struct RelayError(pub String);

type RelayItem = Result<Bytes, RelayError>;

/// How a relayed exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upstream signalled end of body and the caller took every chunk.
    Completed,
    /// The upstream deadline passed before completion.
    UpstreamTimeout,
    /// Connection error or abnormal close from upstream.
    UpstreamError(String),
    /// The caller stopped draining the response for longer than the idle bound.
    ClientIdle,
    /// The caller went away (response body dropped).
    ClientGone,
}

impl RelayOutcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RelayOutcome::Completed => "completed",
            RelayOutcome::UpstreamTimeout => "upstream_timeout",
            RelayOutcome::UpstreamError(_) => "upstream_error",
            RelayOutcome::ClientIdle => "client_idle",
            RelayOutcome::ClientGone => "client_gone",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayOutcome::Completed)
    }
}

/// Sending half held by the pump.
pub struct RelaySender {
    tx: mpsc::Sender<RelayItem>,
}

/// Create the channel and the response body that drains it.
pub fn channel() -> (RelaySender, Body) {
    let (tx, rx) = mpsc::channel::<RelayItem>(RELAY_CAPACITY);
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (RelaySender { tx }, Body::from_stream(stream))
}

/// Pump `upstream` into `sender` until completion or abort.
///
/// Returns the number of bytes handed to the caller's body and the outcome.
/// A caller that goes away is noticed even while upstream is silent. The
/// upstream stream is dropped before returning, which closes its connection.
pub async fn pump<S, E>(
    mut upstream: S,
    sender: RelaySender,
    deadline: Instant,
    client_idle: Duration,
) -> (u64, RelayOutcome)
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut out_bytes = 0u64;
    let outcome = loop {
        let next = tokio::select! {
            next = TimeoutPolicy::until_deadline(deadline, upstream.next()) => match next {
                Ok(next) => next,
                Err(_) => break RelayOutcome::UpstreamTimeout,
            },
            _ = sender.tx.closed() => break RelayOutcome::ClientGone,
        };
        match next {
            None => break RelayOutcome::Completed,
            Some(Ok(chunk)) => {
                let len = chunk.len() as u64;
                match sender.tx.send_timeout(Ok(chunk), client_idle).await {
                    Ok(()) => out_bytes += len,
                    Err(SendTimeoutError::Timeout(_)) => break RelayOutcome::ClientIdle,
                    Err(SendTimeoutError::Closed(_)) => break RelayOutcome::ClientGone,
                }
            }
            Some(Err(e)) => break RelayOutcome::UpstreamError(e.to_string()),
        }
    };
    drop(upstream);

    if !matches!(outcome, RelayOutcome::Completed | RelayOutcome::ClientGone) {
        // Best effort: if the channel is full the caller is not reading anyway,
        // and dropping the sender still ends the body.
        let _ = sender.tx.try_send(Err(RelayError(outcome.label().to_string())));
    }
    (out_bytes, outcome)
}
