//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold the two per-request clocks: upstream call and client idle
//! - Turn the upstream bound into an absolute deadline at dispatch
//! - Bound individual waits on the inbound connection
//!
//! # Design Decisions
//! - The clocks are independent; either firing cancels only its own request
//! - Upstream deadline covers the head and the full response stream
//! - Client idle resets on every chunk moved, it is not a total bound

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::TimeoutConfig;

/// Which clock fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Upstream,
    ClientIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub upstream: Duration,
    pub client_idle: Duration,
}

impl TimeoutPolicy {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            upstream: Duration::from_millis(config.upstream_ms),
            client_idle: Duration::from_millis(config.client_idle_ms),
        }
    }

    /// Deadline for an upstream call dispatched at `dispatched`.
    pub fn upstream_deadline(&self, dispatched: Instant) -> Instant {
        dispatched + self.upstream
    }

    /// Await one step of the upstream exchange, failing once `deadline` has passed.
    pub async fn until_deadline<F: Future>(deadline: Instant, step: F) -> Result<F::Output, TimeoutKind> {
        tokio::time::timeout_at(deadline, step)
            .await
            .map_err(|_| TimeoutKind::Upstream)
    }

    /// Await one step of inbound I/O, failing if the client stays silent too long.
    pub async fn client_step<F: Future>(&self, step: F) -> Result<F::Output, TimeoutKind> {
        tokio::time::timeout(self.client_idle, step)
            .await
            .map_err(|_| TimeoutKind::ClientIdle)
    }
}
