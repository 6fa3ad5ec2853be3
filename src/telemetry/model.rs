//! Telemetry record data model.

use serde::Serialize;

use crate::routing::AgentTag;

/// `upstream_status` value when no upstream response head was received.
pub const NO_UPSTREAM_RESPONSE: u16 = 0;

/// Crude token estimate: one token per four bytes of request body.
pub fn estimate_tokens(in_bytes: u64) -> u64 {
    in_bytes / 4
}

/// A persisted record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub agent: AgentTag,
    pub in_bytes: u64,
    pub estimated_tokens: u64,
    pub out_bytes: u64,
    pub upstream_status: u16,
    pub duration_ms: u64,
    pub request_id: Option<String>,
}

/// A record before the store has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTelemetryRecord {
    pub timestamp: i64,
    pub agent: AgentTag,
    pub in_bytes: u64,
    pub estimated_tokens: u64,
    pub out_bytes: u64,
    pub upstream_status: u16,
    pub duration_ms: u64,
    pub request_id: Option<String>,
}

impl NewTelemetryRecord {
    pub fn into_record(self, id: i64) -> TelemetryRecord {
        TelemetryRecord {
            id,
            timestamp: self.timestamp,
            agent: self.agent,
            in_bytes: self.in_bytes,
            estimated_tokens: self.estimated_tokens,
            out_bytes: self.out_bytes,
            upstream_status: self.upstream_status,
            duration_ms: self.duration_ms,
            request_id: self.request_id,
        }
    }
}

/// Aggregates for one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent: AgentTag,
    pub requests: u64,
    pub total_in_bytes: u64,
    pub total_estimated_tokens: u64,
    pub total_out_bytes: u64,
    pub avg_duration_ms: f64,
    /// Requests with no upstream response or an upstream status >= 400.
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_is_floor_of_quarter() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 0);
        assert_eq!(estimate_tokens(2), 0);
        assert_eq!(estimate_tokens(3), 0);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(400_000), 100_000);
    }
}
