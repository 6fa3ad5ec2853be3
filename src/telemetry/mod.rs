//! Request telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! Forwarding engine (one record per forwarded request)
//!     → Telemetry::record
//!     → store.rs (SQLite append, id assigned)
//!
//! GET /stats, GET /stats/export
//!     → store.rs (summarize / list_raw)
//!     → report.rs (summary JSON, CSV export)
//! ```
//!
//! # Design Decisions
//! - Availability is decided once at startup (`Telemetry::negotiate`)
//! - A failed append is logged and counted, never surfaced to the caller
//! - Records are never updated or deleted

pub mod model;
pub mod report;
pub mod store;

use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::observability::metrics;

pub use model::{estimate_tokens, AgentSummary, NewTelemetryRecord, TelemetryRecord, NO_UPSTREAM_RESPONSE};
pub use report::{SummaryReport, TelemetryFilter};
pub use store::{StoreError, TelemetryStore};

/// Outcome of the startup capability check for the telemetry store.
#[derive(Clone)]
pub enum Telemetry {
    Enabled(TelemetryStore),
    Disabled { reason: Arc<str> },
}

impl Telemetry {
    /// Open the configured store, degrading to `Disabled` if it cannot be opened.
    pub fn negotiate(config: &TelemetryConfig) -> Self {
        if !config.enabled {
            tracing::info!("Telemetry disabled by configuration");
            return Self::disabled("disabled by configuration");
        }

        match TelemetryStore::open(&config.db_path) {
            Ok(store) => {
                tracing::info!(db_path = %config.db_path, "Telemetry store opened");
                Telemetry::Enabled(store)
            }
            Err(e) => {
                tracing::warn!(
                    db_path = %config.db_path,
                    error = %e,
                    "Telemetry store unavailable, continuing without persistence"
                );
                Self::disabled(e.to_string())
            }
        }
    }

    pub fn disabled(reason: impl Into<Arc<str>>) -> Self {
        Telemetry::Disabled {
            reason: reason.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Telemetry::Enabled(_))
    }

    pub fn store(&self) -> Option<&TelemetryStore> {
        match self {
            Telemetry::Enabled(store) => Some(store),
            Telemetry::Disabled { .. } => None,
        }
    }

    /// `"enabled"` or `"disabled"`, as reported by the health and stats endpoints.
    pub fn status_label(&self) -> &'static str {
        if self.is_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    }

    /// Persist a record. Failures are logged; the caller never sees them.
    pub async fn record(&self, record: NewTelemetryRecord) -> Option<i64> {
        let store = self.store()?;
        let request_id = record.request_id.clone();
        match store.append(record).await {
            Ok(id) => {
                tracing::debug!(request_id = ?request_id, record_id = id, "Telemetry recorded");
                Some(id)
            }
            Err(e) => {
                tracing::error!(request_id = ?request_id, error = %e, "Failed to persist telemetry record");
                metrics::record_telemetry_failure("append");
                None
            }
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Telemetry::Enabled(_) => f.write_str("Telemetry::Enabled"),
            Telemetry::Disabled { reason } => write!(f, "Telemetry::Disabled({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::AgentTag;

    #[tokio::test]
    async fn unopenable_store_degrades() {
        let telemetry = Telemetry::negotiate(&TelemetryConfig {
            enabled: true,
            db_path: "/nonexistent-dir/definitely/missing.db".into(),
        });
        assert!(!telemetry.is_enabled());
        assert_eq!(telemetry.status_label(), "disabled");

        let id = telemetry
            .record(NewTelemetryRecord {
                timestamp: 0,
                agent: AgentTag::Manager,
                in_bytes: 0,
                estimated_tokens: 0,
                out_bytes: 0,
                upstream_status: NO_UPSTREAM_RESPONSE,
                duration_ms: 0,
                request_id: None,
            })
            .await;
        assert_eq!(id, None);
    }

    #[test]
    fn config_switch_disables() {
        let telemetry = Telemetry::negotiate(&TelemetryConfig {
            enabled: false,
            db_path: ":memory:".into(),
        });
        assert!(matches!(telemetry, Telemetry::Disabled { .. }));
    }
}
