//! Health, telemetry report and reload handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::load_config;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::routing::AgentTag;
use crate::telemetry::report::{export_csv, export_filename};
use crate::telemetry::{StoreError, SummaryReport, Telemetry, TelemetryFilter, TelemetryStore};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub port: u16,
    pub persistence: &'static str,
}

/// Raw query parameters for `/stats` and `/stats/export`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub period_minutes: Option<String>,
    pub agent: Option<String>,
}

impl StatsParams {
    pub fn into_filter(self) -> Result<TelemetryFilter, ApiError> {
        let period_minutes = match self.period_minutes.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| ApiError::InvalidParameter {
                name: "periodMinutes",
                reason: format!("`{raw}` is not an integer"),
            })?),
        };
        let agent = match self.agent.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<AgentTag>().map_err(|e| ApiError::InvalidParameter {
                name: "agent",
                reason: e.to_string(),
            })?),
        };
        Ok(TelemetryFilter {
            period_minutes,
            agent,
        })
    }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        port: state.port,
        persistence: state.telemetry.status_label(),
    })
}

pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<SummaryReport>, ApiError> {
    let filter = params.into_filter()?;
    let store = require_store(&state.telemetry)?;
    let now = Utc::now();
    let agents = store
        .summarize(filter.since_ms(now), filter.agent)
        .await
        .map_err(|e| query_failed("summarize", e))?;
    Ok(Json(SummaryReport::new(&filter, now, agents)))
}

pub async fn export(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Response, ApiError> {
    let filter = params.into_filter()?;
    let store = require_store(&state.telemetry)?;
    let now = Utc::now();
    let records = store
        .list_raw(filter.since_ms(now), filter.agent)
        .await
        .map_err(|e| query_failed("list_raw", e))?;

    let disposition = format!("attachment; filename=\"{}\"", export_filename(&filter, now));
    let mut response = export_csv(&records).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Re-read the config file and swap in its token warning thresholds.
pub async fn reload(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let path = state
        .config_path
        .clone()
        .ok_or_else(|| ApiError::ReloadUnavailable("no config file was given at startup".into()))?;

    let loaded = tokio::task::spawn_blocking(move || load_config(Some(path.as_path())))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let config = loaded.map_err(|e| {
        tracing::error!(error = %e, "Config reload failed, keeping current thresholds");
        ApiError::ReloadFailed(e.to_string())
    })?;

    let previous = state
        .token_warnings
        .swap(Arc::new(config.token_warnings.clone()));
    tracing::info!(
        previous = ?*previous,
        current = ?config.token_warnings,
        "Token warning thresholds reloaded"
    );

    Ok(Json(serde_json::json!({
        "reloaded": true,
        "tokenWarnings": config.token_warnings,
    })))
}

fn require_store(telemetry: &Telemetry) -> Result<&TelemetryStore, ApiError> {
    match telemetry {
        Telemetry::Enabled(store) => Ok(store),
        Telemetry::Disabled { reason } => Err(ApiError::PersistenceDisabled(reason.to_string())),
    }
}

fn query_failed(operation: &'static str, e: StoreError) -> ApiError {
    tracing::error!(operation, error = %e, "Telemetry query failed");
    metrics::record_telemetry_failure(operation);
    ApiError::QueryFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(period: Option<&str>, agent: Option<&str>) -> StatsParams {
        StatsParams {
            period_minutes: period.map(String::from),
            agent: agent.map(String::from),
        }
    }

    #[test]
    fn parses_filter() {
        let filter = params(Some("30"), Some("CODER")).into_filter().unwrap();
        assert_eq!(filter.period_minutes, Some(30));
        assert_eq!(filter.agent, Some(AgentTag::Coder));

        let all = params(None, Some("")).into_filter().unwrap();
        assert_eq!(all, TelemetryFilter::default());

        let negative = params(Some("-5"), None).into_filter().unwrap();
        assert_eq!(negative.window_minutes(), None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            params(Some("ten"), None).into_filter(),
            Err(ApiError::InvalidParameter { name: "periodMinutes", .. })
        ));
        assert!(matches!(
            params(None, Some("boss")).into_filter(),
            Err(ApiError::InvalidParameter { name: "agent", .. })
        ));
    }
}
