//! Telemetry reporting: summary and flat CSV export views.
//!
//! Pure read path. Handlers resolve a [`TelemetryFilter`] against the current
//! time, query the store, then render with the functions here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::model::{AgentSummary, TelemetryRecord};
use crate::routing::AgentTag;

pub const CSV_HEADER: &str =
    "id,ts_iso,agent,in_bytes,est_tokens,out_bytes,upstream_status,duration_ms";

/// Optional trailing window and agent restriction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryFilter {
    /// Window in minutes. `None`, zero and negative all mean "all time".
    pub period_minutes: Option<i64>,
    pub agent: Option<AgentTag>,
}

impl TelemetryFilter {
    /// Normalized window: only positive values survive.
    pub fn window_minutes(&self) -> Option<i64> {
        self.period_minutes.filter(|m| *m > 0)
    }

    /// Lower timestamp bound (ms since epoch) for the window ending at `now`.
    pub fn since_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.window_minutes()
            .map(|minutes| now.timestamp_millis().saturating_sub(minutes.saturating_mul(60_000)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub requests: u64,
    pub total_in_bytes: u64,
    pub total_estimated_tokens: u64,
    pub total_out_bytes: u64,
    pub avg_duration_ms: f64,
    pub failures: u64,
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub persistence: &'static str,
    pub period_minutes: Option<i64>,
    pub agent: Option<AgentTag>,
    pub since: Option<String>,
    pub generated_at: String,
    pub totals: SummaryTotals,
    pub agents: Vec<AgentSummary>,
}

impl SummaryReport {
    pub fn new(filter: &TelemetryFilter, now: DateTime<Utc>, agents: Vec<AgentSummary>) -> Self {
        Self {
            persistence: "enabled",
            period_minutes: filter.window_minutes(),
            agent: filter.agent,
            since: filter.since_ms(now).map(format_millis),
            generated_at: format_timestamp(now),
            totals: totals(&agents),
            agents,
        }
    }
}

fn totals(agents: &[AgentSummary]) -> SummaryTotals {
    let requests: u64 = agents.iter().map(|a| a.requests).sum();
    let weighted: f64 = agents
        .iter()
        .map(|a| a.avg_duration_ms * a.requests as f64)
        .sum();
    SummaryTotals {
        requests,
        total_in_bytes: agents.iter().map(|a| a.total_in_bytes).sum(),
        total_estimated_tokens: agents.iter().map(|a| a.total_estimated_tokens).sum(),
        total_out_bytes: agents.iter().map(|a| a.total_out_bytes).sum(),
        avg_duration_ms: if requests == 0 {
            0.0
        } else {
            weighted / requests as f64
        },
        failures: agents.iter().map(|a| a.failures).sum(),
    }
}

/// RFC 3339 UTC with millisecond precision, e.g. `2026-10-19T08:15:30.123Z`.
pub fn format_millis(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(format_timestamp)
        .unwrap_or_else(|| ms.to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One CSV row (no trailing newline). Every field is numeric, a fixed agent
/// name or an RFC 3339 timestamp, so no quoting is needed.
pub fn csv_row(record: &TelemetryRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{}",
        record.id,
        format_millis(record.timestamp),
        record.agent,
        record.in_bytes,
        record.estimated_tokens,
        record.out_bytes,
        record.upstream_status,
        record.duration_ms,
    )
}

/// Full CSV document: header plus one row per record, in the given order.
pub fn export_csv(records: &[TelemetryRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for record in records {
        out.push_str(&csv_row(record));
        out.push('\n');
    }
    out
}

/// `telemetry-<agent|all>-<Nm|all>-<YYYYMMDDTHHMMSSZ>.csv`
pub fn export_filename(filter: &TelemetryFilter, now: DateTime<Utc>) -> String {
    let agent = filter.agent.map_or("all", |a| a.as_str());
    let window = filter
        .window_minutes()
        .map_or_else(|| "all".to_string(), |m| format!("{m}m"));
    format!(
        "telemetry-{agent}-{window}-{}.csv",
        now.format("%Y%m%dT%H%M%SZ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 15, 30).unwrap()
    }

    fn record(id: i64, timestamp: i64, agent: AgentTag) -> TelemetryRecord {
        TelemetryRecord {
            id,
            timestamp,
            agent,
            in_bytes: 401,
            estimated_tokens: 100,
            out_bytes: 2048,
            upstream_status: 200,
            duration_ms: 1234,
            request_id: None,
        }
    }

    fn parse_row(line: &str) -> TelemetryRecord {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 8);
        TelemetryRecord {
            id: fields[0].parse().unwrap(),
            timestamp: DateTime::parse_from_rfc3339(fields[1])
                .unwrap()
                .timestamp_millis(),
            agent: fields[2].parse().unwrap(),
            in_bytes: fields[3].parse().unwrap(),
            estimated_tokens: fields[4].parse().unwrap(),
            out_bytes: fields[5].parse().unwrap(),
            upstream_status: fields[6].parse().unwrap(),
            duration_ms: fields[7].parse().unwrap(),
            request_id: None,
        }
    }

    #[test]
    fn window_ignores_non_positive_periods() {
        let mut filter = TelemetryFilter::default();
        assert_eq!(filter.since_ms(now()), None);
        filter.period_minutes = Some(0);
        assert_eq!(filter.since_ms(now()), None);
        filter.period_minutes = Some(-5);
        assert_eq!(filter.since_ms(now()), None);
        filter.period_minutes = Some(10);
        assert_eq!(
            filter.since_ms(now()),
            Some(now().timestamp_millis() - 600_000)
        );
    }

    #[test]
    fn export_rows_round_trip_in_order() {
        let first = record(7, 1_760_861_730_123, AgentTag::Coder);
        let second = record(9, 1_760_861_731_001, AgentTag::Manager);

        let csv = export_csv(&[first.clone(), second.clone()]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(parse_row(lines.next().unwrap()), first);
        assert_eq!(parse_row(lines.next().unwrap()), second);
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn timestamps_render_with_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_millis(1_500), "1970-01-01T00:00:01.500Z");
    }

    #[test]
    fn filename_encodes_filter_and_time() {
        let filter = TelemetryFilter {
            period_minutes: Some(15),
            agent: Some(AgentTag::Tester),
        };
        assert_eq!(
            export_filename(&filter, now()),
            "telemetry-tester-15m-20261019T081530Z.csv"
        );
        assert_eq!(
            export_filename(&TelemetryFilter::default(), now()),
            "telemetry-all-all-20261019T081530Z.csv"
        );
    }

    #[test]
    fn totals_weight_average_by_requests() {
        let agents = vec![
            AgentSummary {
                agent: AgentTag::Manager,
                requests: 1,
                total_in_bytes: 10,
                total_estimated_tokens: 2,
                total_out_bytes: 5,
                avg_duration_ms: 100.0,
                failures: 0,
            },
            AgentSummary {
                agent: AgentTag::Coder,
                requests: 3,
                total_in_bytes: 30,
                total_estimated_tokens: 7,
                total_out_bytes: 15,
                avg_duration_ms: 200.0,
                failures: 1,
            },
        ];
        let report = SummaryReport::new(&TelemetryFilter::default(), now(), agents);
        assert_eq!(report.totals.requests, 4);
        assert_eq!(report.totals.total_in_bytes, 40);
        assert_eq!(report.totals.avg_duration_ms, 175.0);
        assert_eq!(report.totals.failures, 1);
        assert_eq!(report.since, None);
        assert_eq!(report.generated_at, "2026-10-19T08:15:30.000Z");
    }
}
