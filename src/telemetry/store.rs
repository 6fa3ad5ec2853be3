//! Telemetry persistence and async access.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use super::model::{AgentSummary, NewTelemetryRecord, TelemetryRecord};
use crate::routing::AgentTag;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Underlying SQLite log (sync).
///
/// One connection behind a mutex: appends are serialized so ids are assigned
/// in append order, and every query runs as a single statement under the lock
/// so it never observes a partially written row.
struct SqliteLog {
    conn: Mutex<Connection>,
}

impl SqliteLog {
    fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS telemetry_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                agent TEXT NOT NULL,
                in_bytes INTEGER NOT NULL,
                est_tokens INTEGER NOT NULL,
                out_bytes INTEGER NOT NULL,
                upstream_status INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                request_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_telemetry_ts ON telemetry_records(ts);
            CREATE INDEX IF NOT EXISTS idx_telemetry_agent ON telemetry_records(agent);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn append(&self, record: &NewTelemetryRecord) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO telemetry_records (ts, agent, in_bytes, est_tokens, out_bytes, upstream_status, duration_ms, request_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.timestamp,
                record.agent.as_str(),
                record.in_bytes as i64,
                record.estimated_tokens as i64,
                record.out_bytes as i64,
                record.upstream_status as i64,
                record.duration_ms as i64,
                record.request_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn summarize(
        &self,
        since_ms: Option<i64>,
        agent: Option<AgentTag>,
    ) -> Result<Vec<AgentSummary>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT agent,
                    COUNT(*),
                    COALESCE(SUM(in_bytes), 0),
                    COALESCE(SUM(est_tokens), 0),
                    COALESCE(SUM(out_bytes), 0),
                    COALESCE(AVG(duration_ms), 0),
                    COUNT(CASE WHEN upstream_status = 0 OR upstream_status >= 400 THEN 1 END)
             FROM telemetry_records
             WHERE (?1 IS NULL OR ts >= ?1) AND (?2 IS NULL OR agent = ?2)
             GROUP BY agent
             ORDER BY agent",
        )?;
        let summaries = stmt
            .query_map(params![since_ms, agent.map(|a| a.as_str())], |row| {
                Ok(AgentSummary {
                    agent: agent_column(row, 0)?,
                    requests: row.get::<_, i64>(1)? as u64,
                    total_in_bytes: row.get::<_, i64>(2)? as u64,
                    total_estimated_tokens: row.get::<_, i64>(3)? as u64,
                    total_out_bytes: row.get::<_, i64>(4)? as u64,
                    avg_duration_ms: row.get(5)?,
                    failures: row.get::<_, i64>(6)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    fn list_raw(
        &self,
        since_ms: Option<i64>,
        agent: Option<AgentTag>,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, ts, agent, in_bytes, est_tokens, out_bytes, upstream_status, duration_ms, request_id
             FROM telemetry_records
             WHERE (?1 IS NULL OR ts >= ?1) AND (?2 IS NULL OR agent = ?2)
             ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![since_ms, agent.map(|a| a.as_str())], |row| {
                Ok(TelemetryRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    agent: agent_column(row, 2)?,
                    in_bytes: row.get::<_, i64>(3)? as u64,
                    estimated_tokens: row.get::<_, i64>(4)? as u64,
                    out_bytes: row.get::<_, i64>(5)? as u64,
                    upstream_status: row.get::<_, i64>(6)? as u16,
                    duration_ms: row.get::<_, i64>(7)? as u64,
                    request_id: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn agent_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<AgentTag> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Async telemetry store (public API).
///
/// Blocking SQLite work runs on the blocking pool so request tasks never
/// stall a runtime worker.
#[derive(Clone)]
pub struct TelemetryStore {
    log: Arc<SqliteLog>,
}

impl TelemetryStore {
    /// Open (or create) the database at `db_path`. `:memory:` is accepted.
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        Ok(Self {
            log: Arc::new(SqliteLog::open(db_path)?),
        })
    }

    /// Append one record and return its id.
    pub async fn append(&self, record: NewTelemetryRecord) -> Result<i64, StoreError> {
        let log = self.log.clone();
        tokio::task::spawn_blocking(move || log.append(&record)).await?
    }

    /// Per-agent aggregates over records matching the filter.
    pub async fn summarize(
        &self,
        since_ms: Option<i64>,
        agent: Option<AgentTag>,
    ) -> Result<Vec<AgentSummary>, StoreError> {
        let log = self.log.clone();
        tokio::task::spawn_blocking(move || log.summarize(since_ms, agent)).await?
    }

    /// Matching records in ascending id order.
    pub async fn list_raw(
        &self,
        since_ms: Option<i64>,
        agent: Option<AgentTag>,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let log = self.log.clone();
        tokio::task::spawn_blocking(move || log.list_raw(since_ms, agent)).await?
    }
}
