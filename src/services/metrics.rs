//! Local operation log backing the `status` command.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS operation_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    operation TEXT NOT NULL,
    detail TEXT NOT NULL,
    duration_ms INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_operation_log_timestamp ON operation_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_operation_log_operation ON operation_log(operation);
"#;

/// Records command outcomes in a local SQLite file.
///
/// Metrics are best-effort: a failure to record never fails the command
/// that was being recorded.
pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("ragstore").join("metrics.db"))
    }

    /// Open the store at its default location, creating parent directories.
    /// Returns None when the platform has no data directory or the file
    /// cannot be opened.
    pub fn open_default() -> Option<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }
        Self::open(&path).ok()
    }

    pub fn record(&self, operation: &str, detail: &str, duration_ms: u64, success: bool) {
        let _ = self.conn.execute(
            "INSERT INTO operation_log (timestamp, operation, detail, duration_ms, success)
             VALUES (datetime('now'), ?1, ?2, ?3, ?4)",
            params![operation, detail, duration_ms as i64, success as i32],
        );
    }

    /// Per-operation aggregates over the retention window.
    pub fn summaries(&self, retention_days: u32) -> Vec<OperationSummary> {
        let query = format!(
            r#"
            SELECT
                operation,
                COUNT(*) as total,
                COALESCE(AVG(duration_ms), 0) as avg_duration_ms,
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END) * 100.0 / NULLIF(COUNT(*), 0), 0) as error_rate
            FROM operation_log
            WHERE timestamp >= datetime('now', '-{} days')
            GROUP BY operation
            ORDER BY operation
            "#,
            retention_days
        );

        self.conn
            .prepare(&query)
            .and_then(|mut stmt| {
                let rows = stmt.query_map([], |row| {
                    Ok(OperationSummary {
                        operation: row.get(0)?,
                        total: row.get::<_, i64>(1)? as u64,
                        avg_duration_ms: row.get::<_, f64>(2)? as u64,
                        error_rate: row.get::<_, f64>(3)? as f32,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_default()
    }

    pub fn cleanup(&self, retention_days: u32) {
        let query = format!(
            "DELETE FROM operation_log WHERE timestamp < datetime('now', '-{} days')",
            retention_days
        );
        let _ = self.conn.execute(&query, []);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationSummary {
    pub operation: String,
    pub total: u64,
    pub avg_duration_ms: u64,
    pub error_rate: f32,
}
