//! Per-table and per-run migration reports.
//!
//! Reports are emitted (logged, printed, serialized to JSON) and never stored
//! by the engine.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Result of migrating one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,

    /// Rows fetched from the source.
    pub rows_read: u64,

    /// Rows the target reported as written. Only meaningful when succeeded,
    /// a failed table's writes were rolled back.
    pub rows_written: u64,

    pub status: TableStatus,

    /// Failure text, set when `status` is failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Why the table was skipped, or the planned action of a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Wall time spent on the table.
    pub duration_ms: u64,
}

impl TableReport {
    pub fn succeeded(
        table: impl Into<String>,
        rows_read: u64,
        rows_written: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            table: table.into(),
            rows_read,
            rows_written,
            status: TableStatus::Succeeded,
            error: None,
            detail: None,
            duration_ms,
        }
    }

    pub fn failed(
        table: impl Into<String>,
        error: impl Into<String>,
        rows_read: u64,
        duration_ms: u64,
    ) -> Self {
        Self {
            table: table.into(),
            rows_read,
            rows_written: 0,
            status: TableStatus::Failed,
            error: Some(error.into()),
            detail: None,
            duration_ms,
        }
    }

    pub fn skipped(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows_read: 0,
            rows_written: 0,
            status: TableStatus::Skipped,
            error: None,
            detail: Some(detail.into()),
            duration_ms: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TableStatus::Failed
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned table succeeded or was skipped.
    Completed,
    /// At least one table failed.
    CompletedWithErrors,
    /// Stopped early on request.
    Cancelled,
}

/// Aggregate result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    pub status: RunStatus,

    /// Whether rows were actually moved.
    pub dry_run: bool,

    /// SHA-256 of the configuration the run used.
    pub config_hash: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_succeeded: usize,
    pub tables_failed: usize,
    pub tables_skipped: usize,

    /// Rows written across succeeded tables.
    pub rows_written: u64,

    /// Names of failed tables, in run order.
    pub failed_tables: Vec<String>,

    /// One entry per table, in run order.
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    /// Aggregate table reports into a run report.
    pub fn new(
        run_id: impl Into<String>,
        config_hash: impl Into<String>,
        started_at: DateTime<Utc>,
        dry_run: bool,
        cancelled: bool,
        tables: Vec<TableReport>,
    ) -> Self {
        let completed_at = Utc::now();
        let count = |status| tables.iter().filter(|t| t.status == status).count();
        let tables_succeeded = count(TableStatus::Succeeded);
        let tables_failed = count(TableStatus::Failed);
        let tables_skipped = count(TableStatus::Skipped);

        let status = if cancelled {
            RunStatus::Cancelled
        } else if tables_failed > 0 {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };

        Self {
            run_id: run_id.into(),
            status,
            dry_run,
            config_hash: config_hash.into(),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0,
            tables_total: tables.len(),
            tables_succeeded,
            tables_failed,
            tables_skipped,
            rows_written: tables
                .iter()
                .filter(|t| t.status == TableStatus::Succeeded)
                .map(|t| t.rows_written)
                .sum(),
            failed_tables: tables
                .iter()
                .filter(|t| t.is_failed())
                .map(|t| t.table.clone())
                .collect(),
            tables,
        }
    }

    /// True iff no table failed.
    pub fn succeeded(&self) -> bool {
        self.tables_failed == 0
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(tables: Vec<TableReport>, cancelled: bool) -> MigrationReport {
        MigrationReport::new("run-1", "abc", Utc::now(), false, cancelled, tables)
    }

    #[test]
    fn test_counts_and_status() {
        let r = report(
            vec![
                TableReport::succeeded("a", 10, 10, 5),
                TableReport::failed("b", "duplicate key", 3, 2),
                TableReport::skipped("c", "only in source"),
            ],
            false,
        );
        assert_eq!(r.tables_total, 3);
        assert_eq!(r.tables_succeeded, 1);
        assert_eq!(r.tables_failed, 1);
        assert_eq!(r.tables_skipped, 1);
        assert_eq!(r.rows_written, 10);
        assert_eq!(r.failed_tables, vec!["b"]);
        assert_eq!(r.status, RunStatus::CompletedWithErrors);
        assert!(!r.succeeded());
    }

    #[test]
    fn test_skipped_tables_do_not_fail_the_run() {
        let r = report(
            vec![
                TableReport::succeeded("a", 1, 1, 1),
                TableReport::skipped("b", "cancelled"),
            ],
            true,
        );
        assert!(r.succeeded());
        assert_eq!(r.status, RunStatus::Cancelled);
    }

    #[test]
    fn test_to_json() {
        let r = report(vec![TableReport::failed("file", "truncate blocked", 0, 1)], false);
        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed_with_errors");
        assert_eq!(json["tables"][0]["status"], "failed");
        assert_eq!(json["tables"][0]["error"], "truncate blocked");
        assert!(json["tables"][0].get("detail").is_none());
    }
}
