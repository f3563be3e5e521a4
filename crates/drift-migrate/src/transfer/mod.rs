//! Batch transfer engine.
//!
//! Moves one table per call: a forward-only cursor on the source feeds
//! fixed-size batches through projection and value adaptation into a single
//! target transaction. Fetch and write never overlap.

use crate::core::{
    Batch, ColumnKind, ReadOptions, Row, RowCursor, SourceReader, TableSchema, TargetSession,
    TargetWriter, WriteTarget,
};
use crate::adapter;
use crate::error::{MigrateError, Result};
use crate::plan::{ConflictMode, MigrationPlan};
use crate::report::TableReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per fetch and per INSERT statement.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// Time and row counters for one table.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Time spent waiting on the source.
    pub read_time: Duration,

    /// Time spent adapting rows.
    pub adapt_time: Duration,

    /// Time spent waiting on the target.
    pub write_time: Duration,

    pub rows_read: u64,
    pub rows_written: u64,
    pub batches: u64,
}

/// Transfer engine.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    rows_transferred: AtomicU64,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            rows_transferred: AtomicU64::new(0),
        }
    }

    /// Rows committed by this engine across all tables so far.
    pub fn rows_transferred(&self) -> u64 {
        self.rows_transferred.load(Ordering::Relaxed)
    }

    /// Migrate one table according to a validated plan.
    ///
    /// Never returns an error: any failure rolls back the target transaction
    /// and is recorded in the returned report.
    pub async fn run(
        &self,
        plan: &MigrationPlan,
        source: &TableSchema,
        target: &TableSchema,
    ) -> TableReport {
        info!(
            "Starting transfer for {} ({})",
            target.full_name(),
            plan.describe()
        );
        let start = Instant::now();
        let mut stats = TransferStats::default();

        let outcome = self.transfer(plan, source, target, &mut stats).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                self.rows_transferred
                    .fetch_add(stats.rows_written, Ordering::Relaxed);
                info!(
                    "{}: {} rows read, {} written in {} batches ({}ms; read {:?}, adapt {:?}, write {:?})",
                    plan.table,
                    stats.rows_read,
                    stats.rows_written,
                    stats.batches,
                    duration_ms,
                    stats.read_time,
                    stats.adapt_time,
                    stats.write_time,
                );
                TableReport::succeeded(
                    &plan.table,
                    stats.rows_read,
                    stats.rows_written,
                    duration_ms,
                )
            }
            Err(e) => {
                let e = into_transfer_error(&plan.table, e);
                error!("{}: {}", plan.table, e);
                TableReport::failed(&plan.table, e.to_string(), stats.rows_read, duration_ms)
            }
        }
    }

    async fn transfer(
        &self,
        plan: &MigrationPlan,
        source: &TableSchema,
        target: &TableSchema,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let read_columns = plan.read_columns();
        let descriptors = read_columns
            .iter()
            .map(|name| {
                source.column(name).cloned().ok_or_else(|| {
                    MigrateError::plan(&plan.table, format!("source has no column '{}'", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let write_columns = plan.write_columns();
        let kinds: Vec<ColumnKind> = write_columns
            .iter()
            .map(|name| target.column(name).map_or(ColumnKind::Other, |c| c.kind()))
            .collect();

        // Cursor first, so the source snapshot predates the truncate.
        let mut cursor = self
            .source
            .open_cursor(ReadOptions {
                schema: source.schema.clone(),
                table: source.name.clone(),
                columns: descriptors,
                batch_size: self.config.batch_size,
            })
            .await?;

        let mut session = match self.target.begin().await {
            Ok(session) => session,
            Err(e) => {
                close_cursor(&plan.table, cursor).await;
                return Err(e);
            }
        };

        let write_target = WriteTarget {
            schema: target.schema.clone(),
            table: target.name.clone(),
            columns: write_columns,
            conflict_key: plan.upsert_key(),
        };

        let copied = self
            .copy_rows(
                plan,
                &read_columns,
                &kinds,
                &write_target,
                cursor.as_mut(),
                session.as_mut(),
                stats,
            )
            .await;
        close_cursor(&plan.table, cursor).await;

        match copied {
            Ok(()) => session.commit().await,
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    warn!("{}: rollback failed: {}", plan.table, rollback_err);
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_rows(
        &self,
        plan: &MigrationPlan,
        read_columns: &[String],
        kinds: &[ColumnKind],
        write_target: &WriteTarget,
        cursor: &mut dyn RowCursor,
        session: &mut dyn TargetSession,
        stats: &mut TransferStats,
    ) -> Result<()> {
        if plan.mode == ConflictMode::Replace {
            session
                .truncate(&write_target.schema, &write_target.table)
                .await
                .map_err(|e| {
                    MigrateError::transfer(&plan.table, format!("truncate failed: {}", e))
                })?;
        }

        loop {
            let read_start = Instant::now();
            let batch = cursor.next_batch().await?;
            stats.read_time += read_start.elapsed();
            if batch.is_empty() {
                break;
            }
            stats.rows_read += batch.len() as u64;

            let adapt_start = Instant::now();
            let rows = adapt_batch(plan, batch, read_columns, kinds, &write_target.columns)?;
            stats.adapt_time += adapt_start.elapsed();

            let write_start = Instant::now();
            let written = session.write_batch(write_target, rows).await?;
            stats.write_time += write_start.elapsed();
            stats.rows_written += written;
            stats.batches += 1;

            debug!(
                "{}: batch {} done, {} rows read, {} written so far",
                plan.table, stats.batches, stats.rows_read, stats.rows_written
            );
        }

        Ok(())
    }
}

/// Project, bind and normalize every row of a batch.
fn adapt_batch(
    plan: &MigrationPlan,
    batch: Batch,
    read_columns: &[String],
    kinds: &[ColumnKind],
    write_columns: &[String],
) -> Result<Vec<Row>> {
    batch
        .rows
        .into_iter()
        .map(|row| {
            plan.project(row, read_columns)
                .into_iter()
                .zip(kinds.iter().zip(write_columns))
                .map(|(value, (kind, column))| adapter::normalize(value, *kind, column))
                .collect::<Result<Row>>()
        })
        .collect()
}

async fn close_cursor(table: &str, cursor: Box<dyn RowCursor>) {
    if let Err(e) = cursor.close().await {
        warn!("{}: closing source cursor failed: {}", table, e);
    }
}

fn into_transfer_error(table: &str, e: MigrateError) -> MigrateError {
    match e {
        MigrateError::Transfer { .. } | MigrateError::PlanValidation { .. } => e,
        other => MigrateError::transfer(table, other.to_string()),
    }
}
