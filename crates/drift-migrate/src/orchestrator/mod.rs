//! Migration orchestrator - main workflow coordinator.

use crate::classify::{classify, Classification};
use crate::config::{Config, TablePlanConfig};
use crate::core::{Catalog, CatalogReader, SourceReader, TargetWriter};
use crate::drivers::postgres::PgPool;
use crate::error::{MigrateError, Result};
use crate::plan::{MigrationPlan, PlanValidator};
use crate::report::{MigrationReport, TableReport};
use crate::transfer::{TransferConfig, TransferEngine};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source_catalog: Arc<dyn CatalogReader>,
    source: Arc<dyn SourceReader>,
    target_catalog: Arc<dyn CatalogReader>,
    target: Arc<dyn TargetWriter>,
    pools: Option<(PgPool, PgPool)>,
}

/// Connectivity of both databases.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Source and target row counts of one planned table.
#[derive(Debug, Clone, Serialize)]
pub struct RowCountCheck {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

impl Orchestrator {
    /// Create a new orchestrator connected to both databases.
    pub async fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.migration.connect_timeout_secs);
        let max_conns = config.migration.max_connections;

        let source = PgPool::connect(&config.source, max_conns, timeout).await?;
        let target = PgPool::connect(&config.target, max_conns, timeout).await?;

        let mut orchestrator =
            Self::with_backends(config, Arc::new(source.clone()), Arc::new(target.clone()));
        orchestrator.pools = Some((source, target));
        Ok(orchestrator)
    }

    /// Create an orchestrator over arbitrary backends.
    pub fn with_backends<S, T>(config: Config, source: Arc<S>, target: Arc<T>) -> Self
    where
        S: CatalogReader + SourceReader + 'static,
        T: CatalogReader + TargetWriter + 'static,
    {
        Self {
            config,
            source_catalog: source.clone(),
            source,
            target_catalog: target.clone(),
            target,
            pools: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read both catalogs.
    async fn read_catalogs(&self) -> Result<(Catalog, Catalog)> {
        let source = self
            .source_catalog
            .read_catalog(&self.config.source.schema)
            .await?;
        let target = self
            .target_catalog
            .read_catalog(&self.config.target.schema)
            .await?;
        info!(
            "Found {} source tables and {} target tables",
            source.len(),
            target.len()
        );
        Ok((source, target))
    }

    /// Classify source tables against target tables.
    pub async fn compare(&self) -> Result<Classification> {
        let (source, target) = self.read_catalogs().await?;
        let classification = classify(&source, &target);
        log_classification(&classification);
        Ok(classification)
    }

    /// Run the migration.
    ///
    /// Tables run one at a time in run order. Cancellation is checked between
    /// tables; tables not started are reported as skipped.
    pub async fn run(&self, cancel: CancellationToken, dry_run: bool) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        // Phase 1: Catalogs
        info!("Phase 1: Reading catalogs");
        let (source_catalog, target_catalog) = self.read_catalogs().await?;

        // Phase 2: Classification
        info!("Phase 2: Classifying tables");
        let classification = classify(&source_catalog, &target_catalog);
        log_classification(&classification);

        let order = self.run_order(&classification);
        info!("Run order: {} tables", order.len());

        // Phase 3: Transfer
        info!("Phase 3: Transferring data{}", if dry_run { " (dry run)" } else { "" });
        let engine = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig {
                batch_size: self.config.migration.batch_size,
            },
        );

        let mut reports = Vec::with_capacity(order.len());
        let mut cancelled = false;

        for entry in &order {
            if !cancelled && cancel.is_cancelled() {
                warn!("Cancellation requested, skipping remaining tables");
                cancelled = true;
            }
            if cancelled {
                reports.push(TableReport::skipped(&entry.table, "cancelled"));
                continue;
            }

            let report = self
                .run_table(
                    entry,
                    &engine,
                    &source_catalog,
                    &target_catalog,
                    &classification,
                    dry_run,
                )
                .await;
            reports.push(report);
        }

        let report = MigrationReport::new(
            run_id,
            self.config.hash(),
            started_at,
            dry_run,
            cancelled,
            reports,
        );

        info!(
            "Migration {:?}: {} succeeded, {} failed, {} skipped, {} rows written in {:.2}s",
            report.status,
            report.tables_succeeded,
            report.tables_failed,
            report.tables_skipped,
            report.rows_written,
            report.duration_seconds
        );
        if !report.failed_tables.is_empty() {
            warn!("Failed tables: {:?}", report.failed_tables);
        }

        Ok(report)
    }

    async fn run_table(
        &self,
        entry: &TablePlanConfig,
        engine: &TransferEngine,
        source_catalog: &Catalog,
        target_catalog: &Catalog,
        classification: &Classification,
        dry_run: bool,
    ) -> TableReport {
        let name = entry.table.as_str();

        let (source, target) = match (source_catalog.get(name), target_catalog.get(name)) {
            (Some(s), Some(t)) => (s, t),
            (None, _) => {
                warn!("{}: not found in source schema, skipping", name);
                return TableReport::skipped(name, "table not found in source");
            }
            (_, None) => {
                warn!("{}: not found in target schema, skipping", name);
                return TableReport::skipped(name, "table not found in target");
            }
        };

        if !entry.is_authored() && !classification.is_identical(name) {
            warn!("{}: schemas differ and no column mapping is configured, skipping", name);
            return TableReport::skipped(name, "schemas differ and no column mapping is configured");
        }

        let plan = MigrationPlan::from_config(entry, source, target);
        if let Err(e) = PlanValidator::validate(&plan, source, target) {
            warn!("{}", e);
            return TableReport::failed(name, e.to_string(), 0, 0);
        }

        if dry_run {
            info!("{}: would run {}", name, plan.describe());
            return TableReport::skipped(name, format!("dry run: {}", plan.describe()));
        }

        engine.run(&plan, source, target).await
    }

    /// Configured tables in order, then identical tables when
    /// `include_identical` is set. Excluded tables are dropped.
    fn run_order(&self, classification: &Classification) -> Vec<TablePlanConfig> {
        let migration = &self.config.migration;
        let excluded: HashSet<&str> = migration.exclude_tables.iter().map(String::as_str).collect();

        let mut order: Vec<TablePlanConfig> = Vec::new();
        for entry in &migration.tables {
            if excluded.contains(entry.table.as_str()) {
                debug!("{}: excluded", entry.table);
                continue;
            }
            order.push(entry.clone());
        }

        if migration.include_identical {
            let listed: HashSet<String> =
                migration.tables.iter().map(|t| t.table.clone()).collect();
            for name in &classification.identical {
                if !listed.contains(name) && !excluded.contains(name.as_str()) {
                    order.push(TablePlanConfig::straight_copy(name));
                }
            }
        }

        order
    }

    /// Compare row counts of every planned table present on both sides.
    pub async fn validate(&self) -> Result<Vec<RowCountCheck>> {
        let (source_catalog, target_catalog) = self.read_catalogs().await?;
        let classification = classify(&source_catalog, &target_catalog);
        let source_schema = &self.config.source.schema;
        let target_schema = &self.config.target.schema;

        let mut results = Vec::new();
        for entry in self.run_order(&classification) {
            let table = entry.table;
            if !source_catalog.contains(&table) || !target_catalog.contains(&table) {
                debug!("{}: missing on one side, not counted", table);
                continue;
            }

            let source_rows = self.source.row_count(source_schema, &table).await?;
            let target_rows = self.target.row_count(target_schema, &table).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table, source_rows, target_rows
                );
            }

            results.push(RowCountCheck {
                table,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Probe both databases.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source, target) = self.pools.as_ref().ok_or_else(|| {
            MigrateError::Config("health check needs live database connections".to_string())
        })?;

        let (source, target) = tokio::join!(source.ping(), target.ping());

        Ok(HealthCheckResult {
            healthy: source.connected && target.connected,
            source_connected: source.connected,
            source_latency_ms: source.latency_ms,
            source_error: source.error,
            target_connected: target.connected,
            target_latency_ms: target.latency_ms,
            target_error: target.error,
        })
    }

    /// Close the connection pools.
    pub fn close(&self) {
        if let Some((source, target)) = &self.pools {
            source.close();
            target.close();
        }
    }
}

fn log_classification(classification: &Classification) {
    info!(
        "{} identical, {} divergent, {} only in source, {} only in target",
        classification.identical.len(),
        classification.divergent.len(),
        classification.only_in_source.len(),
        classification.only_in_target.len()
    );
    for (table, diff) in &classification.divergent {
        warn!("{}: schema differs: {}", table, diff.summary());
    }
    for table in &classification.only_in_source {
        debug!("{}: only in source", table);
    }
    for table in &classification.only_in_target {
        debug!("{}: only in target", table);
    }
}
