//! # drift-migrate
//!
//! Schema-aware batched migration between two PostgreSQL databases whose
//! schemas have drifted apart.
//!
//! The library reads both catalogs, sorts tables into identical, divergent
//! and one-sided groups, and moves rows table by table:
//!
//! - **Straight copies** for identical tables, generated from the catalog
//! - **Authored plans** for divergent tables: column pairs, renames and
//!   synthesized columns, declared in the YAML config
//! - **Value adaptation** of loose text into JSON columns
//! - **Idempotent writes** via `ON CONFLICT ... DO UPDATE` in merge mode
//! - **Failure isolation**: each table commits or rolls back on its own
//!
//! ## Example
//!
//! ```rust,no_run
//! use drift_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> drift_migrate::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let orchestrator = Orchestrator::new(config).await?;
//! let report = orchestrator.run(CancellationToken::new(), false).await?;
//! println!("Wrote {} rows", report.rows_written);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod classify;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod report;
pub mod transfer;

// Re-exports for convenient access
pub use classify::{classify, Classification, SchemaDiff};
pub use config::{Config, DatabaseConfig, MigrationConfig, TablePlanConfig};
pub use crate::core::{Catalog, ColumnDescriptor, Row, SqlValue, TableSchema};
pub use drivers::PgPool;
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, Orchestrator, RowCountCheck};
pub use plan::{ConflictMode, MigrationPlan};
pub use report::{MigrationReport, RunStatus, TableReport, TableStatus};
pub use transfer::{TransferConfig, TransferEngine, TransferStats};
