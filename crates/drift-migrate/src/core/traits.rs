//! Core traits at the database boundary.
//!
//! - [`CatalogReader`]: reads table and column metadata for one schema
//! - [`SourceReader`] / [`RowCursor`]: stream rows out of the old database
//! - [`TargetWriter`] / [`TargetSession`]: write rows into the new database
//!   inside one transaction per table
//!
//! The PostgreSQL implementations live in `drivers::postgres`. Tests use
//! in-memory implementations.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{Catalog, ColumnDescriptor};
use super::value::{Batch, Row};

/// Read schema metadata.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Read every base table of `schema` with its ordered columns and primary key.
    ///
    /// An empty schema yields an empty catalog, not an error.
    async fn read_catalog(&self, schema: &str) -> Result<Catalog>;
}

/// Options for opening a read cursor.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns to read, in the order values appear in each row.
    pub columns: Vec<ColumnDescriptor>,
    /// Number of rows per fetch.
    pub batch_size: usize,
}

/// Read rows from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Open a forward-only cursor over `opts.columns` of one table.
    ///
    /// Rows come back in whatever order the server produces them.
    async fn open_cursor(&self, opts: ReadOptions) -> Result<Box<dyn RowCursor>>;

    /// Get the row count for a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;
}

/// A forward-only stream of row batches.
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch the next batch. An empty batch means the cursor is exhausted.
    async fn next_batch(&mut self) -> Result<Batch>;

    /// Release the cursor and its connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Where and how a batch is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Target columns, in the order values appear in each row.
    pub columns: Vec<String>,
    /// Columns identifying a row. `Some` turns inserts into upserts.
    pub conflict_key: Option<Vec<String>>,
}

/// Write rows to the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Start a transaction on a dedicated connection.
    async fn begin(&self) -> Result<Box<dyn TargetSession>>;

    /// Get the row count for a table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;
}

/// One open transaction on the target.
///
/// Nothing written through a session is visible to others until [`commit`].
/// Dropping a session without committing discards its writes.
///
/// [`commit`]: TargetSession::commit
#[async_trait]
pub trait TargetSession: Send {
    /// Remove every row of a table.
    async fn truncate(&mut self, schema: &str, table: &str) -> Result<()>;

    /// Write a batch of adapted rows. Returns the number of rows affected.
    async fn write_batch(&mut self, target: &WriteTarget, rows: Vec<Row>) -> Result<u64>;

    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Roll back the transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
