//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: table and column metadata read from the catalogs
//! - [`value`]: row values as they travel from source to target
//! - [`traits`]: the catalog, reader and writer seams
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{Catalog, ColumnDescriptor, ColumnKind, TableSchema};
pub use traits::{
    CatalogReader, ReadOptions, RowCursor, SourceReader, TargetSession, TargetWriter, WriteTarget,
};
pub use value::{Batch, Row, SqlValue};
