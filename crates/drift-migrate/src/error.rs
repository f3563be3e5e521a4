//! Error types for the migration library.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code when a database cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code when catalog introspection fails.
pub const EXIT_CATALOG_ERROR: u8 = 3;
/// Process exit code for an invalid migration plan.
pub const EXIT_PLAN_ERROR: u8 = 4;
/// Process exit code when one or more tables failed to transfer.
pub const EXIT_TRANSFER_ERROR: u8 = 5;
/// Process exit code when the run was cancelled.
pub const EXIT_CANCELLED: u8 = 6;
/// Process exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
///
/// Connection and catalog errors are fatal to a run. Plan validation and
/// transfer errors are scoped to a single table and recorded in its report.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database unreachable.
    #[error("Cannot connect to {database}: {message}")]
    Connection { database: String, message: String },

    /// Metadata introspection query failed.
    #[error("Catalog read failed for schema {schema}: {message}")]
    CatalogRead { schema: String, message: String },

    /// Authored plan does not fit the live schemas.
    #[error("Invalid plan for table {table}: {message}")]
    PlanValidation { table: String, message: String },

    /// Truncate, insert or commit failed for a specific table.
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// A value could not be converted for its target column.
    #[error("Cannot adapt value for column {column}: {message}")]
    Adapt { column: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error
    pub fn connection(database: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            database: database.into(),
            message: message.to_string(),
        }
    }

    /// Create a CatalogRead error
    pub fn catalog(schema: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::CatalogRead {
            schema: schema.into(),
            message: message.to_string(),
        }
    }

    /// Create a PlanValidation error
    pub fn plan(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::PlanValidation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error ends the whole run rather than a single table.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MigrateError::PlanValidation { .. }
                | MigrateError::Transfer { .. }
                | MigrateError::Adapt { .. }
                | MigrateError::Database(_)
        )
    }

    /// Map the error to a process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::CatalogRead { .. } => EXIT_CATALOG_ERROR,
            MigrateError::PlanValidation { .. } => EXIT_PLAN_ERROR,
            MigrateError::Transfer { .. }
            | MigrateError::Adapt { .. }
            | MigrateError::Database(_) => EXIT_TRANSFER_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
