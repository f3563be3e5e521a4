//! Configuration type definitions.

use crate::plan::ConflictMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Old database, rows are read from here.
    pub source: DatabaseConfig,

    /// New database, rows are written here.
    pub target: DatabaseConfig,

    /// Migration behavior and the per-table run order.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Connection parameters for one PostgreSQL database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. May be overridden from the environment.
    #[serde(default)]
    pub password: String,

    /// Schema holding the application tables (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched and written per batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Append every identical table not listed in `tables` to the run order.
    #[serde(default)]
    pub include_identical: bool,

    /// Tables never migrated, even when identical.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Connect timeout for both databases, in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum pooled connections per database (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Tables to migrate, in run order.
    #[serde(default)]
    pub tables: Vec<TablePlanConfig>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_identical: false,
            exclude_tables: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
            max_connections: default_max_connections(),
            tables: Vec::new(),
        }
    }
}

/// One entry of the run order.
///
/// An entry with neither `columns` nor `constants` asks for a straight copy of
/// an identical table. Anything else is an authored plan for a divergent table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePlanConfig {
    /// Table name, the same on both sides.
    pub table: String,

    /// Write mode. Straight copies default to replace, authored plans to merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConflictMode>,

    /// Copied columns, either a shared name or a `{source, target}` pair.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnPairConfig>,

    /// Target columns filled from a constant or another source column.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constants: BTreeMap<String, ConstantConfig>,

    /// Columns identifying a row for merge. Defaults to the target primary key.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_key: Vec<String>,
}

impl TablePlanConfig {
    /// Entry copying `table` as-is, with default mode and key.
    pub fn straight_copy(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mode: None,
            columns: Vec::new(),
            constants: BTreeMap::new(),
            conflict_key: Vec::new(),
        }
    }

    /// Whether this entry carries an authored column mapping.
    pub fn is_authored(&self) -> bool {
        !self.columns.is_empty() || !self.constants.is_empty()
    }
}

/// A copied column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnPairConfig {
    /// Same name on both sides.
    Same(String),
    /// Renamed column.
    Renamed { source: String, target: String },
}

impl ColumnPairConfig {
    pub fn source(&self) -> &str {
        match self {
            ColumnPairConfig::Same(name) => name,
            ColumnPairConfig::Renamed { source, .. } => source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ColumnPairConfig::Same(name) => name,
            ColumnPairConfig::Renamed { target, .. } => target,
        }
    }
}

/// Value for a synthesized target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantConfig {
    /// Copy another column of the same source row, using `fallback` when it is NULL.
    Column {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<serde_json::Value>,
    },
    /// A fixed value for every row.
    Value { value: serde_json::Value },
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_pair_forms() {
        let cols: Vec<ColumnPairConfig> =
            serde_yaml::from_str("- id\n- { source: name, target: display_name }\n").unwrap();
        assert_eq!(cols[0].source(), "id");
        assert_eq!(cols[0].target(), "id");
        assert_eq!(cols[1].source(), "name");
        assert_eq!(cols[1].target(), "display_name");
    }

    #[test]
    fn test_constant_forms() {
        let yaml = "joined_at: { column: created_at, fallback: 0 }\nis_active: { value: true }\n";
        let constants: BTreeMap<String, ConstantConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            constants["joined_at"],
            ConstantConfig::Column {
                column: "created_at".into(),
                fallback: Some(serde_json::json!(0)),
            }
        );
        assert_eq!(
            constants["is_active"],
            ConstantConfig::Value {
                value: serde_json::json!(true)
            }
        );
    }

    #[test]
    fn test_plain_entry_is_not_authored() {
        let entry: TablePlanConfig = serde_yaml::from_str("table: file\nmode: merge\n").unwrap();
        assert!(!entry.is_authored());
        assert_eq!(entry.mode, Some(ConflictMode::Merge));
    }
}
