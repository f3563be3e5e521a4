//! Per-table migration plans.
//!
//! A plan says which source columns feed which target columns, which target
//! columns are synthesized, and how rows are written. Identical tables get a
//! generated straight-copy plan; divergent tables need an entry in the
//! configuration file.

mod validation;

pub use validation::{types_reconcilable, PlanValidator};

use crate::config::{ConstantConfig, TablePlanConfig};
use crate::core::{Row, SqlValue, TableSchema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How rows are written to the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Truncate the target table, then insert every row.
    #[default]
    Replace,
    /// Insert, overwriting non-key columns of rows whose key already exists.
    Merge,
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictMode::Replace => write!(f, "replace"),
            ConflictMode::Merge => write!(f, "merge"),
        }
    }
}

/// Where a synthesized column gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
    /// The same value for every row.
    Literal(SqlValue),
    /// Another column of the same source row, or `fallback` when that is NULL.
    Column { column: String, fallback: SqlValue },
}

/// A target column filled without a matching source column.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantBinding {
    pub target: String,
    pub value: BindingValue,
}

impl ConstantBinding {
    /// Resolve the value for one row.
    ///
    /// `row` holds the values of `read_columns`, in that order.
    pub fn resolve(&self, row: &Row, read_columns: &[String]) -> SqlValue {
        match &self.value {
            BindingValue::Literal(v) => v.clone(),
            BindingValue::Column { column, fallback } => read_columns
                .iter()
                .position(|c| c == column)
                .and_then(|idx| row.get(idx))
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| fallback.clone()),
        }
    }
}

/// Migration plan for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// Table name, the same on both sides.
    pub table: String,

    /// Source columns, paired by position with `target_columns`.
    pub source_columns: Vec<String>,

    /// Target columns receiving the copied values.
    pub target_columns: Vec<String>,

    /// Synthesized target columns.
    pub constants: Vec<ConstantBinding>,

    /// Columns identifying a row for merge.
    pub conflict_key: Vec<String>,

    /// Write mode.
    pub mode: ConflictMode,
}

impl MigrationPlan {
    /// Straight copy of every column, replacing the target contents.
    pub fn generated(schema: &TableSchema) -> Self {
        let columns = schema.column_names();
        Self {
            table: schema.name.clone(),
            source_columns: columns.clone(),
            target_columns: columns,
            constants: Vec::new(),
            conflict_key: schema.primary_key.clone(),
            mode: ConflictMode::Replace,
        }
    }

    /// Build a plan from a configuration entry.
    ///
    /// Entries without a column mapping produce a generated plan. Authored
    /// plans default to merge. Either way the conflict key defaults to the
    /// target primary key.
    pub fn from_config(
        entry: &TablePlanConfig,
        source: &TableSchema,
        target: &TableSchema,
    ) -> Self {
        if !entry.is_authored() {
            let mut plan = Self::generated(source);
            if let Some(mode) = entry.mode {
                plan.mode = mode;
            }
            plan.conflict_key = if entry.conflict_key.is_empty() {
                target.primary_key.clone()
            } else {
                entry.conflict_key.clone()
            };
            return plan;
        }

        let constants = entry
            .constants
            .iter()
            .map(|(target_column, constant)| ConstantBinding {
                target: target_column.clone(),
                value: match constant {
                    ConstantConfig::Value { value } => {
                        BindingValue::Literal(SqlValue::from_literal(value))
                    }
                    ConstantConfig::Column { column, fallback } => BindingValue::Column {
                        column: column.clone(),
                        fallback: fallback
                            .as_ref()
                            .map(SqlValue::from_literal)
                            .unwrap_or(SqlValue::Null),
                    },
                },
            })
            .collect();

        let conflict_key = if entry.conflict_key.is_empty() {
            target.primary_key.clone()
        } else {
            entry.conflict_key.clone()
        };

        Self {
            table: entry.table.clone(),
            source_columns: entry.columns.iter().map(|c| c.source().to_string()).collect(),
            target_columns: entry.columns.iter().map(|c| c.target().to_string()).collect(),
            constants,
            conflict_key,
            mode: entry.mode.unwrap_or(ConflictMode::Merge),
        }
    }

    /// Source columns the cursor must read: the copied columns followed by any
    /// other column a binding refers to.
    pub fn read_columns(&self) -> Vec<String> {
        let mut columns = self.source_columns.clone();
        for binding in &self.constants {
            if let BindingValue::Column { column, .. } = &binding.value {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    /// Target columns written: the copied columns followed by the bindings.
    pub fn write_columns(&self) -> Vec<String> {
        self.target_columns
            .iter()
            .cloned()
            .chain(self.constants.iter().map(|b| b.target.clone()))
            .collect()
    }

    /// Conflict key handed to the writer, `None` in replace mode.
    pub fn upsert_key(&self) -> Option<Vec<String>> {
        match self.mode {
            ConflictMode::Merge => Some(self.conflict_key.clone()),
            ConflictMode::Replace => None,
        }
    }

    /// Turn a row of `read_columns` values into a row of `write_columns` values.
    pub fn project(&self, row: Row, read_columns: &[String]) -> Row {
        let mut out: Row = Vec::with_capacity(self.target_columns.len() + self.constants.len());
        for value in row.iter().take(self.source_columns.len()) {
            out.push(value.clone());
        }
        for binding in &self.constants {
            out.push(binding.resolve(&row, read_columns));
        }
        out
    }

    /// One-line summary for logs and dry runs.
    pub fn describe(&self) -> String {
        let mut text = format!(
            "{} {} column(s)",
            self.mode,
            self.target_columns.len() + self.constants.len()
        );
        if !self.constants.is_empty() {
            let names: Vec<&str> = self.constants.iter().map(|b| b.target.as_str()).collect();
            text.push_str(&format!(", synthesized: {}", names.join(", ")));
        }
        if self.mode == ConflictMode::Merge {
            text.push_str(&format!(", key: ({})", self.conflict_key.join(", ")));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnPairConfig;
    use crate::core::ColumnDescriptor;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn col(name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            ordinal_position: 0,
        }
    }

    fn member_schemas() -> (TableSchema, TableSchema) {
        let source = TableSchema {
            schema: "public".into(),
            name: "channel_member".into(),
            columns: vec![
                col("id", "text"),
                col("channel_id", "text"),
                col("user_id", "text"),
                col("created_at", "bigint"),
            ],
            primary_key: vec!["id".into()],
        };
        let mut target = source.clone();
        target.columns.push(col("joined_at", "bigint"));
        target.columns.push(col("is_active", "boolean"));
        (source, target)
    }

    fn member_entry() -> TablePlanConfig {
        let mut constants = BTreeMap::new();
        constants.insert(
            "joined_at".to_string(),
            ConstantConfig::Column {
                column: "created_at".into(),
                fallback: Some(json!(0)),
            },
        );
        constants.insert(
            "is_active".to_string(),
            ConstantConfig::Value { value: json!(true) },
        );
        TablePlanConfig {
            table: "channel_member".into(),
            mode: None,
            columns: vec![
                ColumnPairConfig::Same("id".into()),
                ColumnPairConfig::Same("channel_id".into()),
                ColumnPairConfig::Same("user_id".into()),
            ],
            constants,
            conflict_key: Vec::new(),
        }
    }

    #[test]
    fn test_generated_plan() {
        let (source, _) = member_schemas();
        let plan = MigrationPlan::generated(&source);
        assert_eq!(plan.source_columns, plan.target_columns);
        assert_eq!(plan.source_columns.len(), 4);
        assert_eq!(plan.mode, ConflictMode::Replace);
        assert_eq!(plan.conflict_key, vec!["id"]);
        assert!(plan.upsert_key().is_none());
    }

    #[test]
    fn test_plain_entry_overrides_mode() {
        let (source, target) = member_schemas();
        let entry: TablePlanConfig = serde_yaml::from_str("table: file\nmode: merge\n").unwrap();
        let plan = MigrationPlan::from_config(&entry, &source, &target);
        assert_eq!(plan.mode, ConflictMode::Merge);
        assert_eq!(plan.upsert_key(), Some(vec!["id".to_string()]));
    }

    #[test]
    fn test_plain_entry_keys_on_target_primary_key() {
        let (mut source, mut target) = member_schemas();
        source.primary_key.clear();
        target.primary_key = vec!["id".into()];
        let entry: TablePlanConfig = serde_yaml::from_str("table: file\nmode: merge\n").unwrap();

        let plan = MigrationPlan::from_config(&entry, &source, &target);
        assert_eq!(plan.upsert_key(), Some(vec!["id".to_string()]));

        target.primary_key.clear();
        let plan = MigrationPlan::from_config(&entry, &source, &target);
        assert!(plan.conflict_key.is_empty());
    }

    #[test]
    fn test_authored_plan_defaults_to_merge() {
        let (source, target) = member_schemas();
        let plan = MigrationPlan::from_config(&member_entry(), &source, &target);
        assert_eq!(plan.mode, ConflictMode::Merge);
        assert_eq!(plan.conflict_key, vec!["id"]);
        assert_eq!(
            plan.write_columns(),
            vec!["id", "channel_id", "user_id", "is_active", "joined_at"]
        );
        assert_eq!(
            plan.read_columns(),
            vec!["id", "channel_id", "user_id", "created_at"]
        );
    }

    #[test]
    fn test_project_applies_bindings() {
        let (source, target) = member_schemas();
        let plan = MigrationPlan::from_config(&member_entry(), &source, &target);
        let read = plan.read_columns();

        let row = vec![
            SqlValue::Text("m1".into()),
            SqlValue::Text("c1".into()),
            SqlValue::Text("u1".into()),
            SqlValue::Int(1_700_000_000),
        ];
        let out = plan.project(row, &read);
        assert_eq!(out.len(), 5);
        assert_eq!(out[3], SqlValue::Bool(true));
        assert_eq!(out[4], SqlValue::Int(1_700_000_000));

        let row = vec![
            SqlValue::Text("m2".into()),
            SqlValue::Text("c1".into()),
            SqlValue::Text("u2".into()),
            SqlValue::Null,
        ];
        let out = plan.project(row, &read);
        assert_eq!(out[4], SqlValue::Int(0));
    }

    #[test]
    fn test_describe() {
        let (source, target) = member_schemas();
        let plan = MigrationPlan::from_config(&member_entry(), &source, &target);
        assert_eq!(
            plan.describe(),
            "merge 5 column(s), synthesized: is_active, joined_at, key: (id)"
        );
    }
}
