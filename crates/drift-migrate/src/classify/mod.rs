//! Compatibility classification of two catalogs.
//!
//! Tables present on both sides are either *identical* (equal column
//! sequences, eligible for a generated straight copy) or *divergent* (need an
//! authored plan). Tables present on one side only are reported and never
//! migrated.

use crate::core::{Catalog, ColumnDescriptor, TableSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Result of comparing the source catalog against the target catalog.
///
/// Every table name appears in exactly one of the four groups. Each group is
/// sorted by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub identical: Vec<String>,
    pub divergent: BTreeMap<String, SchemaDiff>,
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
}

impl Classification {
    pub fn is_identical(&self, table: &str) -> bool {
        self.identical.binary_search_by(|t| t.as_str().cmp(table)).is_ok()
    }

    pub fn diff(&self, table: &str) -> Option<&SchemaDiff> {
        self.divergent.get(table)
    }

    /// Number of tables present on both sides.
    pub fn common_count(&self) -> usize {
        self.identical.len() + self.divergent.len()
    }
}

/// Column-level differences of one divergent table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Columns only the source has, in source order.
    pub only_in_source: Vec<String>,

    /// Columns only the target has, in target order.
    pub only_in_target: Vec<String>,

    /// Columns on both sides whose definition differs.
    pub changed: Vec<ColumnChange>,

    /// Common columns that sit at a different relative position.
    pub reordered: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_source.is_empty()
            && self.only_in_target.is_empty()
            && self.changed.is_empty()
            && self.reordered.is_empty()
    }

    /// One-line description for logs, e.g. `-[a] +[b] ~[c]`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.only_in_source.is_empty() {
            parts.push(format!("-[{}]", self.only_in_source.join(", ")));
        }
        if !self.only_in_target.is_empty() {
            parts.push(format!("+[{}]", self.only_in_target.join(", ")));
        }
        if !self.changed.is_empty() {
            let names: Vec<&str> = self.changed.iter().map(|c| c.column.as_str()).collect();
            parts.push(format!("~[{}]", names.join(", ")));
        }
        if !self.reordered.is_empty() {
            parts.push(format!("reordered[{}]", self.reordered.join(", ")));
        }
        parts.join(" ")
    }
}

/// How one common column differs. Each field is `Some((source, target))`
/// when that attribute differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<(bool, bool)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<(Option<String>, Option<String>)>,
}

/// Partition the tables of two catalogs.
pub fn classify(source: &Catalog, target: &Catalog) -> Classification {
    let mut result = Classification::default();

    // Both catalogs iterate in name order, so every group comes out sorted.
    for table in source.tables() {
        match target.get(&table.name) {
            Some(other) if table == other => result.identical.push(table.name.clone()),
            Some(other) => {
                result
                    .divergent
                    .insert(table.name.clone(), diff_tables(table, other));
            }
            None => result.only_in_source.push(table.name.clone()),
        }
    }

    result.only_in_target = target
        .table_names()
        .filter(|name| !source.contains(name))
        .map(str::to_string)
        .collect();

    result
}

/// Column-level comparison of two versions of a table.
pub fn diff_tables(source: &TableSchema, target: &TableSchema) -> SchemaDiff {
    let source_names: HashSet<&str> = source.columns.iter().map(|c| c.name.as_str()).collect();
    let target_names: HashSet<&str> = target.columns.iter().map(|c| c.name.as_str()).collect();

    let only_in_source = source
        .columns
        .iter()
        .filter(|c| !target_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();

    let only_in_target = target
        .columns
        .iter()
        .filter(|c| !source_names.contains(c.name.as_str()))
        .map(|c| c.name.clone())
        .collect();

    let changed = source
        .columns
        .iter()
        .filter_map(|s| target.column(&s.name).and_then(|t| column_change(s, t)))
        .collect();

    let common_source: Vec<&str> = source
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|n| target_names.contains(n))
        .collect();
    let common_target: Vec<&str> = target
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|n| source_names.contains(n))
        .collect();
    let reordered = common_source
        .iter()
        .zip(&common_target)
        .filter(|(s, t)| s != t)
        .map(|(s, _)| s.to_string())
        .collect();

    SchemaDiff {
        only_in_source,
        only_in_target,
        changed,
        reordered,
    }
}

fn column_change(source: &ColumnDescriptor, target: &ColumnDescriptor) -> Option<ColumnChange> {
    if source.same_shape(target) {
        return None;
    }

    let data_type = (source.data_type != target.data_type)
        .then(|| (source.data_type.clone(), target.data_type.clone()));
    let nullable = (source.is_nullable != target.is_nullable)
        .then_some((source.is_nullable, target.is_nullable));
    let default = (source.default != target.default)
        .then(|| (source.default.clone(), target.default.clone()));

    Some(ColumnChange {
        column: source.name.clone(),
        data_type,
        nullable,
        default,
    })
}
