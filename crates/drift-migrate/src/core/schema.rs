//! Schema metadata read from the live catalogs.
//!
//! Types mirror what `information_schema.columns` reports. Declared types are
//! kept as the catalog spells them (`character varying`, `jsonb`, ...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One column of a table, as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Declared type (`information_schema.columns.data_type`, or `udt_name`
    /// for arrays and user-defined types).
    pub data_type: String,

    /// Whether NULL is allowed.
    pub is_nullable: bool,

    /// Default expression, if any.
    pub default: Option<String>,

    /// 1-based position in the table.
    pub ordinal_position: i32,
}

impl ColumnDescriptor {
    /// Name, type, nullability and default all match.
    ///
    /// Ordinal positions are not compared; dropped columns leave gaps in them.
    pub fn same_shape(&self, other: &ColumnDescriptor) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.is_nullable == other.is_nullable
            && self.default == other.default
    }

    /// Storage kind of the column, used when adapting values into it.
    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_data_type(&self.data_type)
    }
}

/// Coarse classification of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    /// `json` or `jsonb`.
    Structured,
    /// `text`, `character varying`, `character`.
    Text,
    /// Everything else.
    Other,
}

impl ColumnKind {
    pub fn from_data_type(data_type: &str) -> Self {
        match normalize_type(data_type).as_str() {
            "json" | "jsonb" => ColumnKind::Structured,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "name" | "citext" => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }
}

/// Lowercase a declared type and strip any length or precision modifier.
pub fn normalize_type(data_type: &str) -> String {
    let lower = data_type.trim().to_lowercase();
    match lower.find('(') {
        Some(idx) => lower[..idx].trim_end().to_string(),
        None => lower,
    }
}

/// A table and its ordered columns.
///
/// Two schemas are equal when their column sequences have the same length and
/// every pair of columns at the same position has the same shape. The table
/// name, schema and primary key do not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns ordered by ordinal position.
    pub columns: Vec<ColumnDescriptor>,

    /// Primary key column names, in key order. Empty when there is none.
    pub primary_key: Vec<String>,
}

impl PartialEq for TableSchema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.same_shape(b))
    }
}

impl TableSchema {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// All base tables of one schema, keyed and ordered by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema the catalog was read from.
    pub schema: String,

    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, table: TableSchema) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableSchema> for Catalog {
    fn from_iter<I: IntoIterator<Item = TableSchema>>(iter: I) -> Self {
        let mut catalog = Catalog::default();
        for table in iter {
            if catalog.schema.is_empty() {
                catalog.schema = table.schema.clone();
            }
            catalog.insert(table);
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str, pos: i32) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            ordinal_position: pos,
        }
    }

    fn table(name: &str, columns: Vec<ColumnDescriptor>) -> TableSchema {
        TableSchema {
            schema: "public".into(),
            name: name.into(),
            columns,
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn test_column_kind() {
        assert_eq!(ColumnKind::from_data_type("jsonb"), ColumnKind::Structured);
        assert_eq!(ColumnKind::from_data_type("JSON"), ColumnKind::Structured);
        assert_eq!(
            ColumnKind::from_data_type("character varying(255)"),
            ColumnKind::Text
        );
        assert_eq!(ColumnKind::from_data_type("bigint"), ColumnKind::Other);
    }

    #[test]
    fn test_equality_ignores_primary_key() {
        let a = table("user", vec![col("id", "text", 1), col("name", "text", 2)]);
        let mut b = a.clone();
        b.primary_key.clear();
        b.name = "other".into();
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let a = table("user", vec![col("id", "text", 1), col("name", "text", 2)]);
        let b = table("user", vec![col("name", "text", 1), col("id", "text", 2)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ordinal_gaps_do_not_break_equality() {
        let a = table("chat", vec![col("id", "text", 1), col("title", "text", 2)]);
        let b = table("chat", vec![col("id", "text", 1), col("title", "text", 4)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nullability_difference_breaks_equality() {
        let a = table("chat", vec![col("id", "text", 1)]);
        let mut b = a.clone();
        b.columns[0].is_nullable = false;
        assert_ne!(a, b);
    }

    #[test]
    fn test_catalog_orders_by_name() {
        let catalog: Catalog = vec![
            table("user", vec![col("id", "text", 1)]),
            table("chat", vec![col("id", "text", 1)]),
        ]
        .into_iter()
        .collect();
        let names: Vec<_> = catalog.table_names().collect();
        assert_eq!(names, vec!["chat", "user"]);
        assert_eq!(catalog.schema, "public");
        assert!(catalog.contains("user"));
        assert!(catalog.get("missing").is_none());
    }
}
