//! Catalog introspection through `information_schema` and `pg_catalog`.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use super::PgPool;
use crate::core::{Catalog, CatalogReader, ColumnDescriptor, TableSchema};
use crate::error::{MigrateError, Result};

// information_schema columns are domain types; cast so they decode as plain text.
// data_type collapses arrays and user-defined types into ARRAY / USER-DEFINED;
// report udt_name for those instead (`_text`, `mood`).
const COLUMNS_QUERY: &str = r#"
    SELECT
        c.table_name::text,
        c.column_name::text,
        CASE
            WHEN c.data_type IN ('ARRAY', 'USER-DEFINED') THEN c.udt_name::text
            ELSE c.data_type::text
        END,
        c.is_nullable::text = 'YES',
        c.column_default::text,
        c.ordinal_position::int4
    FROM information_schema.columns c
    JOIN information_schema.tables t
      ON t.table_schema = c.table_schema
     AND t.table_name = c.table_name
    WHERE c.table_schema = $1
      AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

const PRIMARY_KEYS_QUERY: &str = r#"
    SELECT t.relname::text, a.attname::text
    FROM pg_catalog.pg_constraint c
    JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
    WHERE n.nspname = $1
      AND c.contype = 'p'
    ORDER BY t.relname, array_position(c.conkey, a.attnum)
"#;

#[async_trait]
impl CatalogReader for PgPool {
    async fn read_catalog(&self, schema: &str) -> Result<Catalog> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(&self.name, e))?;

        let column_rows = client
            .query(COLUMNS_QUERY, &[&schema])
            .await
            .map_err(|e| MigrateError::catalog(schema, e))?;
        let pk_rows = client
            .query(PRIMARY_KEYS_QUERY, &[&schema])
            .await
            .map_err(|e| MigrateError::catalog(schema, e))?;

        let mut primary_keys: HashMap<String, Vec<String>> = HashMap::new();
        for row in pk_rows {
            let table: String = row.try_get(0).map_err(|e| MigrateError::catalog(schema, e))?;
            let column: String = row.try_get(1).map_err(|e| MigrateError::catalog(schema, e))?;
            primary_keys.entry(table).or_default().push(column);
        }

        let mut tables: Vec<TableSchema> = Vec::new();
        for row in column_rows {
            let decode = |e: tokio_postgres::Error| MigrateError::catalog(schema, e);
            let table: String = row.try_get(0).map_err(decode)?;
            let column = ColumnDescriptor {
                name: row.try_get(1).map_err(decode)?,
                data_type: row.try_get(2).map_err(decode)?,
                is_nullable: row.try_get(3).map_err(decode)?,
                default: row.try_get(4).map_err(decode)?,
                ordinal_position: row.try_get(5).map_err(decode)?,
            };

            // Rows arrive grouped by table.
            match tables.last_mut() {
                Some(current) if current.name == table => current.columns.push(column),
                _ => tables.push(TableSchema {
                    schema: schema.to_string(),
                    primary_key: primary_keys.remove(&table).unwrap_or_default(),
                    name: table,
                    columns: vec![column],
                }),
            }
        }

        let mut catalog = Catalog::new(schema);
        for table in tables {
            debug!(
                "{}: {} columns, primary key {:?}",
                table.full_name(),
                table.columns.len(),
                table.primary_key
            );
            catalog.insert(table);
        }

        debug!("Read {} tables from {} on {}", catalog.len(), schema, self.name);
        Ok(catalog)
    }
}
