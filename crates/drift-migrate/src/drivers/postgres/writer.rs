//! Target writes: one transaction per table, multi-row literal INSERTs.

use async_trait::async_trait;
use deadpool_postgres::Object;
use tracing::debug;

use super::{discard, PgPool};
use crate::core::identifier::{escape_literal, qualify_pg, quote_list, quote_pg};
use crate::core::{Row, SqlValue, TargetSession, TargetWriter, WriteTarget};
use crate::error::{MigrateError, Result};

/// An open target transaction.
///
/// Dropped without `commit` or `rollback`, the connection is detached from
/// the pool and closed, which aborts the transaction server-side.
pub struct PgSession {
    client: Option<Object>,
    pool_name: String,
}

impl PgSession {
    fn client(&self) -> Result<&Object> {
        self.client.as_ref().ok_or_else(|| MigrateError::Pool {
            message: "session already finished".into(),
            context: self.pool_name.clone(),
        })
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        match client.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                discard(client);
                Err(e.into())
            }
        }
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            discard(client);
        }
    }
}

#[async_trait]
impl TargetSession for PgSession {
    async fn truncate(&mut self, schema: &str, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", qualify_pg(schema, table)?);
        self.client()?.batch_execute(&sql).await?;
        debug!("Truncated {}.{}", schema, table);
        Ok(())
    }

    async fn write_batch(&mut self, target: &WriteTarget, rows: Vec<Row>) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = build_insert_sql(target, &rows)?;
        Ok(self.client()?.execute(sql.as_str(), &[]).await?)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

#[async_trait]
impl TargetWriter for PgPool {
    async fn begin(&self) -> Result<Box<dyn TargetSession>> {
        let client = self.get("opening target transaction").await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgSession {
            client: Some(client),
            pool_name: self.name.clone(),
        }))
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.get("counting target rows").await?;
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_pg(schema, table)?);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}

/// Render a value as a SQL literal.
///
/// Text and JSON stay untyped so PostgreSQL coerces them to whatever the
/// target column is (text, varchar, json, jsonb).
pub fn render_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Float(f) if f.is_nan() => "'NaN'::float8".to_string(),
        SqlValue::Float(f) if f.is_infinite() => {
            if *f > 0.0 {
                "'Infinity'::float8".to_string()
            } else {
                "'-Infinity'::float8".to_string()
            }
        }
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Decimal(d) => format!("'{}'::numeric", d),
        SqlValue::Text(s) => format!("'{}'", escape_literal(s)),
        SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
        SqlValue::Uuid(u) => format!("'{}'::uuid", u),
        SqlValue::Timestamp(dt) => {
            format!("'{}'::timestamp", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
        }
        SqlValue::TimestampTz(dt) => format!("'{}'::timestamptz", dt.to_rfc3339()),
        SqlValue::Date(d) => format!("'{}'::date", d),
        SqlValue::Time(t) => format!("'{}'::time", t.format("%H:%M:%S%.6f")),
        SqlValue::Json(v) => format!("'{}'", escape_literal(&v.to_string())),
    }
}

/// Build a multi-row INSERT for `rows`, with an ON CONFLICT clause when the
/// target carries a conflict key.
pub fn build_insert_sql(target: &WriteTarget, rows: &[Row]) -> Result<String> {
    let values = rows
        .iter()
        .map(|row| {
            if row.len() != target.columns.len() {
                return Err(MigrateError::transfer(
                    &target.table,
                    format!(
                        "row has {} values for {} columns",
                        row.len(),
                        target.columns.len()
                    ),
                ));
            }
            let literals: Vec<String> = row.iter().map(render_literal).collect();
            Ok(format!("({})", literals.join(", ")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualify_pg(&target.schema, &target.table)?,
        quote_list(&target.columns)?,
        values.join(", ")
    );

    if let Some(key) = &target.conflict_key {
        let updates = target
            .columns
            .iter()
            .filter(|c| !key.contains(c))
            .map(|c| quote_pg(c).map(|q| format!("{q} = EXCLUDED.{q}")))
            .collect::<Result<Vec<_>>>()?;

        sql.push_str(&format!(" ON CONFLICT ({})", quote_list(key)?));
        if updates.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            sql.push_str(&format!(" DO UPDATE SET {}", updates.join(", ")));
        }
    }

    Ok(sql)
}
