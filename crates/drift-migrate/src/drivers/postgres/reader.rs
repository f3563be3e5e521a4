//! Source reads through server-side cursors.
//!
//! A cursor lives inside a read-only transaction on a dedicated pooled
//! connection, so the whole table is read from one snapshot and only one
//! batch is held in memory at a time.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use deadpool_postgres::Object;
use rust_decimal::Decimal;
use tokio_postgres::Statement;
use tracing::debug;

use super::{discard, PgPool};
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::schema::normalize_type;
use crate::core::{Batch, ColumnDescriptor, ReadOptions, Row, RowCursor, SourceReader, SqlValue};
use crate::error::{MigrateError, Result};

static CURSOR_SEQ: AtomicU64 = AtomicU64::new(0);

/// How a column is selected and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decode {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Json,
    /// Anything else is read back as text.
    Cast,
}

impl Decode {
    fn for_type(data_type: &str) -> Self {
        match normalize_type(data_type).as_str() {
            "boolean" | "bool" => Decode::Bool,
            "smallint" | "int2" => Decode::Int2,
            "integer" | "int" | "int4" => Decode::Int4,
            "bigint" | "int8" => Decode::Int8,
            "real" | "float4" => Decode::Float4,
            "double precision" | "float8" => Decode::Float8,
            "numeric" | "decimal" => Decode::Numeric,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar" | "name" => {
                Decode::Text
            }
            "bytea" => Decode::Bytes,
            "uuid" => Decode::Uuid,
            "timestamp without time zone" | "timestamp" => Decode::Timestamp,
            "timestamp with time zone" | "timestamptz" => Decode::TimestampTz,
            "date" => Decode::Date,
            "time without time zone" | "time" => Decode::Time,
            "json" | "jsonb" => Decode::Json,
            _ => Decode::Cast,
        }
    }

    /// Select-list expression for a column.
    fn select_expr(&self, column: &str) -> Result<String> {
        let quoted = quote_pg(column)?;
        Ok(match self {
            // numeric can exceed rust_decimal's range; parse from text instead.
            Decode::Numeric | Decode::Cast => format!("{}::text", quoted),
            _ => quoted,
        })
    }
}

/// Build the cursor query. No ORDER BY: rows come in storage order.
fn build_select(opts: &ReadOptions) -> Result<String> {
    let columns = opts
        .columns
        .iter()
        .map(|c| Decode::for_type(&c.data_type).select_expr(&c.name))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "SELECT {} FROM {}",
        columns.join(", "),
        qualify_pg(&opts.schema, &opts.table)?
    ))
}

fn decode_row(
    row: &tokio_postgres::Row,
    decoders: &[Decode],
) -> std::result::Result<Row, tokio_postgres::Error> {
    decoders
        .iter()
        .enumerate()
        .map(|(idx, decoder)| decode_value(row, idx, *decoder))
        .collect()
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    decoder: Decode,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    Ok(match decoder {
        Decode::Bool => row.try_get::<_, Option<bool>>(idx)?.into(),
        Decode::Int2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| v as i64).into(),
        Decode::Int4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| v as i64).into(),
        Decode::Int8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Decode::Float4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| v as f64).into(),
        Decode::Float8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Decode::Numeric => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(SqlValue::Null, parse_numeric),
        Decode::Text | Decode::Cast => row.try_get::<_, Option<String>>(idx)?.into(),
        Decode::Bytes => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bytes),
        Decode::Uuid => row.try_get::<_, Option<uuid::Uuid>>(idx)?.into(),
        Decode::Timestamp => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Timestamp),
        Decode::TimestampTz => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::TimestampTz),
        Decode::Date => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Date),
        Decode::Time => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Time),
        Decode::Json => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Json),
    })
}

/// Keep a numeric as `Decimal` only when it converts exactly.
///
/// rust_decimal rounds past 28 significant digits without failing, and has no
/// NaN or infinities; those values stay as the server's text and are written
/// back as an untyped literal.
fn parse_numeric(text: String) -> SqlValue {
    match Decimal::from_str(&text) {
        Ok(d) if d.to_string() == text => SqlValue::Decimal(d),
        _ => SqlValue::Text(text),
    }
}

/// Open cursor over one table.
pub struct PgCursor {
    client: Option<Object>,
    name: String,
    table: String,
    fetch: Statement,
    decoders: Vec<Decode>,
    exhausted: bool,
}

impl PgCursor {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::transfer(&self.table, "cursor already closed"))
    }
}

#[async_trait]
impl RowCursor for PgCursor {
    async fn next_batch(&mut self) -> Result<Batch> {
        if self.exhausted {
            return Ok(Batch::default());
        }

        let rows = self.client()?.query(&self.fetch, &[]).await?;
        if rows.is_empty() {
            self.exhausted = true;
        }

        let rows = rows
            .iter()
            .map(|row| decode_row(row, &self.decoders))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("{}: fetched {} rows", self.table, rows.len());
        Ok(Batch::new(rows))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        let sql = format!("CLOSE {}; COMMIT", self.name);
        match client.batch_execute(&sql).await {
            Ok(()) => Ok(()),
            Err(e) => {
                discard(client);
                Err(e.into())
            }
        }
    }
}

impl Drop for PgCursor {
    fn drop(&mut self) {
        // Still inside the read transaction: keep it out of the pool.
        if let Some(client) = self.client.take() {
            discard(client);
        }
    }
}

#[async_trait]
impl SourceReader for PgPool {
    async fn open_cursor(&self, opts: ReadOptions) -> Result<Box<dyn RowCursor>> {
        let select = build_select(&opts)?;
        let name = format!("drift_cursor_{}", CURSOR_SEQ.fetch_add(1, Ordering::Relaxed));
        let client = self.get("opening source cursor").await?;

        let setup = format!(
            "BEGIN READ ONLY; DECLARE {} NO SCROLL CURSOR FOR {}",
            name, select
        );
        if let Err(e) = client.batch_execute(&setup).await {
            discard(client);
            return Err(e.into());
        }

        let fetch = match client
            .prepare(&format!("FETCH FORWARD {} FROM {}", opts.batch_size.max(1), name))
            .await
        {
            Ok(statement) => statement,
            Err(e) => {
                discard(client);
                return Err(e.into());
            }
        };

        debug!("{}: opened cursor {} ({})", opts.table, name, select);

        Ok(Box::new(PgCursor {
            client: Some(client),
            name,
            table: opts.table,
            fetch,
            decoders: opts
                .columns
                .iter()
                .map(|c: &ColumnDescriptor| Decode::for_type(&c.data_type))
                .collect(),
            exhausted: false,
        }))
    }

    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.get("counting source rows").await?;
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_pg(schema, table)?);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}
