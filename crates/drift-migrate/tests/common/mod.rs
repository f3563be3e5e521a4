//! In-memory PostgreSQL stand-in for integration tests.
//!
//! One `MemoryDb` plays either side of a migration. Target sessions stage
//! their changes and only publish them on commit, so rollback behaves like a
//! real transaction.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drift_migrate::config::{Config, DatabaseConfig, MigrationConfig};
use drift_migrate::core::{
    Batch, Catalog, CatalogReader, ColumnDescriptor, ReadOptions, Row, RowCursor, SourceReader,
    SqlValue, TableSchema, TargetSession, TargetWriter, WriteTarget,
};
use drift_migrate::{MigrateError, Result};

#[derive(Default)]
struct Inner {
    catalog: Catalog,
    data: Mutex<BTreeMap<String, Vec<Row>>>,
    cursors_opened: AtomicUsize,
    truncate_blocked: Mutex<HashSet<String>>,
    /// (table, 1-based batch number) whose write fails.
    fail_write: Mutex<Option<(String, usize)>>,
}

#[derive(Clone, Default)]
pub struct MemoryDb {
    inner: Arc<Inner>,
}

impl MemoryDb {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        let data = tables.iter().map(|t| (t.name.clone(), Vec::new())).collect();
        Self {
            inner: Arc::new(Inner {
                catalog: tables.into_iter().collect(),
                data: Mutex::new(data),
                ..Default::default()
            }),
        }
    }

    /// Insert full rows, in table column order.
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.inner
            .data
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner
            .data
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Value of `column` in every row, in storage order.
    pub fn column(&self, table: &str, column: &str) -> Vec<SqlValue> {
        let idx = self.position(table, column);
        self.rows(table).into_iter().map(|r| r[idx].clone()).collect()
    }

    pub fn cursors_opened(&self) -> usize {
        self.inner.cursors_opened.load(Ordering::SeqCst)
    }

    /// Make TRUNCATE fail, like a table referenced by a foreign key.
    pub fn block_truncate(&self, table: &str) {
        self.inner
            .truncate_blocked
            .lock()
            .unwrap()
            .insert(table.to_string());
    }

    pub fn fail_write(&self, table: &str, batch: usize) {
        *self.inner.fail_write.lock().unwrap() = Some((table.to_string(), batch));
    }

    fn schema(&self, table: &str) -> &TableSchema {
        self.inner.catalog.get(table).expect("unknown table")
    }

    fn position(&self, table: &str, column: &str) -> usize {
        self.schema(table)
            .columns
            .iter()
            .position(|c| c.name == column)
            .expect("unknown column")
    }
}

#[async_trait]
impl CatalogReader for MemoryDb {
    async fn read_catalog(&self, _schema: &str) -> Result<Catalog> {
        Ok(self.inner.catalog.clone())
    }
}

struct MemoryCursor {
    batches: VecDeque<Vec<Row>>,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn next_batch(&mut self) -> Result<Batch> {
        Ok(Batch::new(self.batches.pop_front().unwrap_or_default()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MemoryDb {
    async fn open_cursor(&self, opts: ReadOptions) -> Result<Box<dyn RowCursor>> {
        self.inner.cursors_opened.fetch_add(1, Ordering::SeqCst);
        let positions: Vec<usize> = opts
            .columns
            .iter()
            .map(|c| self.position(&opts.table, &c.name))
            .collect();
        let rows: Vec<Row> = self
            .rows(&opts.table)
            .into_iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();
        let batches = rows
            .chunks(opts.batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        Ok(Box::new(MemoryCursor { batches }))
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }
}

struct MemorySession {
    db: MemoryDb,
    staged: BTreeMap<String, Vec<Row>>,
    batches: BTreeMap<String, usize>,
}

impl MemorySession {
    fn staged(&mut self, table: &str) -> &mut Vec<Row> {
        let db = self.db.clone();
        self.staged
            .entry(table.to_string())
            .or_insert_with(|| db.rows(table))
    }
}

#[async_trait]
impl TargetSession for MemorySession {
    async fn truncate(&mut self, _schema: &str, table: &str) -> Result<()> {
        if self.db.inner.truncate_blocked.lock().unwrap().contains(table) {
            return Err(MigrateError::transfer(
                table,
                format!(
                    "cannot truncate a table referenced in a foreign key constraint: \"{}\"",
                    table
                ),
            ));
        }
        self.staged.insert(table.to_string(), Vec::new());
        Ok(())
    }

    async fn write_batch(&mut self, target: &WriteTarget, rows: Vec<Row>) -> Result<u64> {
        let batch = {
            let n = self.batches.entry(target.table.clone()).or_default();
            *n += 1;
            *n
        };
        if let Some((table, fail_at)) = self.db.inner.fail_write.lock().unwrap().clone() {
            if table == target.table && fail_at == batch {
                return Err(MigrateError::transfer(&table, "injected write failure"));
            }
        }

        let schema = self.db.schema(&target.table).clone();
        let positions: Vec<usize> = target
            .columns
            .iter()
            .map(|c| self.db.position(&target.table, c))
            .collect();
        let key: Vec<usize> = target
            .conflict_key
            .clone()
            .unwrap_or_else(|| schema.primary_key.clone())
            .iter()
            .map(|c| self.db.position(&target.table, c))
            .collect();
        let upsert = target.conflict_key.is_some();

        let staged = self.staged(&target.table);
        let mut written = 0;
        for row in rows {
            let mut full: Row = vec![SqlValue::Null; schema.columns.len()];
            for (value, &pos) in row.into_iter().zip(&positions) {
                full[pos] = value;
            }

            let existing = (!key.is_empty())
                .then(|| {
                    staged
                        .iter()
                        .position(|r| key.iter().all(|&k| r[k] == full[k]))
                })
                .flatten();

            match existing {
                Some(idx) if upsert => {
                    for &pos in &positions {
                        staged[idx][pos] = full[pos].clone();
                    }
                }
                Some(_) => {
                    return Err(MigrateError::transfer(
                        &target.table,
                        "duplicate key value violates unique constraint",
                    ))
                }
                None => staged.push(full),
            }
            written += 1;
        }
        Ok(written)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut data = self.db.inner.data.lock().unwrap();
        for (table, rows) in self.staged {
            data.insert(table, rows);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for MemoryDb {
    async fn begin(&self) -> Result<Box<dyn TargetSession>> {
        Ok(Box::new(MemorySession {
            db: self.clone(),
            staged: BTreeMap::new(),
            batches: BTreeMap::new(),
        }))
    }

    async fn row_count(&self, _schema: &str, table: &str) -> Result<i64> {
        Ok(self.rows(table).len() as i64)
    }
}

pub fn col(name: &str, data_type: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.into(),
        data_type: data_type.into(),
        is_nullable: true,
        default: None,
        ordinal_position: 0,
    }
}

pub fn table(name: &str, columns: Vec<ColumnDescriptor>) -> TableSchema {
    let columns = columns
        .into_iter()
        .enumerate()
        .map(|(i, mut c)| {
            c.ordinal_position = i as i32 + 1;
            c
        })
        .collect();
    TableSchema {
        schema: "public".into(),
        name: name.into(),
        columns,
        primary_key: vec!["id".into()],
    }
}

pub fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn database(name: &str) -> DatabaseConfig {
    DatabaseConfig {
        host: "localhost".into(),
        port: 5432,
        database: name.into(),
        user: "postgres".into(),
        password: String::new(),
        schema: "public".into(),
        ssl_mode: "disable".into(),
    }
}

pub fn config(migration: MigrationConfig) -> Config {
    Config {
        source: database("old"),
        target: database("new"),
        migration,
    }
}

/// Parse the `migration` section of a config file.
pub fn migration(yaml: &str) -> MigrationConfig {
    serde_yaml::from_str(yaml).expect("valid migration yaml")
}
