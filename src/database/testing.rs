// ABOUTME: In-memory database double used by the pipeline unit tests
// ABOUTME: Supports failure injection on reads, listings, lookups and bulk loads

use super::{ColumnDescriptor, Database, RowSet, SampleWindow, SqlValue, TableRef, TargetDatabase, WriteMode};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct MemTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadRecord {
    pub table: TableRef,
    pub rows: usize,
    pub bulk: bool,
    pub mode: WriteMode,
}

#[derive(Default)]
struct State {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableRef, MemTable>,
    read_failures: HashMap<TableRef, u32>,
    unlistable: BTreeSet<String>,
    lookup_failures: BTreeSet<TableRef>,
    bulk_fails: bool,
    loads: Vec<LoadRecord>,
    window_reads: Vec<(TableRef, SampleWindow)>,
    transactions: Vec<Vec<String>>,
}

#[derive(Default)]
pub(crate) struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: TableRef, columns: Vec<ColumnDescriptor>, rows: Vec<Vec<SqlValue>>) -> Self {
        self.insert_table(table, columns, rows);
        self
    }

    pub fn insert_table(&self, table: TableRef, columns: Vec<ColumnDescriptor>, rows: Vec<Vec<SqlValue>>) {
        let mut state = self.state.lock().unwrap();
        state.schemas.insert(table.schema.clone());
        state.tables.insert(table, MemTable { columns, rows });
    }

    /// Make the next `count` window reads of `table` fail
    pub fn fail_reads(&self, table: &TableRef, count: u32) {
        self.state
            .lock()
            .unwrap()
            .read_failures
            .insert(table.clone(), count);
    }

    /// Make every table listing of `schema` fail
    pub fn fail_listing(&self, schema: &str) {
        self.state.lock().unwrap().unlistable.insert(schema.to_string());
    }

    /// Make every existence check of `table` fail
    pub fn fail_exists(&self, table: &TableRef) {
        self.state.lock().unwrap().lookup_failures.insert(table.clone());
    }

    pub fn fail_bulk_loads(&self) {
        self.state.lock().unwrap().bulk_fails = true;
    }

    pub fn table(&self, table: &TableRef) -> Option<MemTable> {
        self.state.lock().unwrap().tables.get(table).cloned()
    }

    pub fn loads(&self) -> Vec<LoadRecord> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn window_reads(&self) -> Vec<(TableRef, SampleWindow)> {
        self.state.lock().unwrap().window_reads.clone()
    }

    pub fn transactions(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn schemas(&self) -> Vec<String> {
        self.state.lock().unwrap().schemas.iter().cloned().collect()
    }

    fn load(&self, table: &TableRef, batch: &RowSet, mode: WriteMode, bulk: bool) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if bulk && state.bulk_fails {
            bail!("bulk path unavailable");
        }
        let Some(existing) = state.tables.get_mut(table) else {
            bail!("relation {} does not exist", table);
        };
        if mode == WriteMode::Replace {
            existing.rows.clear();
        }
        existing.rows.extend(batch.rows.iter().cloned());
        state.loads.push(LoadRecord {
            table: table.clone(),
            rows: batch.len(),
            bulk,
            mode,
        });
        Ok(batch.len() as u64)
    }
}

/// Build rows of text cells from string slices; `None` is NULL
pub(crate) fn text_rows(rows: &[&[Option<&str>]]) -> Vec<Vec<SqlValue>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| SqlValue::from(*cell)).collect())
        .collect()
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.unlistable.contains(schema) {
            bail!("connection reset while listing {}", schema);
        }
        Ok(state
            .tables
            .keys()
            .filter(|t| t.schema == schema)
            .map(|t| t.table.clone())
            .collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.lookup_failures.contains(table) {
            bail!("connection reset while looking up {}", table);
        }
        Ok(state.tables.contains_key(table))
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        let state = self.state.lock().unwrap();
        match state.tables.get(table) {
            Some(t) => Ok(t.rows.len() as u64),
            None => bail!("relation {} does not exist", table),
        }
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let state = self.state.lock().unwrap();
        match state.tables.get(table) {
            Some(t) => Ok(t.columns.clone()),
            None => bail!("relation {} does not exist", table),
        }
    }

    async fn read_window(&self, table: &TableRef, window: &SampleWindow) -> Result<RowSet> {
        let mut state = self.state.lock().unwrap();
        if let Some(remaining) = state.read_failures.get_mut(table) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("connection reset while reading {}", table);
            }
        }
        state.window_reads.push((table.clone(), window.clone()));
        let Some(t) = state.tables.get(table) else {
            bail!("relation {} does not exist", table);
        };
        let start = (window.offset as usize).min(t.rows.len());
        let end = start.saturating_add(window.limit as usize).min(t.rows.len());
        Ok(RowSet::new(
            t.columns.iter().map(|c| c.name.clone()).collect(),
            t.rows[start..end].to_vec(),
        ))
    }
}

#[async_trait]
impl TargetDatabase for MemoryDatabase {
    fn as_database(&self) -> &dyn Database {
        self
    }

    async fn ensure_schema(&self, schema: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().schemas.insert(schema.to_string()))
    }

    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnDescriptor]) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.tables.contains_key(table) {
            return Ok(false);
        }
        let columns = columns
            .iter()
            .map(|c| ColumnDescriptor::new(c.name.to_lowercase(), c.declared_type.clone()))
            .collect();
        state.tables.insert(
            table.clone(),
            MemTable {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn bulk_load(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64> {
        self.load(table, batch, mode, true)
    }

    async fn insert_rows(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64> {
        self.load(table, batch, mode, false)
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .push(statements.to_vec());
        Ok(())
    }

    async fn purge_schemas(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let dropped: Vec<String> = state
            .schemas
            .iter()
            .filter(|s| s.as_str() != "public")
            .cloned()
            .collect();
        state.schemas.retain(|s| s == "public");
        state.tables.retain(|t, _| t.schema == "public");
        Ok(dropped)
    }
}
