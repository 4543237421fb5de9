// ABOUTME: Database access capability required by the migration pipeline
// ABOUTME: Defines the catalog/read trait shared by both sides and the target write trait

pub mod value;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub use value::{binary_to_text, RowSet, SqlValue};

/// A schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// The name the table gets on the target: PostgreSQL folds unquoted
    /// identifiers to lowercase, so both parts are lowercased
    pub fn to_target(&self) -> TableRef {
        TableRef::new(self.schema.to_lowercase(), self.table.to_lowercase())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Column metadata as reported by a database catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub is_nullable: bool,
    pub default_expression: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            is_nullable: true,
            default_expression: None,
            is_primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(expression.into());
        self
    }

    /// Floating-point columns compare unstably across engines
    pub fn is_floating_point(&self) -> bool {
        let ty = self.declared_type.trim().to_lowercase();
        ty.starts_with("float") || ty.starts_with("double") || ty.starts_with("real")
    }
}

/// A `ORDER BY ... LIMIT ... OFFSET ...` read window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleWindow {
    pub limit: u64,
    pub offset: u64,
    /// Empty means the engine's natural storage order
    pub order_by_columns: Vec<String>,
}

impl SampleWindow {
    pub fn new(limit: u64, offset: u64, order_by_columns: Vec<String>) -> Self {
        Self {
            limit,
            offset,
            order_by_columns,
        }
    }
}

/// How a batch is written into an existing target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    /// Truncate the table in the same transaction before loading
    Replace,
}

/// Catalog and read operations needed on both source and target
#[async_trait]
pub trait Database: Send + Sync {
    /// Base tables in the schema, in catalog order
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    async fn row_count(&self, table: &TableRef) -> Result<u64>;

    /// Columns in ordinal order with nullability, default and key flags
    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>>;

    async fn read_window(&self, table: &TableRef, window: &SampleWindow) -> Result<RowSet>;
}

/// Write operations needed on the target only
#[async_trait]
pub trait TargetDatabase: Database {
    /// This target through its read capability, for comparisons
    fn as_database(&self) -> &dyn Database;

    /// Create the schema if absent; returns true when it was created
    async fn ensure_schema(&self, schema: &str) -> Result<bool>;

    /// Create the table from source column descriptors if absent; returns
    /// true when it was created
    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnDescriptor]) -> Result<bool>;

    /// High-throughput load path, atomic per batch
    async fn bulk_load(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64>;

    /// Row-oriented fallback load path, atomic per batch
    async fn insert_rows(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64>;

    /// Run all statements in one transaction
    async fn execute_transaction(&self, statements: &[String]) -> Result<()>;

    /// Drop every non-system schema in one transaction, returning their names
    async fn purge_schemas(&self) -> Result<Vec<String>>;
}
