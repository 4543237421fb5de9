// ABOUTME: MySQL source database: catalog queries and ordered window reads
// ABOUTME: Opens one connection per operation and reads rows through the text protocol

use super::connection::{connect, parse_url, release};
use crate::database::{ColumnDescriptor, Database, RowSet, SampleWindow, SqlValue, TableRef};
use crate::utils::quote_mysql_ident;
use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, Params, Row, Value};

/// Character set number MySQL reports for binary columns
const BINARY_CHARSET: u16 = 63;

pub struct MysqlSource {
    opts: Opts,
}

impl MysqlSource {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            opts: parse_url(url)?,
        })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let mut conn = connect(&self.opts).await?;
        let result = conn
            .query::<Row, _>(sql)
            .await
            .with_context(|| format!("MySQL query failed: {}", sql));
        release(conn).await;
        result
    }

    async fn exec_rows(&self, sql: &str, params: Params) -> Result<Vec<Row>> {
        let mut conn = connect(&self.opts).await?;
        let result = conn
            .exec::<Row, _, _>(sql, params)
            .await
            .with_context(|| format!("MySQL query failed: {}", sql));
        release(conn).await;
        result
    }
}

/// Backtick-quoted `schema.table`
pub fn qualified_name(table: &TableRef) -> String {
    format!(
        "{}.{}",
        quote_mysql_ident(&table.schema),
        quote_mysql_ident(&table.table)
    )
}

/// `SELECT *` over one window; MySQL sorts NULLs first in ascending order
pub fn window_query(table: &TableRef, window: &SampleWindow) -> String {
    let mut sql = format!("SELECT * FROM {}", qualified_name(table));
    if !window.order_by_columns.is_empty() {
        let order: Vec<String> = window
            .order_by_columns
            .iter()
            .map(|c| quote_mysql_ident(c))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", window.limit, window.offset));
    sql
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(i) => Some(i.to_string()),
        Value::UInt(u) => Some(u.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Double(d) => Some(d.to_string()),
        other => Some(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

fn text_at(row: &Row, idx: usize) -> Option<String> {
    row.as_ref(idx).and_then(scalar_text)
}

fn cell(value: Option<&Value>, binary: bool) -> SqlValue {
    match value {
        None | Some(Value::NULL) => SqlValue::Null,
        Some(Value::Bytes(bytes)) if binary => SqlValue::Bytes(bytes.clone()),
        Some(other) => scalar_text(other).map_or(SqlValue::Null, SqlValue::Text),
    }
}

/// Build a descriptor from one `DESCRIBE` row
/// (`Field`, `Type`, `Null`, `Key`, `Default`)
pub fn describe_descriptor(
    field: String,
    declared_type: String,
    null: &str,
    key: &str,
    default: Option<String>,
) -> ColumnDescriptor {
    let mut column = ColumnDescriptor::new(field, declared_type);
    column.is_nullable = null.eq_ignore_ascii_case("YES");
    column.is_primary_key = key.eq_ignore_ascii_case("PRI");
    column.default_expression = default;
    column
}

fn parse_count(rows: &[Row], what: &str) -> Result<u64> {
    let raw = rows
        .first()
        .and_then(|row| text_at(row, 0))
        .with_context(|| format!("{} returned no rows", what))?;
    raw.parse::<u64>()
        .with_context(|| format!("{} returned a non-numeric count '{}'", what, raw))
}

#[async_trait]
impl Database for MysqlSource {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows = self
            .exec_rows(
                "SELECT TABLE_NAME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY TABLE_NAME",
                (schema,).into(),
            )
            .await?;
        Ok(rows.iter().filter_map(|row| text_at(row, 0)).collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let rows = self
            .exec_rows(
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                (table.schema.as_str(), table.table.as_str()).into(),
            )
            .await?;
        Ok(parse_count(&rows, "table lookup")? > 0)
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualified_name(table));
        let rows = self.query_rows(&sql).await?;
        parse_count(&rows, &sql)
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let sql = format!("DESCRIBE {}", qualified_name(table));
        let rows = self.query_rows(&sql).await?;

        rows.iter()
            .map(|row| {
                let field = text_at(row, 0).context("DESCRIBE row without a Field value")?;
                Ok(describe_descriptor(
                    field,
                    text_at(row, 1).unwrap_or_default(),
                    &text_at(row, 2).unwrap_or_default(),
                    &text_at(row, 3).unwrap_or_default(),
                    text_at(row, 4),
                ))
            })
            .collect()
    }

    async fn read_window(&self, table: &TableRef, window: &SampleWindow) -> Result<RowSet> {
        let sql = window_query(table, window);
        let rows = self.query_rows(&sql).await?;

        let Some(first) = rows.first() else {
            return Ok(RowSet::default());
        };
        let columns: Vec<String> = first
            .columns_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        let binary: Vec<bool> = first
            .columns_ref()
            .iter()
            .map(|c| c.character_set() == BINARY_CHARSET)
            .collect();

        let values = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| cell(row.as_ref(idx), binary.get(idx).copied().unwrap_or(false)))
                    .collect()
            })
            .collect();

        Ok(RowSet::new(columns, values))
    }
}
