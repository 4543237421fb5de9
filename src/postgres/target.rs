// ABOUTME: PostgreSQL target database: catalog queries, window reads and batch loads
// ABOUTME: Each batch is written inside one transaction through COPY or INSERT

use super::connection::connect;
use super::load::{
    column_list, copy_statement, encode_copy_rows, insert_statements, qualified_name,
    INSERT_CHUNK_ROWS,
};
use super::typemap::mysql_to_postgres;
use crate::database::{
    ColumnDescriptor, Database, RowSet, SampleWindow, SqlValue, TableRef, TargetDatabase,
    WriteMode,
};
use crate::utils::quote_pg_ident;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio_postgres::{CopyInSink, GenericClient, SimpleQueryMessage, Transaction};

/// Schemas `purge` never drops
pub const PROTECTED_SCHEMAS: [&str; 4] = ["public", "information_schema", "pg_catalog", "pg_toast"];

pub struct PostgresTarget {
    url: String,
}

impl PostgresTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// `SELECT *` over one window, NULLs first to match MySQL's ascending order
pub fn window_query(table: &TableRef, window: &SampleWindow) -> String {
    let mut sql = format!("SELECT * FROM {}", qualified_name(table));
    if !window.order_by_columns.is_empty() {
        let order: Vec<String> = window
            .order_by_columns
            .iter()
            .map(|c| format!("{} NULLS FIRST", quote_pg_ident(c)))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    sql.push_str(&format!(" LIMIT {} OFFSET {}", window.limit, window.offset));
    sql
}

/// Target table DDL: lowercase names, mapped types, everything nullable
pub fn create_table_statement(table: &TableRef, columns: &[ColumnDescriptor]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|c| {
            format!(
                "{} {}",
                quote_pg_ident(&c.name.to_lowercase()),
                mysql_to_postgres(&c.declared_type)
            )
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_name(table),
        defs.join(", ")
    )
}

async fn truncate_if_replacing(tx: &Transaction<'_>, table: &TableRef, mode: WriteMode) -> Result<()> {
    if mode == WriteMode::Replace {
        tx.batch_execute(&format!("TRUNCATE {}", qualified_name(table)))
            .await
            .with_context(|| format!("Failed to truncate {}", table))?;
    }
    Ok(())
}

const DESCRIBE_COLUMNS: &str = "\
    SELECT c.column_name::text, c.data_type::text, c.is_nullable::text, c.column_default::text, \
           EXISTS ( \
               SELECT 1 FROM information_schema.table_constraints tc \
               JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name \
                AND tc.table_schema = kcu.table_schema \
                AND tc.table_name = kcu.table_name \
               WHERE tc.constraint_type = 'PRIMARY KEY' \
                 AND tc.table_schema = c.table_schema \
                 AND tc.table_name = c.table_name \
                 AND kcu.column_name = c.column_name \
           ) AS is_primary_key \
    FROM information_schema.columns c \
    WHERE c.table_schema = $1 AND c.table_name = $2 \
    ORDER BY c.ordinal_position";

const PURGEABLE_SCHEMAS: &str = "\
    SELECT schema_name::text FROM information_schema.schemata \
    WHERE schema_name NOT IN ('public', 'information_schema', 'pg_catalog', 'pg_toast') \
      AND schema_name NOT LIKE 'pg\\_temp\\_%' \
      AND schema_name NOT LIKE 'pg\\_toast\\_temp\\_%' \
    ORDER BY schema_name";

/// Non-system schemas, the ones `purge` drops
pub async fn list_purgeable_schemas<C: GenericClient + Sync>(client: &C) -> Result<Vec<String>> {
    let rows = client
        .query(PURGEABLE_SCHEMAS, &[])
        .await
        .context("Failed to list schemas")?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

#[async_trait]
impl Database for PostgresTarget {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let client = connect(&self.url).await?;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .with_context(|| format!("Failed to list tables of schema '{}'", schema))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let client = connect(&self.url).await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[&table.schema, &table.table],
            )
            .await
            .with_context(|| format!("Failed to look up table {}", table))?;
        Ok(row.get(0))
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        let client = connect(&self.url).await?;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {}", qualified_name(table)), &[])
            .await
            .with_context(|| format!("Failed to count rows of {}", table))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<ColumnDescriptor>> {
        let client = connect(&self.url).await?;
        let rows = client
            .query(DESCRIBE_COLUMNS, &[&table.schema, &table.table])
            .await
            .with_context(|| format!("Failed to describe {}", table))?;

        Ok(rows
            .iter()
            .map(|row| {
                let nullable: String = row.get(2);
                ColumnDescriptor {
                    name: row.get(0),
                    declared_type: row.get(1),
                    is_nullable: nullable == "YES",
                    default_expression: row.get(3),
                    is_primary_key: row.get(4),
                }
            })
            .collect())
    }

    async fn read_window(&self, table: &TableRef, window: &SampleWindow) -> Result<RowSet> {
        let client = connect(&self.url).await?;
        let sql = window_query(table, window);
        let messages = client
            .simple_query(&sql)
            .await
            .with_context(|| format!("Failed to read window of {}", table))?;

        let mut result = RowSet::default();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if result.columns.is_empty() {
                    result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let values = (0..row.len())
                    .map(|idx| SqlValue::from(row.get(idx)))
                    .collect();
                result.rows.push(values);
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl TargetDatabase for PostgresTarget {
    fn as_database(&self) -> &dyn Database {
        self
    }

    async fn ensure_schema(&self, schema: &str) -> Result<bool> {
        let client = connect(&self.url).await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
                &[&schema],
            )
            .await
            .with_context(|| format!("Failed to look up schema '{}'", schema))?;
        if row.get::<_, bool>(0) {
            return Ok(false);
        }

        client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_pg_ident(schema)
            ))
            .await
            .with_context(|| format!("Failed to create schema '{}'", schema))?;
        Ok(true)
    }

    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnDescriptor]) -> Result<bool> {
        if self.table_exists(table).await? {
            return Ok(false);
        }
        let client = connect(&self.url).await?;
        let ddl = create_table_statement(table, columns);
        tracing::debug!("Creating target table: {}", ddl);
        client
            .batch_execute(&ddl)
            .await
            .with_context(|| format!("Failed to create table {}", table))?;
        Ok(true)
    }

    async fn bulk_load(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64> {
        let mut client = connect(&self.url).await?;
        let tx = client.transaction().await?;
        truncate_if_replacing(&tx, table, mode).await?;

        let sink: CopyInSink<Bytes> = tx
            .copy_in(&copy_statement(table, &batch.columns))
            .await
            .with_context(|| format!("Failed to start COPY into {}", table))?;
        futures::pin_mut!(sink);
        sink.send(encode_copy_rows(batch).freeze())
            .await
            .with_context(|| format!("COPY send into {} failed", table))?;
        let rows = sink
            .finish()
            .await
            .with_context(|| format!("COPY into {} failed", table))?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit load into {}", table))?;
        Ok(rows)
    }

    async fn insert_rows(&self, table: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64> {
        let mut client = connect(&self.url).await?;
        let tx = client.transaction().await?;
        truncate_if_replacing(&tx, table, mode).await?;

        for statement in insert_statements(table, batch, INSERT_CHUNK_ROWS) {
            tx.batch_execute(&statement).await.with_context(|| {
                format!("INSERT into {} ({}) failed", table, column_list(&batch.columns))
            })?;
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit inserts into {}", table))?;
        Ok(batch.len() as u64)
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<()> {
        let mut client = connect(&self.url).await?;
        let tx = client.transaction().await?;
        for statement in statements {
            tx.batch_execute(statement)
                .await
                .with_context(|| format!("Statement failed: {}", statement))?;
        }
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn purge_schemas(&self) -> Result<Vec<String>> {
        let mut client = connect(&self.url).await?;
        let tx = client.transaction().await?;

        let schemas = list_purgeable_schemas(&tx).await?;

        for schema in &schemas {
            tracing::info!("Dropping schema '{}'", schema);
            tx.batch_execute(&format!("DROP SCHEMA {} CASCADE", quote_pg_ident(schema)))
                .await
                .with_context(|| format!("Failed to drop schema '{}'", schema))?;
        }

        tx.commit().await.context("Failed to commit schema purge")?;
        Ok(schemas)
    }
}
