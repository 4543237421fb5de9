// ABOUTME: Batch transfer engine moving one table's rows from source to target
// ABOUTME: Pages forward from the resume offset, coercing binary payloads and lowercasing columns

use super::progress::{MigrationEvent, ProgressSink, TableProgress, TableStatus};
use crate::database::{ColumnDescriptor, Database, RowSet, SampleWindow, TableRef, TargetDatabase, WriteMode};
use crate::utils::RetryPolicy;
use anyhow::{Context, Result};
use std::time::Instant;

/// Totals for one table transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub batches: usize,
    pub rows_loaded: u64,
    pub final_offset: u64,
}

/// Cumulative progress, `min(offset / total, 1)`
pub fn progress_ratio(offset: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (offset as f64 / total as f64).min(1.0)
}

/// Columns used to page the source deterministically: its primary key
///
/// An empty list means natural storage order, which can skip or repeat rows
/// if the source is modified while the transfer runs.
pub fn paging_order(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect()
}

pub struct BatchTransfer<'a> {
    source: &'a dyn Database,
    target: &'a dyn TargetDatabase,
    batch_size: u64,
    retry: &'a RetryPolicy,
    sink: &'a dyn ProgressSink,
}

impl<'a> BatchTransfer<'a> {
    pub fn new(
        source: &'a dyn Database,
        target: &'a dyn TargetDatabase,
        batch_size: u64,
        retry: &'a RetryPolicy,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            source,
            target,
            batch_size: batch_size.max(1),
            retry,
            sink,
        }
    }

    /// Transfer every row of the table the target does not have yet
    ///
    /// Starts at `progress.target_row_count` and stops at the first empty
    /// batch. On failure the table is marked `Failed` and the error returned;
    /// rows already committed stay in the target and a rerun resumes after them.
    pub async fn transfer_table(&self, progress: &mut TableProgress) -> Result<TransferReport> {
        progress.status = TableStatus::InProgress;
        match self.run(progress).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(
                    "Transfer of {}.{} aborted at offset {}: {:#}",
                    progress.schema,
                    progress.table,
                    progress.offset,
                    e
                );
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, progress: &mut TableProgress) -> Result<TransferReport> {
        let source = progress.source_ref();
        let target = source.to_target();

        let created = self
            .retry
            .run(&format!("create schema {}", target.schema), || {
                self.target.ensure_schema(&target.schema)
            })
            .await?;
        if created {
            self.sink.record(&MigrationEvent::SchemaCreated {
                schema: target.schema.clone(),
            });
        }

        let columns = self
            .retry
            .run(&format!("describe {}", source), || {
                self.source.describe_columns(&source)
            })
            .await?;
        self.retry
            .run(&format!("create table {}", target), || {
                self.target.ensure_table(&target, &columns)
            })
            .await?;

        let order_by = paging_order(&columns);
        if order_by.is_empty() {
            tracing::warn!(
                "{} has no primary key, paging in natural storage order",
                source
            );
        }

        let mut offset = progress.target_row_count;
        progress.offset = offset;
        let mut report = TransferReport {
            final_offset: offset,
            ..Default::default()
        };

        tracing::info!("Starting transfer of {} at offset {}", source, offset);

        loop {
            let window = SampleWindow::new(self.batch_size, offset, order_by.clone());
            let read_started = Instant::now();
            let mut batch = self
                .retry
                .run(&format!("read batch {} at offset {}", source, offset), || {
                    self.source.read_window(&source, &window)
                })
                .await?;
            let read_time = read_started.elapsed();

            if batch.is_empty() {
                break;
            }

            let coerced = batch.coerce_binary();
            if coerced > 0 {
                tracing::debug!("{}: coerced {} binary column(s) to text", source, coerced);
            }
            batch.lowercase_columns();

            let mode = if offset == 0 {
                WriteMode::Replace
            } else {
                WriteMode::Append
            };
            let load_started = Instant::now();
            let loaded = self
                .retry
                .run(&format!("load batch into {} at offset {}", target, offset), || {
                    self.load_batch(&target, &batch, mode)
                })
                .await?;

            offset += self.batch_size;
            progress.offset = offset;
            report.batches += 1;
            report.rows_loaded += loaded;
            report.final_offset = offset;

            self.sink.record(&MigrationEvent::BatchLoaded {
                table: source.clone(),
                rows: batch.len(),
                read_time,
                load_time: load_started.elapsed(),
                progress: progress_ratio(offset, progress.source_row_count),
            });
        }

        self.sink.record(&MigrationEvent::TransferFinished {
            table: source,
            rows: report.rows_loaded,
        });
        Ok(report)
    }

    /// Bulk path first, row-oriented inserts when it fails
    async fn load_batch(&self, target: &TableRef, batch: &RowSet, mode: WriteMode) -> Result<u64> {
        match self.target.bulk_load(target, batch, mode).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                self.sink.record(&MigrationEvent::FallbackLoad {
                    table: target.clone(),
                    reason: format!("{:#}", e),
                });
                self.target
                    .insert_rows(target, batch, mode)
                    .await
                    .with_context(|| format!("Row-oriented insert into {} failed", target))
            }
        }
    }
}
