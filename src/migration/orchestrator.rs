// ABOUTME: Migration orchestrator driving transfer, verification and structure passes
// ABOUTME: Processes tables one at a time and isolates per-table failures

use super::plan::{MigrationPlan, ResolvedTables, TableSelector};
use super::progress::{
    MigrationEvent, MigrationReport, ProgressSink, StructureOutcome, StructureResult,
    TableProgress, TableStatus,
};
use super::sanity::{SanityConfig, SanityVerifier};
use super::structure::StructureSynchronizer;
use super::transfer::BatchTransfer;
use crate::database::{Database, TableRef, TargetDatabase};
use crate::utils::RetryPolicy;
use anyhow::{bail, Result};
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: u64 = 50_000;

#[derive(Debug, Clone, Copy)]
enum TableStep {
    TransferAndVerify,
    VerifyOnly,
}

/// Runs a migration plan against one source and one target
pub struct Orchestrator<'a> {
    source: &'a dyn Database,
    target: &'a dyn TargetDatabase,
    sink: &'a dyn ProgressSink,
    batch_size: u64,
    sanity: SanityConfig,
    retry: RetryPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn Database,
        target: &'a dyn TargetDatabase,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            source,
            target,
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
            sanity: SanityConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_sanity(mut self, sanity: SanityConfig) -> Self {
        self.sanity = sanity;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Transfer and verify every selected table, then synchronize structure
    ///
    /// A failing table never stops the run; its status and error end up in
    /// the report. A schema whose tables cannot be listed is reported as a
    /// single `*` entry and the remaining schemas still run.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<MigrationReport> {
        let tables = self.transfer_pass(plan).await?;
        let structure = self.structure_pass(plan).await?;
        Ok(MigrationReport { tables, structure })
    }

    /// Transfer pass: copy missing rows, then sanity check each table
    pub async fn transfer_pass(&self, plan: &MigrationPlan) -> Result<Vec<TableProgress>> {
        let mut results = Vec::new();

        for (schema, selector) in plan.schemas() {
            let resolved = match self.resolve(schema, selector).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    results.push(unlisted(schema, &e));
                    continue;
                }
            };
            results.extend(skipped(schema, &resolved));

            let total = resolved.tables.len();
            self.sink.record(&MigrationEvent::SchemaStarted {
                schema: schema.to_string(),
                tables: total,
            });

            for (idx, table) in resolved.tables.iter().enumerate() {
                let progress = self
                    .process_table(schema, table, TableStep::TransferAndVerify)
                    .await;
                results.push(progress);

                self.sink.record(&MigrationEvent::SchemaProgress {
                    schema: schema.to_string(),
                    done: idx + 1,
                    total,
                });
            }
        }

        Ok(results)
    }

    /// Sanity checks only, without transferring anything
    pub async fn verify_pass(&self, plan: &MigrationPlan) -> Result<Vec<TableProgress>> {
        let mut results = Vec::new();

        for (schema, selector) in plan.schemas() {
            let resolved = match self.resolve(schema, selector).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    results.push(unlisted(schema, &e));
                    continue;
                }
            };
            results.extend(skipped(schema, &resolved));

            for table in &resolved.tables {
                let progress = self
                    .process_table(schema, table, TableStep::VerifyOnly)
                    .await;
                results.push(progress);
            }
        }

        Ok(results)
    }

    /// Structure pass over every selected table present on both sides
    pub async fn structure_pass(&self, plan: &MigrationPlan) -> Result<Vec<StructureResult>> {
        let synchronizer =
            StructureSynchronizer::new(self.source, self.target, &self.retry, self.sink);
        let mut results = Vec::new();

        for (schema, selector) in plan.schemas() {
            let resolved = match self.resolve(schema, selector).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    let progress = unlisted(schema, &e);
                    results.push(StructureResult {
                        table: progress.source_ref(),
                        outcome: StructureOutcome::Failed {
                            error: progress.error.unwrap_or_default(),
                        },
                    });
                    continue;
                }
            };
            for table in &resolved.tables {
                let source = TableRef::new(schema, table.as_str());
                let target = source.to_target();
                let exists = self
                    .retry
                    .run(&format!("check {} exists", target), || {
                        self.target.table_exists(&target)
                    })
                    .await;
                match exists {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!("{} not on target, structure sync skipped", target);
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Could not look up {}: {:#}", target, e);
                        results.push(StructureResult {
                            table: source,
                            outcome: StructureOutcome::Failed {
                                error: format!("{:#}", e),
                            },
                        });
                        continue;
                    }
                }

                let outcome = synchronizer.sync_table(&source).await;
                results.push(StructureResult {
                    table: source,
                    outcome,
                });
            }
        }

        Ok(results)
    }

    async fn resolve(&self, schema: &str, selector: &TableSelector) -> Result<ResolvedTables> {
        let available = self
            .retry
            .run(&format!("list tables of {}", schema), || {
                self.source.list_tables(schema)
            })
            .await?;
        let resolved = selector.resolve(&available);
        for missing in &resolved.missing {
            tracing::warn!("Table {}.{} not found in source, skipping", schema, missing);
        }
        Ok(resolved)
    }

    /// Run `step` for one table, converting any error into a `Failed` status
    async fn process_table(&self, schema: &str, table: &str, step: TableStep) -> TableProgress {
        let started = Instant::now();
        let mut progress = TableProgress::new(schema, table);

        let outcome = match self.count_rows(&mut progress).await {
            Ok(()) => match step {
                TableStep::TransferAndVerify => self.transfer_and_verify(&mut progress).await,
                TableStep::VerifyOnly => self.verify_only(&mut progress).await,
            },
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            if progress.status != TableStatus::Failed {
                progress.fail(&e);
            }
            tracing::error!("{}.{} failed: {:#}", schema, table, e);
        }

        self.sink.record(&MigrationEvent::TableFinished {
            table: progress.source_ref(),
            status: progress.status,
            duration: started.elapsed(),
        });
        progress
    }

    async fn count_rows(&self, progress: &mut TableProgress) -> Result<()> {
        let source = progress.source_ref();
        let target = source.to_target();

        progress.source_row_count = self
            .retry
            .run(&format!("count rows of {}", source), || {
                self.source.row_count(&source)
            })
            .await?;
        progress.target_row_count = self.target_row_count(&target).await?;

        self.sink.record(&MigrationEvent::TableStarted {
            table: source,
            source_rows: progress.source_row_count,
            target_rows: progress.target_row_count,
        });
        Ok(())
    }

    /// Row count of a target table, 0 when it does not exist yet
    async fn target_row_count(&self, target: &TableRef) -> Result<u64> {
        let exists = self
            .retry
            .run(&format!("check {} exists", target), || {
                self.target.table_exists(target)
            })
            .await?;
        if !exists {
            return Ok(0);
        }
        Ok(self
            .retry
            .run(&format!("count rows of {}", target), || {
                self.target.row_count(target)
            })
            .await?)
    }

    async fn transfer_and_verify(&self, progress: &mut TableProgress) -> Result<()> {
        let target = progress.source_ref().to_target();
        let target_exists = self
            .retry
            .run(&format!("check {} exists", target), || {
                self.target.table_exists(&target)
            })
            .await?;

        if !target_exists || progress.source_row_count > progress.target_row_count {
            let transfer = BatchTransfer::new(
                self.source,
                self.target,
                self.batch_size,
                &self.retry,
                self.sink,
            );
            transfer.transfer_table(progress).await?;
            progress.target_row_count = self.target_row_count(&target).await?;
        } else {
            tracing::info!(
                "{}.{} already holds every source row, checking only",
                progress.schema,
                progress.table
            );
        }

        self.verify(progress).await
    }

    async fn verify_only(&self, progress: &mut TableProgress) -> Result<()> {
        let target = progress.source_ref().to_target();
        let exists = self
            .retry
            .run(&format!("check {} exists", target), || {
                self.target.table_exists(&target)
            })
            .await?;
        if !exists {
            bail!("Target table {} does not exist", target);
        }
        self.verify(progress).await
    }

    async fn verify(&self, progress: &mut TableProgress) -> Result<()> {
        let verifier = SanityVerifier::new(
            self.source,
            self.target.as_database(),
            &self.sanity,
            &self.retry,
            self.sink,
        );
        verifier.verify_table(progress).await?;
        Ok(())
    }
}

/// Stand-in entry for a schema whose tables could not be listed
fn unlisted(schema: &str, error: &anyhow::Error) -> TableProgress {
    tracing::error!("Could not list tables of {}: {:#}", schema, error);
    let mut progress = TableProgress::new(schema, "*");
    progress.status = TableStatus::Failed;
    progress.error = Some(format!("failed to list tables: {:#}", error));
    progress
}

fn skipped(schema: &str, resolved: &ResolvedTables) -> Vec<TableProgress> {
    resolved
        .missing
        .iter()
        .map(|table| {
            let mut progress = TableProgress::new(schema, table.as_str());
            progress.status = TableStatus::Skipped;
            progress.error = Some("table not found in source".to_string());
            progress
        })
        .collect()
}
