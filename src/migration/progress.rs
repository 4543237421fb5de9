// ABOUTME: Per-table progress tracking, diagnostic events and the run report
// ABOUTME: Components emit events to an injected sink instead of global logging state

use crate::database::TableRef;
use crate::utils::sanitize_identifier;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableStatus {
    Pending,
    InProgress,
    Verified,
    Skipped,
    Failed,
}

/// Progress of one table through the transfer pass
///
/// Resume is derived from `target_row_count`, never from a saved offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableProgress {
    pub schema: String,
    pub table: String,
    pub source_row_count: u64,
    pub target_row_count: u64,
    pub offset: u64,
    pub status: TableStatus,
    /// Last failure, if any
    pub error: Option<String>,
}

impl TableProgress {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            source_row_count: 0,
            target_row_count: 0,
            offset: 0,
            status: TableStatus::Pending,
            error: None,
        }
    }

    pub fn source_ref(&self) -> TableRef {
        TableRef::new(self.schema.clone(), self.table.clone())
    }

    pub fn fail(&mut self, error: &anyhow::Error) {
        self.status = TableStatus::Failed;
        self.error = Some(format!("{:#}", error));
    }

    /// True when the table needs no operator attention
    pub fn is_ok(&self) -> bool {
        matches!(self.status, TableStatus::Verified | TableStatus::Skipped)
    }
}

/// Outcome of synchronizing one table's structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StructureOutcome {
    Applied { statements: usize },
    NothingToSync,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureResult {
    pub table: TableRef,
    pub outcome: StructureOutcome,
}

/// Everything a run did, per table
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub tables: Vec<TableProgress>,
    pub structure: Vec<StructureResult>,
}

impl MigrationReport {
    pub fn failed_tables(&self) -> Vec<&TableProgress> {
        self.tables.iter().filter(|t| !t.is_ok()).collect()
    }

    pub fn failed_structure(&self) -> Vec<&StructureResult> {
        self.structure
            .iter()
            .filter(|s| matches!(s.outcome, StructureOutcome::Failed { .. }))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_tables().is_empty() || !self.failed_structure().is_empty()
    }
}

/// Structured diagnostics emitted by the pipeline components
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MigrationEvent {
    SchemaStarted {
        schema: String,
        tables: usize,
    },
    TableStarted {
        table: TableRef,
        source_rows: u64,
        target_rows: u64,
    },
    SchemaCreated {
        schema: String,
    },
    BatchLoaded {
        table: TableRef,
        rows: usize,
        read_time: Duration,
        load_time: Duration,
        progress: f64,
    },
    FallbackLoad {
        table: TableRef,
        reason: String,
    },
    TransferFinished {
        table: TableRef,
        rows: u64,
    },
    SanityIteration {
        table: TableRef,
        iteration: usize,
        iterations: usize,
        passed: bool,
    },
    TableFinished {
        table: TableRef,
        status: TableStatus,
        duration: Duration,
    },
    StructureSynced {
        table: TableRef,
        outcome: StructureOutcome,
    },
    SchemaProgress {
        schema: String,
        done: usize,
        total: usize,
    },
}

/// Receives pipeline events; injected into every component
pub trait ProgressSink: Send + Sync {
    fn record(&self, event: &MigrationEvent);
}

/// Renders events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn record(&self, event: &MigrationEvent) {
        match event {
            MigrationEvent::SchemaStarted { schema, tables } => {
                tracing::info!(
                    "*********** Schema {} ({} table(s)) ***********",
                    sanitize_identifier(schema),
                    tables
                );
            }
            MigrationEvent::TableStarted {
                table,
                source_rows,
                target_rows,
            } => {
                tracing::info!(
                    "Migrating {} - row count source vs target: {} <-> {}",
                    sanitize_identifier(&table.to_string()),
                    source_rows,
                    target_rows
                );
            }
            MigrationEvent::SchemaCreated { schema } => {
                tracing::info!("Schema '{}' created", sanitize_identifier(schema));
            }
            MigrationEvent::BatchLoaded {
                table,
                rows,
                read_time,
                load_time,
                progress,
            } => {
                tracing::info!(
                    "{}: transferred {} rows (read {:.2}s, load {:.2}s) - progress {:.2}%",
                    sanitize_identifier(&table.to_string()),
                    rows,
                    read_time.as_secs_f64(),
                    load_time.as_secs_f64(),
                    progress * 100.0
                );
            }
            MigrationEvent::FallbackLoad { table, reason } => {
                tracing::warn!(
                    "{}: bulk load failed ({}), used row-oriented insert instead",
                    sanitize_identifier(&table.to_string()),
                    reason
                );
            }
            MigrationEvent::TransferFinished { table, rows } => {
                tracing::info!(
                    "✓ Data transfer done for {} ({} rows)",
                    sanitize_identifier(&table.to_string()),
                    rows
                );
            }
            MigrationEvent::SanityIteration {
                table,
                iteration,
                iterations,
                passed,
            } => {
                if *passed {
                    tracing::info!(
                        "Sanity check {}: {}/{} passed",
                        sanitize_identifier(&table.to_string()),
                        iteration,
                        iterations
                    );
                } else {
                    tracing::warn!(
                        "Sanity check {}: iteration {}/{} failed",
                        sanitize_identifier(&table.to_string()),
                        iteration,
                        iterations
                    );
                }
            }
            MigrationEvent::TableFinished {
                table,
                status,
                duration,
            } => match status {
                TableStatus::Verified => tracing::info!(
                    "✓ {} verified in {:.2}s",
                    sanitize_identifier(&table.to_string()),
                    duration.as_secs_f64()
                ),
                other => tracing::warn!(
                    "✗ {} finished as {:?} after {:.2}s",
                    sanitize_identifier(&table.to_string()),
                    other,
                    duration.as_secs_f64()
                ),
            },
            MigrationEvent::StructureSynced { table, outcome } => match outcome {
                StructureOutcome::Applied { statements } => tracing::info!(
                    "✓ Structure of {} synchronized ({} statement(s))",
                    sanitize_identifier(&table.to_string()),
                    statements
                ),
                StructureOutcome::NothingToSync => tracing::info!(
                    "Nothing to synchronize for {}",
                    sanitize_identifier(&table.to_string())
                ),
                StructureOutcome::Failed { error } => tracing::error!(
                    "✗ Structure sync failed for {}: {}",
                    sanitize_identifier(&table.to_string()),
                    error
                ),
            },
            MigrationEvent::SchemaProgress {
                schema,
                done,
                total,
            } => {
                tracing::info!(
                    "Schema {} progress: {}/{} table(s)",
                    sanitize_identifier(schema),
                    done,
                    total
                );
            }
        }
    }
}

/// Keeps every event in memory, for assertions
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: std::sync::Mutex<Vec<MigrationEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MigrationEvent::BatchLoaded { progress, .. } => Some(progress),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressSink for RecordingSink {
    fn record(&self, event: &MigrationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_failures() {
        let mut ok = TableProgress::new("shop", "orders");
        ok.status = TableStatus::Verified;
        let mut skipped = TableProgress::new("shop", "ghost");
        skipped.status = TableStatus::Skipped;
        let mut report = MigrationReport {
            tables: vec![ok, skipped],
            structure: vec![],
        };
        assert!(!report.has_failures());

        let mut failed = TableProgress::new("shop", "items");
        failed.fail(&anyhow::anyhow!("boom"));
        report.tables.push(failed);
        assert!(report.has_failures());
        assert_eq!(report.failed_tables()[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_unverified_table_counts_as_failure() {
        let report = MigrationReport {
            tables: vec![TableProgress::new("shop", "orders")],
            structure: vec![],
        };
        assert!(report.has_failures());
    }

    #[test]
    fn test_structure_failure_counts() {
        let report = MigrationReport {
            tables: vec![],
            structure: vec![StructureResult {
                table: TableRef::new("shop", "orders"),
                outcome: StructureOutcome::Failed {
                    error: "column count differs".to_string(),
                },
            }],
        };
        assert!(report.has_failures());
    }
}
