// ABOUTME: Command implementations for each migration operation
// ABOUTME: Exports migrate, verify, sync-structure, rename-columns and purge commands

pub mod migrate;
pub mod purge;
pub mod rename_columns;
pub mod sync_structure;
pub mod verify;

pub use migrate::{migrate, MigrateOptions};
pub use purge::purge;
pub use rename_columns::rename_columns;
pub use sync_structure::sync_structure;
pub use verify::verify;

use crate::migration::{MigrationReport, StructureOutcome, TableStatus};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Log a per-table summary of a run
pub(crate) fn log_summary(title: &str, report: &MigrationReport, elapsed: Duration) {
    let verified = report
        .tables
        .iter()
        .filter(|t| t.status == TableStatus::Verified)
        .count();
    let skipped = report
        .tables
        .iter()
        .filter(|t| t.status == TableStatus::Skipped)
        .count();
    let applied = report
        .structure
        .iter()
        .filter(|s| matches!(s.outcome, StructureOutcome::Applied { .. }))
        .count();

    tracing::info!("");
    tracing::info!("========================================");
    tracing::info!("{}", title);
    tracing::info!("========================================");
    if !report.tables.is_empty() {
        tracing::info!("Tables: {}", report.tables.len());
        tracing::info!("✓ Verified: {}", verified);
        if skipped > 0 {
            tracing::info!("- Skipped (not in source): {}", skipped);
        }
        tracing::info!("✗ Failed: {}", report.failed_tables().len());
    }
    if !report.structure.is_empty() {
        tracing::info!("Structure synchronized: {}", applied);
        tracing::info!("✗ Structure failures: {}", report.failed_structure().len());
    }
    tracing::info!("Elapsed: {:.1}s", elapsed.as_secs_f64());
    tracing::info!("========================================");

    for table in report.failed_tables() {
        tracing::error!(
            "  ✗ {}.{}: {}",
            table.schema,
            table.table,
            table.error.as_deref().unwrap_or("not verified")
        );
    }
    for result in report.failed_structure() {
        if let StructureOutcome::Failed { error } = &result.outcome {
            tracing::error!("  ✗ structure of {}: {}", result.table, error);
        }
    }
}

/// Write the run report as pretty JSON
pub(crate) fn write_report(path: &Path, report: &MigrationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    tracing::info!("Run report written to {}", path.display());
    Ok(())
}

/// Turn a report with failures into an error for the exit code
pub(crate) fn fail_on_errors(report: &MigrationReport) -> Result<()> {
    let tables = report.failed_tables().len();
    let structure = report.failed_structure().len();
    if tables + structure > 0 {
        anyhow::bail!(
            "{} table(s) failed and {} structure sync(s) failed",
            tables,
            structure
        );
    }
    Ok(())
}
