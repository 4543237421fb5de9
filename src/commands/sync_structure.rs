// ABOUTME: Sync-structure command implementation
// ABOUTME: Applies defaults, NOT NULL constraints and primary keys to migrated tables

use super::{fail_on_errors, log_summary};
use crate::config::MigrationConfig;
use crate::migration::{MigrationReport, Orchestrator, TracingSink};
use crate::mysql::MysqlSource;
use crate::postgres::PostgresTarget;
use anyhow::{Context, Result};
use std::time::Instant;

/// Synchronize the structure of already migrated tables
///
/// Only tables present in both the source and the target are touched. Each
/// table's changes run in one transaction, so a failing table keeps its
/// previous structure.
///
/// # Errors
///
/// Returns an error if the table listing fails, or after the summary if any
/// table could not be synchronized.
pub async fn sync_structure(config: &MigrationConfig) -> Result<()> {
    let started = Instant::now();
    tracing::info!("Synchronizing table structure...");

    let source = MysqlSource::new(&config.source.url)?;
    let target = PostgresTarget::new(config.target.url.clone());
    let sink = TracingSink;
    let orchestrator =
        Orchestrator::new(&source, &target, &sink).with_retry(config.retry.policy());

    let report = MigrationReport {
        tables: Vec::new(),
        structure: orchestrator
            .structure_pass(&config.plan)
            .await
            .context("Structure pass failed")?,
    };

    log_summary("STRUCTURE SUMMARY", &report, started.elapsed());
    fail_on_errors(&report)
}
