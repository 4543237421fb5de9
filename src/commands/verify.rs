// ABOUTME: Verify command implementation - sampled data comparison only
// ABOUTME: Compares row counts and sampled windows without transferring anything

use super::{fail_on_errors, log_summary, write_report};
use crate::config::MigrationConfig;
use crate::migration::{MigrationReport, Orchestrator, TracingSink};
use crate::mysql::MysqlSource;
use crate::postgres::PostgresTarget;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;

/// Verify data integrity between the MySQL source and the PostgreSQL target
///
/// For each selected table, compares row counts and then sampled row
/// windows read in the same order from both sides. Tables missing on the
/// target fail verification.
///
/// # Arguments
///
/// * `config` - Validated migration configuration
/// * `report` - Optional path for the JSON run report
///
/// # Errors
///
/// Returns an error if the table listing fails, or after the summary if any
/// table did not verify.
pub async fn verify(config: &MigrationConfig, report: Option<&Path>) -> Result<()> {
    let started = Instant::now();
    tracing::info!("Starting data integrity verification...");

    let source = MysqlSource::new(&config.source.url)?;
    let target = PostgresTarget::new(config.target.url.clone());
    let sink = TracingSink;
    let orchestrator = Orchestrator::new(&source, &target, &sink)
        .with_batch_size(config.batch_size)
        .with_sanity(config.sanity.clone())
        .with_retry(config.retry.policy());

    let result = MigrationReport {
        tables: orchestrator
            .verify_pass(&config.plan)
            .await
            .context("Verification pass failed")?,
        structure: Vec::new(),
    };

    log_summary("VERIFICATION SUMMARY", &result, started.elapsed());
    if let Some(path) = report {
        write_report(path, &result)?;
    }
    fail_on_errors(&result)
}
