// ABOUTME: Migrate command implementation - full MySQL to PostgreSQL run
// ABOUTME: Transfers and verifies every selected table, then synchronizes structure

use super::{fail_on_errors, log_summary, write_report};
use crate::config::MigrationConfig;
use crate::migration::{
    rename_columns_to_lowercase, MigrationReport, Orchestrator, TracingSink,
};
use crate::mysql::MysqlSource;
use crate::postgres::PostgresTarget;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Instant;

/// Switches for one `migrate` run
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Lowercase target column names between the transfer and structure passes
    pub rename_columns: bool,
    /// Stop after the transfer pass
    pub skip_structure: bool,
    /// Where to write the JSON run report
    pub report: Option<PathBuf>,
}

/// Migrate every table the plan selects from MySQL to PostgreSQL
///
/// Runs in order:
/// 1. Transfer pass: copies the rows each target table is missing, in
///    ordered batches, then sanity checks the table against the source
/// 2. Optional lowercase rename of target columns
/// 3. Structure pass: defaults, NOT NULL and primary keys
///
/// Re-running after an interruption resumes from the target row counts.
///
/// # Arguments
///
/// * `config` - Validated migration configuration
/// * `options` - Rename, structure and report switches
///
/// # Errors
///
/// Returns an error if the table listing fails, or after the summary if any
/// table or structure sync failed.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use mysql_pg_migrator::commands::{migrate, MigrateOptions};
/// # use mysql_pg_migrator::config::load_config;
/// # async fn example() -> Result<()> {
/// let config = load_config(std::path::Path::new("config.toml"))?;
/// migrate(&config, MigrateOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn migrate(config: &MigrationConfig, options: MigrateOptions) -> Result<()> {
    let started = Instant::now();
    tracing::info!("Starting migration of {} schema(s)...", config.plan.len());

    let source = MysqlSource::new(&config.source.url)?;
    let target = PostgresTarget::new(config.target.url.clone());
    let sink = TracingSink;
    let retry = config.retry.policy();
    let orchestrator = Orchestrator::new(&source, &target, &sink)
        .with_batch_size(config.batch_size)
        .with_sanity(config.sanity.clone())
        .with_retry(retry.clone());

    let mut report = MigrationReport {
        tables: orchestrator
            .transfer_pass(&config.plan)
            .await
            .context("Transfer pass failed")?,
        structure: Vec::new(),
    };

    if options.rename_columns {
        tracing::info!("Renaming target columns to lowercase...");
        let renamed = rename_columns_to_lowercase(&target, &config.plan, &retry)
            .await
            .context("Failed to rename columns")?;
        tracing::info!("✓ Renamed columns in {} table(s)", renamed.len());
    }

    if options.skip_structure {
        tracing::info!("Structure synchronization skipped");
    } else {
        tracing::info!("Synchronizing table structure...");
        report.structure = orchestrator
            .structure_pass(&config.plan)
            .await
            .context("Structure pass failed")?;
    }

    log_summary("MIGRATION SUMMARY", &report, started.elapsed());
    if let Some(path) = &options.report {
        write_report(path, &report)?;
    }
    fail_on_errors(&report)
}
