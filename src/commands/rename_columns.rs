// ABOUTME: Rename-columns command implementation
// ABOUTME: Lowercases mixed-case column names in the target tables

use crate::config::MigrationConfig;
use crate::migration::rename_columns_to_lowercase;
use crate::postgres::PostgresTarget;
use anyhow::Result;

/// Rename every mixed-case target column the plan selects to lowercase
pub async fn rename_columns(config: &MigrationConfig) -> Result<()> {
    tracing::info!("Renaming target columns to lowercase...");
    let target = PostgresTarget::new(config.target.url.clone());
    let renamed =
        rename_columns_to_lowercase(&target, &config.plan, &config.retry.policy()).await?;

    if renamed.is_empty() {
        tracing::info!("✓ All column names are already lowercase");
    } else {
        let columns: usize = renamed.iter().map(|(_, n)| n).sum();
        tracing::info!(
            "✓ Renamed {} column(s) across {} table(s)",
            columns,
            renamed.len()
        );
    }
    Ok(())
}
