// ABOUTME: Purge command implementation - drops every non-system schema on the target
// ABOUTME: Lists what will be dropped and asks for confirmation first

use crate::config::MigrationConfig;
use crate::database::TargetDatabase;
use crate::postgres::{connect_with_retry, target::list_purgeable_schemas, PostgresTarget};
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Drop every user schema in the target database, with all its objects
///
/// `public` and the system schemas are never touched. Without `yes`, the
/// schemas are listed and the operator must confirm.
///
/// # Arguments
///
/// * `config` - Migration configuration (only the target is used)
/// * `yes` - Skip the confirmation prompt
///
/// # Errors
///
/// Returns an error if the target is unreachable or any drop fails; in that
/// case the whole purge is rolled back.
pub async fn purge(config: &MigrationConfig, yes: bool) -> Result<()> {
    let client = connect_with_retry(&config.target.url)
        .await
        .context("Failed to connect to target database")?;
    let schemas = list_purgeable_schemas(&client).await?;
    drop(client);

    if schemas.is_empty() {
        tracing::info!("✓ No schemas to purge");
        return Ok(());
    }

    tracing::warn!("⚠ The following schemas will be dropped with all their objects:");
    for schema in &schemas {
        tracing::warn!("  - {}", schema);
    }

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Drop {} schema(s) from the target?", schemas.len()))
            .default(false)
            .interact()
            .context("Failed to get purge confirmation")?;
        if !confirmed {
            tracing::info!("Purge cancelled");
            return Ok(());
        }
    }

    let target = PostgresTarget::new(config.target.url.clone());
    let dropped = config
        .retry
        .policy()
        .run("purge target schemas", || target.purge_schemas())
        .await?;

    tracing::info!("✓ Dropped {} schema(s)", dropped.len());
    Ok(())
}
