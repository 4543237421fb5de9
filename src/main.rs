// ABOUTME: CLI entry point for mysql-pg-migrator
// ABOUTME: Parses commands, sets up logging and routes to the command handlers

use anyhow::Context;
use clap::{Parser, Subcommand};
use mysql_pg_migrator::commands::{self, MigrateOptions};
use mysql_pg_migrator::config::{load_config, DEFAULT_CONFIG_PATH};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "mysql-pg-migrator")]
#[command(about = "Resumable MySQL to PostgreSQL migration", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transfer, verify and synchronize structure for every planned table
    Migrate {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Lowercase target column names after the transfer
        #[arg(long)]
        rename_columns: bool,
        /// Skip the structure synchronization pass
        #[arg(long)]
        skip_structure: bool,
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Compare row counts and sampled rows without transferring
    Verify {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Apply defaults, NOT NULL constraints and primary keys to migrated tables
    SyncStructure {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Rename mixed-case target columns to lowercase
    RenameColumns {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Drop every non-system schema from the target database
    Purge {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Console logging, plus a plain-text log file when `log_dir` is given
fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<()> {
    // Default to INFO level if RUST_LOG not set
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let name = chrono::Local::now()
                .format("migration_%Y-%m-%d_%H-%M-%S.log")
                .to_string();
            let path = dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Migrate {
            config,
            rename_columns,
            skip_structure,
            report,
        } => {
            let config = load_config(&config)?;
            commands::migrate(
                &config,
                MigrateOptions {
                    rename_columns,
                    skip_structure,
                    report,
                },
            )
            .await
        }
        Commands::Verify { config, report } => {
            let config = load_config(&config)?;
            commands::verify(&config, report.as_deref()).await
        }
        Commands::SyncStructure { config } => {
            let config = load_config(&config)?;
            commands::sync_structure(&config).await
        }
        Commands::RenameColumns { config } => {
            let config = load_config(&config)?;
            commands::rename_columns(&config).await
        }
        Commands::Purge { config, yes } => {
            let config = load_config(&config)?;
            commands::purge(&config, yes).await
        }
    }
}
