// ABOUTME: Sanity verifier comparing ordered row windows of source and target tables
// ABOUTME: Checks the whole table when small and random windows when large

use super::progress::{MigrationEvent, ProgressSink, TableProgress, TableStatus};
use crate::database::{ColumnDescriptor, Database, RowSet, SampleWindow, SqlValue, TableRef};
use crate::error::MigrationError;
use crate::utils::RetryPolicy;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Sampling settings for the sanity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    /// Tables with more rows than this are sampled instead of compared whole
    pub large_table_threshold: u64,
    pub sample_iterations: usize,
    /// Fixed RNG seed for reproducible sampling
    pub seed: Option<u64>,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            large_table_threshold: 1_000_000,
            sample_iterations: 5,
            seed: None,
        }
    }
}

/// A `(limit, offset)` pair applied identically to both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub limit: u64,
    pub offset: u64,
}

/// Columns used to order both sides before comparing
///
/// Floating-point columns are left out since their text form is unstable,
/// unless the name contains "id". Falls back to all columns when nothing
/// qualifies.
pub fn ordering_columns(columns: &[ColumnDescriptor]) -> Vec<String> {
    let selected: Vec<String> = columns
        .iter()
        .filter(|c| !c.is_floating_point() || c.name.to_lowercase().contains("id"))
        .map(|c| c.name.clone())
        .collect();

    if selected.is_empty() {
        columns.iter().map(|c| c.name.clone()).collect()
    } else {
        selected
    }
}

/// The windows to compare for a table of `row_count` rows
pub fn plan_windows<R: Rng>(row_count: u64, config: &SanityConfig, rng: &mut R) -> Vec<WindowSpec> {
    if row_count <= config.large_table_threshold {
        return vec![WindowSpec {
            limit: row_count,
            offset: 0,
        }];
    }

    (0..config.sample_iterations.max(1))
        .map(|_| {
            let limit = rng.gen_range(row_count / 10..=row_count);
            let offset = rng.gen_range(0..=row_count - limit);
            WindowSpec { limit, offset }
        })
        .collect()
}

pub struct SanityVerifier<'a> {
    source: &'a dyn Database,
    target: &'a dyn Database,
    config: &'a SanityConfig,
    retry: &'a RetryPolicy,
    sink: &'a dyn ProgressSink,
}

impl<'a> SanityVerifier<'a> {
    pub fn new(
        source: &'a dyn Database,
        target: &'a dyn Database,
        config: &'a SanityConfig,
        retry: &'a RetryPolicy,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            source,
            target,
            config,
            retry,
            sink,
        }
    }

    /// Verify the table described by `progress`, sizing the check from
    /// `progress.source_row_count`
    ///
    /// Row counts recorded on both sides must agree before any window is read.
    /// Sets the status to `Verified` or `Failed`. Returns `Ok(false)` on a
    /// content mismatch and `Err` when a read keeps failing.
    pub async fn verify_table(&self, progress: &mut TableProgress) -> Result<bool> {
        match self.run(progress).await {
            Ok(true) => {
                progress.status = TableStatus::Verified;
                progress.error = None;
                Ok(true)
            }
            Ok(false) => {
                progress.status = TableStatus::Failed;
                Ok(false)
            }
            Err(e) => {
                tracing::error!(
                    "Sanity check of {}.{} could not complete: {:#}",
                    progress.schema,
                    progress.table,
                    e
                );
                progress.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(&self, progress: &mut TableProgress) -> Result<bool> {
        let source = progress.source_ref();
        let target = source.to_target();

        if progress.source_row_count != progress.target_row_count {
            let mismatch = MigrationError::VerificationMismatch {
                table: source.to_string(),
                detail: format!(
                    "{} row(s) on the source, {} on the target",
                    progress.source_row_count, progress.target_row_count
                ),
            };
            tracing::warn!("{}", mismatch);
            progress.error = Some(mismatch.to_string());
            return Ok(false);
        }

        let columns = self
            .retry
            .run(&format!("describe {}", source), || {
                self.source.describe_columns(&source)
            })
            .await?;
        let temporal = temporal_columns(&columns);
        let source_order = ordering_columns(&columns);
        let target_order: Vec<String> = source_order.iter().map(|c| c.to_lowercase()).collect();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let windows = plan_windows(progress.source_row_count, self.config, &mut rng);
        let iterations = windows.len();

        for (idx, spec) in windows.iter().enumerate() {
            let source_window = SampleWindow::new(spec.limit, spec.offset, source_order.clone());
            let target_window = SampleWindow::new(spec.limit, spec.offset, target_order.clone());

            let passed = self
                .retry
                .run(&format!("sanity check {}", source), || {
                    self.compare_window(
                        &source,
                        &target,
                        &source_window,
                        &target_window,
                        &temporal,
                    )
                })
                .await?;

            self.sink.record(&MigrationEvent::SanityIteration {
                table: source.clone(),
                iteration: idx + 1,
                iterations,
                passed,
            });

            if !passed {
                let mismatch = MigrationError::VerificationMismatch {
                    table: source.to_string(),
                    detail: format!(
                        "sampled rows differ (limit {}, offset {})",
                        spec.limit, spec.offset
                    ),
                };
                progress.error = Some(mismatch.to_string());
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn compare_window(
        &self,
        source: &TableRef,
        target: &TableRef,
        source_window: &SampleWindow,
        target_window: &SampleWindow,
        temporal: &[String],
    ) -> Result<bool> {
        let (mut source_rows, mut target_rows) = tokio::try_join!(
            self.source.read_window(source, source_window),
            self.target.read_window(target, target_window)
        )?;

        normalize(&mut source_rows, temporal);
        normalize(&mut target_rows, temporal);

        let same = source_rows.same_content(&target_rows);
        if !same {
            tracing::debug!("Source rows for {}: {:?}", source, source_rows);
            tracing::debug!("Target rows for {}: {:?}", target, target_rows);
        }
        Ok(same)
    }
}

/// Lowercased names of the date-time columns that can carry fractional seconds
pub fn temporal_columns(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| {
            let ty = c.declared_type.trim().to_lowercase();
            ty.starts_with("datetime") || ty.starts_with("timestamp") || ty.starts_with("time")
        })
        .map(|c| c.name.to_lowercase())
        .collect()
}

/// Drop trailing zeros from the fractional seconds of a time value
///
/// MySQL pads `DATETIME(n)`/`TIME(n)` to `n` digits while PostgreSQL prints
/// the shortest form: `10:00:00.500` and `10:00:00.5` are the same instant.
pub fn trim_fractional_seconds(value: &str) -> &str {
    let Some(dot) = value.rfind('.') else {
        return value;
    };
    let (head, fraction) = (&value[..dot], &value[dot + 1..]);
    if !head.contains(':') || fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return value;
    }
    let kept = fraction.trim_end_matches('0');
    if kept.is_empty() {
        head
    } else {
        &value[..dot + 1 + kept.len()]
    }
}

fn normalize(rows: &mut RowSet, temporal: &[String]) {
    rows.coerce_binary();
    rows.lowercase_columns();

    let indexes: Vec<usize> = rows
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| temporal.contains(name))
        .map(|(idx, _)| idx)
        .collect();
    if indexes.is_empty() {
        return;
    }
    for row in &mut rows.rows {
        for &idx in &indexes {
            if let Some(SqlValue::Text(text)) = row.get_mut(idx) {
                let kept = trim_fractional_seconds(text).len();
                text.truncate(kept);
            }
        }
    }
}
