// ABOUTME: Schema structure synchronizer reconciling target DDL with source metadata
// ABOUTME: Emits default, NOT NULL and primary key alterations applied in one transaction

use super::progress::{MigrationEvent, ProgressSink, StructureOutcome};
use crate::database::{ColumnDescriptor, Database, TableRef, TargetDatabase};
use crate::error::MigrationError;
use crate::utils::{quote_pg_ident, quote_pg_literal, RetryPolicy};
use anyhow::Result;

/// Alterations one target column needs to match its source column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDiff {
    pub target_column: String,
    pub needs_default: Option<String>,
    pub needs_not_null: bool,
    pub needs_primary_key: bool,
}

impl ColumnDiff {
    fn new(target_column: &str) -> Self {
        Self {
            target_column: target_column.to_string(),
            needs_default: None,
            needs_not_null: false,
            needs_primary_key: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.needs_default.is_none() && !self.needs_not_null && !self.needs_primary_key
    }
}

/// The DDL batch for one target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructurePlan {
    pub table: TableRef,
    pub diffs: Vec<ColumnDiff>,
}

impl StructurePlan {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    /// All default alterations, then all NOT NULL alterations, then a single
    /// primary key covering every newly keyed column
    pub fn statements(&self) -> Vec<String> {
        let qualified = format!(
            "{}.{}",
            quote_pg_ident(&self.table.schema),
            quote_pg_ident(&self.table.table)
        );
        let mut statements = Vec::new();

        for diff in &self.diffs {
            if let Some(default) = &diff.needs_default {
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    qualified,
                    quote_pg_ident(&diff.target_column),
                    default
                ));
            }
        }

        for diff in self.diffs.iter().filter(|d| d.needs_not_null) {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                qualified,
                quote_pg_ident(&diff.target_column)
            ));
        }

        let key_columns: Vec<String> = self
            .diffs
            .iter()
            .filter(|d| d.needs_primary_key)
            .map(|d| quote_pg_ident(&d.target_column))
            .collect();
        if !key_columns.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                qualified,
                key_columns.join(", ")
            ));
        }

        statements
    }
}

/// Map every source column to its target column by lowercase name
///
/// Both sides must have the same number of columns, and every source column
/// must find a counterpart; anything else is a structural mismatch.
pub fn map_columns(
    table: &TableRef,
    source: &[ColumnDescriptor],
    target: &[ColumnDescriptor],
) -> Result<Vec<usize>, MigrationError> {
    if source.len() != target.len() {
        return Err(MigrationError::structural(
            table.to_string(),
            format!(
                "source has {} column(s), target has {}",
                source.len(),
                target.len()
            ),
        ));
    }

    source
        .iter()
        .map(|column| {
            let key = column.name.to_lowercase();
            target
                .iter()
                .position(|t| t.name.to_lowercase() == key)
                .ok_or_else(|| {
                    MigrationError::structural(
                        table.to_string(),
                        format!("source column '{}' has no target counterpart", column.name),
                    )
                })
        })
        .collect()
}

fn is_numeric_type(declared_type: &str) -> bool {
    const NUMERIC: [&str; 11] = [
        "tinyint", "smallint", "mediumint", "int", "integer", "bigint", "decimal", "numeric",
        "float", "double", "real",
    ];
    let base = declared_type
        .trim()
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_lowercase();
    NUMERIC.contains(&base.as_str()) || base == "year"
}

fn is_quoted(expr: &str) -> bool {
    expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'')
}

/// Render a MySQL column default as a PostgreSQL default expression
///
/// Returns `None` for empty and `NULL` defaults.
pub fn render_default(expression: &str, declared_type: &str) -> Option<String> {
    let trimmed = expression.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }

    let upper = trimmed.to_uppercase();
    if upper.starts_with("CURRENT_TIMESTAMP")
        || upper.starts_with("NOW(")
        || upper.starts_with("LOCALTIMESTAMP")
    {
        return Some("CURRENT_TIMESTAMP".to_string());
    }
    if upper == "CURRENT_DATE" || upper == "CURDATE()" {
        return Some("CURRENT_DATE".to_string());
    }
    if is_quoted(trimmed) {
        return Some(trimmed.to_string());
    }
    if is_numeric_type(declared_type) && trimmed.parse::<f64>().is_ok() {
        return Some(trimmed.to_string());
    }
    Some(quote_pg_literal(trimmed))
}

/// Canonical form of a default expression for equality checks
///
/// Strips PostgreSQL's trailing `::type` casts and literal quotes, and
/// folds `now()` into `current_timestamp`.
pub fn normalize_default(expression: &str) -> String {
    let mut s = expression.trim();
    while let Some(idx) = s.rfind("::") {
        let cast = &s[idx + 2..];
        let is_type = !cast.is_empty()
            && cast
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','));
        if !is_type {
            break;
        }
        s = s[..idx].trim();
    }

    let unquoted = if is_quoted(s) {
        s[1..s.len() - 1].replace("''", "'")
    } else {
        s.to_lowercase()
    };

    match unquoted.as_str() {
        "now()" | "localtimestamp" => "current_timestamp".to_string(),
        _ => unquoted,
    }
}

/// Compare source and target columns and compute the alterations needed
pub fn plan_structure_sync(
    target_table: &TableRef,
    source: &[ColumnDescriptor],
    target: &[ColumnDescriptor],
) -> Result<StructurePlan, MigrationError> {
    let mapping = map_columns(target_table, source, target)?;
    let mut diffs = Vec::new();

    for (src, &idx) in source.iter().zip(&mapping) {
        let tgt = &target[idx];
        let mut diff = ColumnDiff::new(&tgt.name);

        let wanted_default = src
            .default_expression
            .as_deref()
            .and_then(|d| render_default(d, &src.declared_type));
        if let Some(default) = wanted_default {
            let current = tgt.default_expression.as_deref().map(normalize_default);
            if current.as_deref() == Some(normalize_default(&default).as_str()) {
                tracing::debug!("Column {} already defaults to {}", tgt.name, default);
            } else {
                tracing::info!("Adding default value {} for {}", default, tgt.name);
                diff.needs_default = Some(default);
            }
        }

        if !src.is_nullable {
            if tgt.is_nullable {
                tracing::info!("Adding NOT NULL constraint for {}", tgt.name);
                diff.needs_not_null = true;
            } else {
                tracing::info!("Column {} already under NOT NULL constraint", tgt.name);
            }
        }

        if src.is_primary_key {
            if tgt.is_primary_key {
                tracing::info!("Column {} already under primary key constraint", tgt.name);
            } else {
                tracing::info!("Adding primary key for {}", tgt.name);
                diff.needs_primary_key = true;
            }
        }

        if !diff.is_empty() {
            diffs.push(diff);
        }
    }

    Ok(StructurePlan {
        table: target_table.clone(),
        diffs,
    })
}

pub struct StructureSynchronizer<'a> {
    source: &'a dyn Database,
    target: &'a dyn TargetDatabase,
    retry: &'a RetryPolicy,
    sink: &'a dyn ProgressSink,
}

impl<'a> StructureSynchronizer<'a> {
    pub fn new(
        source: &'a dyn Database,
        target: &'a dyn TargetDatabase,
        retry: &'a RetryPolicy,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            source,
            target,
            retry,
            sink,
        }
    }

    /// Compute the alterations for one table without applying them
    pub async fn plan(&self, source_table: &TableRef) -> Result<StructurePlan> {
        let target_table = source_table.to_target();
        let source_columns = self
            .retry
            .run(&format!("describe {}", source_table), || {
                self.source.describe_columns(source_table)
            })
            .await?;
        let target_columns = self
            .retry
            .run(&format!("describe {}", target_table), || {
                self.target.describe_columns(&target_table)
            })
            .await?;
        Ok(plan_structure_sync(&target_table, &source_columns, &target_columns)?)
    }

    /// Synchronize one table; failures are reported, never propagated
    pub async fn sync_table(&self, source_table: &TableRef) -> StructureOutcome {
        tracing::info!("Synchronizing structure of {}", source_table);

        let outcome = match self.apply(source_table).await {
            Ok(0) => StructureOutcome::NothingToSync,
            Ok(statements) => StructureOutcome::Applied { statements },
            Err(e) => StructureOutcome::Failed {
                error: format!("{:#}", e),
            },
        };

        self.sink.record(&MigrationEvent::StructureSynced {
            table: source_table.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn apply(&self, source_table: &TableRef) -> Result<usize> {
        let plan = self.plan(source_table).await?;
        if plan.is_empty() {
            return Ok(0);
        }
        let statements = plan.statements();
        tracing::debug!("Structure DDL for {}: {}", plan.table, statements.join("; "));
        self.target.execute_transaction(&statements).await?;
        Ok(statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::MemoryDatabase;
    use crate::migration::progress::RecordingSink;
    use std::time::Duration;

    fn target_table() -> TableRef {
        TableRef::new("shop", "orders")
    }

    /// What the target catalog reports after the plan has been executed
    fn apply_plan(plan: &StructurePlan, target: &[ColumnDescriptor]) -> Vec<ColumnDescriptor> {
        let mut updated = target.to_vec();
        for diff in &plan.diffs {
            let column = updated
                .iter_mut()
                .find(|c| c.name == diff.target_column)
                .unwrap();
            if let Some(default) = &diff.needs_default {
                column.default_expression = Some(match default.as_str() {
                    "CURRENT_TIMESTAMP" => "CURRENT_TIMESTAMP".to_string(),
                    d if d.starts_with('\'') => format!("{}::character varying", d),
                    d => d.to_string(),
                });
            }
            if diff.needs_not_null || diff.needs_primary_key {
                column.is_nullable = false;
            }
            if diff.needs_primary_key {
                column.is_primary_key = true;
            }
        }
        updated
    }

    #[test]
    fn test_created_at_needs_default_and_not_null() {
        let source = vec![
            ColumnDescriptor::new("Id", "int(11)").primary_key(),
            ColumnDescriptor::new("CreatedAt", "datetime")
                .not_null()
                .with_default("CURRENT_TIMESTAMP"),
        ];
        let target = vec![
            ColumnDescriptor::new("id", "integer").not_null(),
            ColumnDescriptor::new("createdat", "timestamp without time zone"),
        ];
        let mut target = target;
        target[0].is_primary_key = true;

        let plan = plan_structure_sync(&target_table(), &source, &target).unwrap();
        assert_eq!(
            plan.statements(),
            vec![
                "ALTER TABLE \"shop\".\"orders\" ALTER COLUMN \"createdat\" SET DEFAULT CURRENT_TIMESTAMP",
                "ALTER TABLE \"shop\".\"orders\" ALTER COLUMN \"createdat\" SET NOT NULL",
            ]
        );
    }

    #[test]
    fn test_statement_order_and_single_primary_key() {
        let source = vec![
            ColumnDescriptor::new("OrderId", "int(11)").primary_key(),
            ColumnDescriptor::new("LineNo", "int(11)").primary_key(),
            ColumnDescriptor::new("Status", "varchar(16)")
                .not_null()
                .with_default("new"),
        ];
        let target = vec![
            ColumnDescriptor::new("orderid", "integer"),
            ColumnDescriptor::new("lineno", "integer"),
            ColumnDescriptor::new("status", "character varying"),
        ];

        let statements = plan_structure_sync(&target_table(), &source, &target)
            .unwrap()
            .statements();
        assert_eq!(statements.len(), 5);
        assert!(statements[0].ends_with("\"status\" SET DEFAULT 'new'"));
        assert!(statements[1].ends_with("\"orderid\" SET NOT NULL"));
        assert!(statements[2].ends_with("\"lineno\" SET NOT NULL"));
        assert!(statements[3].ends_with("\"status\" SET NOT NULL"));
        assert!(statements[4].ends_with("ADD PRIMARY KEY (\"orderid\", \"lineno\")"));
    }

    #[test]
    fn test_second_run_is_empty() {
        let source = vec![
            ColumnDescriptor::new("Id", "bigint(20)").primary_key(),
            ColumnDescriptor::new("Qty", "int(11)").not_null().with_default("0"),
            ColumnDescriptor::new("Label", "varchar(10)").with_default("n/a"),
            ColumnDescriptor::new("CreatedAt", "timestamp")
                .not_null()
                .with_default("CURRENT_TIMESTAMP"),
        ];
        let target = vec![
            ColumnDescriptor::new("id", "bigint"),
            ColumnDescriptor::new("qty", "integer"),
            ColumnDescriptor::new("label", "character varying"),
            ColumnDescriptor::new("createdat", "timestamp without time zone"),
        ];

        let first = plan_structure_sync(&target_table(), &source, &target).unwrap();
        assert!(!first.is_empty());

        let synced = apply_plan(&first, &target);
        let second = plan_structure_sync(&target_table(), &source, &synced).unwrap();
        assert!(second.is_empty(), "unexpected diffs: {:?}", second.diffs);
        assert!(second.statements().is_empty());
    }

    #[test]
    fn test_column_count_mismatch_is_structural_error() {
        let source = vec![
            ColumnDescriptor::new("a", "int"),
            ColumnDescriptor::new("b", "int"),
        ];
        let target = vec![ColumnDescriptor::new("a", "integer")];
        let err = plan_structure_sync(&target_table(), &source, &target).unwrap_err();
        assert!(matches!(err, MigrationError::StructuralMismatch { .. }));
    }

    #[test]
    fn test_mapping_is_by_name_not_position() {
        let source = vec![
            ColumnDescriptor::new("A", "int").not_null(),
            ColumnDescriptor::new("B", "int"),
        ];
        let target = vec![
            ColumnDescriptor::new("b", "integer"),
            ColumnDescriptor::new("a", "integer"),
        ];
        assert_eq!(map_columns(&target_table(), &source, &target).unwrap(), vec![1, 0]);

        let plan = plan_structure_sync(&target_table(), &source, &target).unwrap();
        assert_eq!(plan.diffs.len(), 1);
        assert_eq!(plan.diffs[0].target_column, "a");

        let renamed = vec![
            ColumnDescriptor::new("a", "integer"),
            ColumnDescriptor::new("c", "integer"),
        ];
        assert!(map_columns(&target_table(), &source, &renamed).is_err());
    }

    #[test]
    fn test_render_default() {
        assert_eq!(render_default("", "int"), None);
        assert_eq!(render_default("NULL", "varchar(5)"), None);
        assert_eq!(render_default("0", "tinyint(1)").as_deref(), Some("0"));
        assert_eq!(render_default("-1.5", "decimal(5,2)").as_deref(), Some("-1.5"));
        assert_eq!(render_default("12", "varchar(5)").as_deref(), Some("'12'"));
        assert_eq!(render_default("O'Brien", "varchar(20)").as_deref(), Some("'O''Brien'"));
        assert_eq!(render_default("'x'", "char(1)").as_deref(), Some("'x'"));
        assert_eq!(
            render_default("current_timestamp()", "datetime").as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert_eq!(render_default("curdate()", "date").as_deref(), Some("CURRENT_DATE"));
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("'abc'::character varying"), "abc");
        assert_eq!(normalize_default("'-1'::integer"), "-1");
        assert_eq!(normalize_default("'a::b'::text"), "a::b");
        assert_eq!(normalize_default("CURRENT_TIMESTAMP"), "current_timestamp");
        assert_eq!(normalize_default("now()"), "current_timestamp");
        assert_eq!(normalize_default("0"), "0");
    }

    #[tokio::test]
    async fn test_sync_table_executes_one_transaction() {
        let source_ref = TableRef::new("Shop", "Orders");
        let source = MemoryDatabase::new().with_table(
            source_ref.clone(),
            vec![
                ColumnDescriptor::new("Id", "int(11)").primary_key(),
                ColumnDescriptor::new("CreatedAt", "datetime")
                    .not_null()
                    .with_default("CURRENT_TIMESTAMP"),
            ],
            vec![],
        );
        let target = MemoryDatabase::new().with_table(
            source_ref.to_target(),
            vec![
                ColumnDescriptor::new("id", "integer"),
                ColumnDescriptor::new("createdat", "timestamp"),
            ],
            vec![],
        );
        let sink = RecordingSink::default();
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let sync = StructureSynchronizer::new(&source, &target, &policy, &sink);

        let outcome = sync.sync_table(&source_ref).await;
        assert_eq!(outcome, StructureOutcome::Applied { statements: 4 });
        assert_eq!(target.transactions().len(), 1);
        assert!(target.transactions()[0][3].contains("ADD PRIMARY KEY (\"id\")"));
    }

    #[tokio::test]
    async fn test_sync_table_reports_mismatch_without_failing() {
        let source_ref = TableRef::new("shop", "orders");
        let source = MemoryDatabase::new().with_table(
            source_ref.clone(),
            vec![
                ColumnDescriptor::new("id", "int"),
                ColumnDescriptor::new("extra", "int"),
            ],
            vec![],
        );
        let target = MemoryDatabase::new().with_table(
            source_ref.to_target(),
            vec![ColumnDescriptor::new("id", "integer")],
            vec![],
        );
        let sink = RecordingSink::default();
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let sync = StructureSynchronizer::new(&source, &target, &policy, &sink);

        let outcome = sync.sync_table(&source_ref).await;
        assert!(matches!(outcome, StructureOutcome::Failed { .. }));
        assert!(target.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_sync_table_nothing_to_do() {
        let source_ref = TableRef::new("shop", "notes");
        let source = MemoryDatabase::new().with_table(
            source_ref.clone(),
            vec![ColumnDescriptor::new("body", "text")],
            vec![],
        );
        let target = MemoryDatabase::new().with_table(
            source_ref.to_target(),
            vec![ColumnDescriptor::new("body", "text")],
            vec![],
        );
        let sink = RecordingSink::default();
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));
        let sync = StructureSynchronizer::new(&source, &target, &policy, &sink);

        assert_eq!(sync.sync_table(&source_ref).await, StructureOutcome::NothingToSync);
        assert!(target.transactions().is_empty());
    }
}
