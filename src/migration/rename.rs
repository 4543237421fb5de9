// ABOUTME: Lowercases target column names for every table of a migration plan
// ABOUTME: Each table's renames run in a single transaction

use super::plan::{MigrationPlan, TableSelector};
use crate::database::{ColumnDescriptor, TableRef, TargetDatabase};
use crate::utils::{quote_pg_ident, RetryPolicy};
use anyhow::{Context, Result};

/// `RENAME COLUMN` statements for every column whose name is not lowercase
pub fn rename_statements(table: &TableRef, columns: &[ColumnDescriptor]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.name != c.name.to_lowercase())
        .map(|c| {
            format!(
                "ALTER TABLE {}.{} RENAME COLUMN {} TO {}",
                quote_pg_ident(&table.schema),
                quote_pg_ident(&table.table),
                quote_pg_ident(&c.name),
                quote_pg_ident(&c.name.to_lowercase())
            )
        })
        .collect()
}

/// Rename columns to lowercase in the target tables the plan selects
///
/// Returns each table that had columns renamed with the number of renames.
pub async fn rename_columns_to_lowercase(
    target: &dyn TargetDatabase,
    plan: &MigrationPlan,
    retry: &RetryPolicy,
) -> Result<Vec<(TableRef, usize)>> {
    let mut renamed = Vec::new();

    for (schema, selector) in plan.schemas() {
        let target_schema = schema.to_lowercase();
        let available = retry
            .run(&format!("list tables of {}", target_schema), || {
                target.list_tables(&target_schema)
            })
            .await?;
        let wanted = match selector {
            TableSelector::All => TableSelector::All,
            TableSelector::Tables(list) => {
                TableSelector::Tables(list.iter().map(|t| t.to_lowercase()).collect())
            }
        };

        for table in wanted.resolve(&available).tables {
            let table = TableRef::new(target_schema.clone(), table);
            let columns = retry
                .run(&format!("describe {}", table), || target.describe_columns(&table))
                .await?;
            let statements = rename_statements(&table, &columns);
            if statements.is_empty() {
                continue;
            }

            target
                .execute_transaction(&statements)
                .await
                .with_context(|| format!("Failed to rename columns of {}", table))?;
            tracing::info!("✓ Renamed {} column(s) of {} to lowercase", statements.len(), table);
            renamed.push((table, statements.len()));
        }
    }

    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::MemoryDatabase;
    use std::time::Duration;

    #[test]
    fn test_only_mixed_case_columns_are_renamed() {
        let table = TableRef::new("shop", "orders");
        let statements = rename_statements(
            &table,
            &[
                ColumnDescriptor::new("id", "integer"),
                ColumnDescriptor::new("CustomerName", "text"),
            ],
        );
        assert_eq!(
            statements,
            vec!["ALTER TABLE \"shop\".\"orders\" RENAME COLUMN \"CustomerName\" TO \"customername\""]
        );
    }

    #[tokio::test]
    async fn test_renames_selected_tables() {
        let target = MemoryDatabase::new()
            .with_table(
                TableRef::new("shop", "orders"),
                vec![ColumnDescriptor::new("OrderId", "integer")],
                vec![],
            )
            .with_table(
                TableRef::new("shop", "notes"),
                vec![ColumnDescriptor::new("Body", "text")],
                vec![],
            );
        let plan = MigrationPlan::new()
            .with_schema("Shop", TableSelector::Tables(vec!["Orders".to_string()]));
        let policy = RetryPolicy::fixed(1, Duration::from_millis(1));

        let renamed = rename_columns_to_lowercase(&target, &plan, &policy).await.unwrap();
        assert_eq!(renamed, vec![(TableRef::new("shop", "orders"), 1)]);
        assert_eq!(target.transactions().len(), 1);
    }
}
