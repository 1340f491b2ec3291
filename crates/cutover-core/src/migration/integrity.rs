//! Structural integrity gate run around migrations.
//!
//! Lighter than the [`DataValidator`](crate::validation::DataValidator): it
//! is driven by table names and stops at the first violation.

use crate::config::{IntegrityRules, TableRules};
use crate::error::CutoverError;
use crate::store::{JoinOn, Store};
use tracing::{debug, warn};

/// Run orphan then duplicate detection for every table, in order.
///
/// Every table must be registered in `rules`, possibly with no rules;
/// unknown names are rejected before any check runs.
pub(crate) fn check_tables(
    store: &dyn Store,
    rules: &IntegrityRules,
    tables: &[&str],
) -> Result<(), CutoverError> {
    let unknown: Vec<&str> = tables
        .iter()
        .copied()
        .filter(|table| rules.get(table).is_none())
        .collect();
    if !unknown.is_empty() {
        let known: Vec<&str> = rules.tables().collect();
        warn!(?unknown, "integrity check requested for unregistered tables");
        return Err(CutoverError::InvalidInput(format!(
            "no integrity rules registered for {} (known tables: {})",
            unknown.join(", "),
            known.join(", ")
        )));
    }

    for &table in tables {
        if let Some(table_rules) = rules.get(table) {
            check_table(store, table, table_rules)?;
        }
    }
    Ok(())
}

fn check_table(store: &dyn Store, table: &str, rules: &TableRules) -> Result<(), CutoverError> {
    for reference in &rules.references {
        let join = JoinOn::new(&reference.column, &reference.parent_column);
        let orphans = store
            .left_join_is_null_count(table, &reference.parent_table, &join)
            .map_err(|e| CutoverError::persistence(format!("orphan check on {}", table), e))?;

        if orphans > 0 {
            return Err(CutoverError::Integrity {
                table: table.to_string(),
                message: format!(
                    "{} orphaned records ({} -> {}.{})",
                    orphans, reference.column, reference.parent_table, reference.parent_column
                ),
            });
        }
    }

    for key in &rules.unique_keys {
        let columns: Vec<&str> = key.iter().map(String::as_str).collect();
        let duplicates = store
            .grouped_count_having(table, &columns, 1)
            .map_err(|e| CutoverError::persistence(format!("duplicate check on {}", table), e))?;

        if duplicates > 0 {
            return Err(CutoverError::Integrity {
                table: table.to_string(),
                message: format!(
                    "{} duplicate groups on ({})",
                    duplicates,
                    columns.join(", ")
                ),
            });
        }
    }

    debug!(table, "integrity checks passed");
    Ok(())
}
