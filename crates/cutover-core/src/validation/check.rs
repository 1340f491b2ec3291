//! Declarative integrity checks.

use super::result::{ValidationResult, ValidationStatus};
use crate::error::{CutoverError, Error};
use crate::store::{current_timestamp, Filter, JoinOn, Store};
use serde_json::{json, Value};
use std::time::Instant;

/// Status reported when a check finds violations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Severity {
    /// Violations block the cutover.
    #[default]
    Fail,
    /// Violations are reported but tolerated.
    Warning,
}

impl From<Severity> for ValidationStatus {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Fail => ValidationStatus::Fail,
            Severity::Warning => ValidationStatus::Warning,
        }
    }
}

/// What a check looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    /// Rows where `column` is null or blank.
    RequiredField { column: String },
    /// Rows whose `column` matches no `parent_table.parent_column`.
    Orphans {
        column: String,
        parent_table: String,
        parent_column: String,
    },
    /// Groups of rows sharing the same values in `columns`.
    Duplicates { columns: Vec<String> },
    /// Rows where `later` sorts before `earlier`.
    FieldOrder { earlier: String, later: String },
}

/// A named check over one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Reported as the result's `check_type`.
    pub name: String,
    /// Table inspected.
    pub table: String,
    /// Violation searched for.
    pub kind: CheckKind,
    /// Status when violations are found.
    pub severity: Severity,
}

impl Check {
    fn new(name: impl Into<String>, table: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            kind,
            severity: Severity::Fail,
        }
    }

    /// Every row must carry a non-blank `column`.
    pub fn required(name: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(
            name,
            table,
            CheckKind::RequiredField {
                column: column.into(),
            },
        )
    }

    /// Every non-null `column` must reference an existing parent row.
    pub fn orphans(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            table,
            CheckKind::Orphans {
                column: column.into(),
                parent_table: parent_table.into(),
                parent_column: parent_column.into(),
            },
        )
    }

    /// No two rows may share the same values in `columns`.
    pub fn duplicates<S: Into<String>>(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            table,
            CheckKind::Duplicates {
                columns: columns.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// `later` must not sort before `earlier`.
    pub fn field_order(
        name: impl Into<String>,
        table: impl Into<String>,
        earlier: impl Into<String>,
        later: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            table,
            CheckKind::FieldOrder {
                earlier: earlier.into(),
                later: later.into(),
            },
        )
    }

    /// Report violations as warnings instead of failures.
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Run the check. Store errors are propagated rather than reported as a
    /// failed result.
    pub fn run(&self, store: &dyn Store) -> Result<ValidationResult, CutoverError> {
        let timestamp = current_timestamp();
        let started = Instant::now();
        let operation = format!("validation check '{}'", self.name);
        let persistence = |e: Error| CutoverError::persistence(operation.as_str(), e);

        let record_count = store.count(&self.table, &Filter::All).map_err(persistence)?;
        let (error_count, details, violation) = match &self.kind {
            CheckKind::RequiredField { column } => (
                store
                    .count(&self.table, &Filter::IsBlank(column.clone()))
                    .map_err(persistence)?,
                json!({ "column": column }),
                format!("records missing {}", column),
            ),
            CheckKind::Orphans {
                column,
                parent_table,
                parent_column,
            } => (
                store
                    .left_join_is_null_count(
                        &self.table,
                        parent_table,
                        &JoinOn::new(column.as_str(), parent_column.as_str()),
                    )
                    .map_err(persistence)?,
                json!({
                    "column": column,
                    "parent_table": parent_table,
                    "parent_column": parent_column,
                }),
                format!("{} values without a matching {}.{}", column, parent_table, parent_column),
            ),
            CheckKind::Duplicates { columns } => {
                let group_by: Vec<&str> = columns.iter().map(String::as_str).collect();
                (
                    store
                        .grouped_count_having(&self.table, &group_by, 1)
                        .map_err(persistence)?,
                    json!({ "columns": columns }),
                    format!("duplicate ({}) groups", columns.join(", ")),
                )
            }
            CheckKind::FieldOrder { earlier, later } => (
                store
                    .count(
                        &self.table,
                        &Filter::FieldLt(later.clone(), earlier.clone()),
                    )
                    .map_err(persistence)?,
                json!({ "earlier": earlier, "later": later }),
                format!("records with {} before {}", later, earlier),
            ),
        };

        let (status, message) = if error_count == 0 {
            (ValidationStatus::Pass, format!("no {}", violation))
        } else {
            (self.severity.into(), format!("{} {}", error_count, violation))
        };

        Ok(ValidationResult {
            table_name: self.table.clone(),
            check_type: self.name.clone(),
            status,
            message,
            record_count,
            error_count,
            details: with_severity(details, self.severity),
            timestamp,
            duration: started.elapsed().as_micros() as u64,
        })
    }
}

fn with_severity(mut details: Value, severity: Severity) -> Value {
    if let Value::Object(map) = &mut details {
        let tag = match severity {
            Severity::Fail => "fail",
            Severity::Warning => "warning",
        };
        map.insert("severity".to_string(), Value::from(tag));
    }
    details
}
