//! Validation findings and suite aggregation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// No violations.
    Pass,
    /// Hard violations.
    Fail,
    /// Soft violations that do not block a cutover.
    Warning,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "pass"),
            ValidationStatus::Fail => write!(f, "fail"),
            ValidationStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Finding produced by one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Table the check inspected.
    pub table_name: String,
    /// Name of the check.
    pub check_type: String,
    /// Outcome.
    pub status: ValidationStatus,
    /// Human readable summary.
    pub message: String,
    /// Rows in the table when the check ran.
    pub record_count: u64,
    /// Rows or groups in violation.
    pub error_count: u64,
    /// Check parameters.
    pub details: Value,
    /// When the check started, in microseconds since the epoch.
    pub timestamp: u64,
    /// Elapsed time in microseconds.
    pub duration: u64,
}

impl ValidationResult {
    /// Whether the check found a hard violation.
    pub fn is_failure(&self) -> bool {
        self.status == ValidationStatus::Fail
    }
}

/// Aggregate status of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    /// Every check passed.
    Completed,
    /// No failures, at least one warning.
    CompletedWithWarnings,
    /// At least one failure.
    Failed,
}

impl SuiteStatus {
    /// Fold check outcomes: any `fail` wins over any `warning`.
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let statuses = results.iter().map(|r| r.status);
        let mut status = SuiteStatus::Completed;
        for s in statuses {
            match s {
                ValidationStatus::Fail => return SuiteStatus::Failed,
                ValidationStatus::Warning => status = SuiteStatus::CompletedWithWarnings,
                ValidationStatus::Pass => {}
            }
        }
        status
    }
}

impl std::fmt::Display for SuiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuiteStatus::Completed => write!(f, "completed"),
            SuiteStatus::CompletedWithWarnings => write!(f, "completed_with_warnings"),
            SuiteStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Named set of check results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSuite {
    /// Suite name.
    pub name: String,
    /// Results in check declaration order.
    pub results: Vec<ValidationResult>,
    /// Aggregate status.
    pub status: SuiteStatus,
    /// When the suite started, in microseconds since the epoch.
    pub started_at: u64,
    /// Elapsed time in microseconds.
    pub duration: u64,
}

impl ValidationSuite {
    /// Results with status `fail`.
    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Results with status `warning`.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results
            .iter()
            .filter(|r| r.status == ValidationStatus::Warning)
    }
}
