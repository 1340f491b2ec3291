//! Metric thresholds that call for an automatic rollback.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Live metric a trigger watches. Unknown names are kept as
/// [`TriggerType::Custom`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    /// Fraction or percentage of failed requests.
    #[default]
    ErrorRate,
    /// Request latency.
    Latency,
    /// Failed validation checks.
    ValidationFailure,
    /// Any other metric name.
    Custom(String),
}

impl TriggerType {
    /// Metric key this trigger reads.
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::ErrorRate => "error_rate",
            TriggerType::Latency => "latency",
            TriggerType::ValidationFailure => "validation_failure",
            TriggerType::Custom(name) => name,
        }
    }
}

impl From<String> for TriggerType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "error_rate" => TriggerType::ErrorRate,
            "latency" => TriggerType::Latency,
            "validation_failure" => TriggerType::ValidationFailure,
            _ => TriggerType::Custom(name),
        }
    }
}

impl From<&str> for TriggerType {
    fn from(name: &str) -> Self {
        TriggerType::from(name.to_string())
    }
}

impl From<TriggerType> for String {
    fn from(trigger_type: TriggerType) -> Self {
        trigger_type.as_str().to_string()
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold rule over a live metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackTrigger {
    /// Unique trigger ID.
    pub id: String,
    /// Migration the trigger guards.
    pub migration_id: String,
    /// Metric watched.
    pub trigger_type: TriggerType,
    /// Value the metric must strictly exceed to fire.
    pub threshold: f64,
    /// Observation window in minutes. Advisory; the caller aggregates.
    pub time_window: u32,
    /// Inactive triggers are never evaluated.
    pub is_active: bool,
    /// When the trigger last fired.
    pub last_triggered: Option<u64>,
    /// When the trigger was created.
    pub created_at: u64,
}

impl RollbackTrigger {
    /// Table holding triggers.
    pub const TABLE: &'static str = "rollback_triggers";

    /// The metric value that breaches this trigger, if any.
    ///
    /// Returns `None` when the trigger is inactive, the metric is absent, or
    /// the value does not strictly exceed the threshold.
    pub fn evaluate(&self, metrics: &HashMap<String, f64>) -> Option<f64> {
        if !self.is_active {
            return None;
        }
        metrics
            .get(self.trigger_type.as_str())
            .copied()
            .filter(|&value| value > self.threshold)
    }

    /// Human readable reason for a breach at `value`.
    pub fn reason(&self, value: f64) -> String {
        format!(
            "{} threshold exceeded: {:.2} > {:.2} (window {}m)",
            self.trigger_type, value, self.threshold, self.time_window
        )
    }
}

/// Result of evaluating the triggers of a migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// No trigger fired.
    NotTriggered,
    /// The first breached trigger.
    Triggered {
        /// Trigger that fired.
        trigger_id: String,
        /// Metric that was breached.
        trigger_type: TriggerType,
        /// Observed value.
        value: f64,
        /// Configured threshold.
        threshold: f64,
        /// Human readable reason.
        reason: String,
    },
}

impl TriggerOutcome {
    /// Whether a rollback should be executed.
    pub fn is_triggered(&self) -> bool {
        matches!(self, TriggerOutcome::Triggered { .. })
    }

    /// Reason for the rollback; empty when nothing fired.
    pub fn reason(&self) -> &str {
        match self {
            TriggerOutcome::NotTriggered => "",
            TriggerOutcome::Triggered { reason, .. } => reason,
        }
    }
}
