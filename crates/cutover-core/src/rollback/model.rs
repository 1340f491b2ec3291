//! Rollback plans and their steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State of a rollback plan or rollback step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Prepared, not yet executed.
    #[default]
    Pending,
    /// Execution in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Stopped at a failing step.
    Failed,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Pending => write!(f, "pending"),
            PlanStatus::Running => write!(f, "running"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Kind of action a rollback step performs. Selects the executor.
///
/// Unknown tags are preserved as [`StepType::Custom`] so that new executors
/// can be registered without changing this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    /// Database statement.
    Sql,
    /// Call to an HTTP endpoint.
    ApiCall,
    /// File system change.
    FileOperation,
    /// Any other tag.
    Custom(String),
}

impl StepType {
    /// Wire tag of the step type.
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Sql => "sql",
            StepType::ApiCall => "api_call",
            StepType::FileOperation => "file_operation",
            StepType::Custom(tag) => tag,
        }
    }
}

impl From<String> for StepType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "sql" => StepType::Sql,
            "api_call" => StepType::ApiCall,
            "file_operation" => StepType::FileOperation,
            _ => StepType::Custom(tag),
        }
    }
}

impl From<&str> for StepType {
    fn from(tag: &str) -> Self {
        StepType::from(tag.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        step_type.as_str().to_string()
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single compensating action within a rollback plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStep {
    /// Unique step ID.
    pub id: String,
    /// Owning plan.
    pub plan_id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Position within the plan, starting at 1.
    pub step_order: u32,
    /// Executor selector.
    pub step_type: StepType,
    /// Opaque command for the executor.
    #[serde(default)]
    pub command: String,
    /// Opaque parameters for the executor.
    #[serde(default)]
    pub parameters: Value,
    /// Current status.
    #[serde(default)]
    pub status: PlanStatus,
    /// When execution of the step started.
    #[serde(default)]
    pub started_at: Option<u64>,
    /// When execution of the step finished.
    #[serde(default)]
    pub completed_at: Option<u64>,
    /// Error reported by the executor.
    #[serde(default)]
    pub error_msg: String,
}

impl RollbackStep {
    /// Table holding rollback steps.
    pub const TABLE: &'static str = "rollback_steps";

    /// Create a pending step.
    pub fn new(
        plan_id: impl Into<String>,
        step_order: u32,
        step_type: StepType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            plan_id: plan_id.into(),
            name: name.into(),
            description: String::new(),
            step_order,
            step_type,
            command: String::new(),
            parameters: Value::Null,
            status: PlanStatus::Pending,
            started_at: None,
            completed_at: None,
            error_msg: String::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the command.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Set the parameters.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// An ordered set of compensating actions for a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackPlan {
    /// Unique plan ID.
    pub id: String,
    /// Migration this plan reverses.
    pub migration_id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Steps ordered by `step_order`. Stored in their own table.
    pub steps: Vec<RollbackStep>,
    /// Current status.
    pub status: PlanStatus,
    /// When execution started.
    pub executed_at: Option<u64>,
    /// When execution finished successfully.
    pub completed_at: Option<u64>,
    /// When the plan was created.
    pub created_at: u64,
}

impl RollbackPlan {
    /// Table holding rollback plans.
    pub const TABLE: &'static str = "rollback_plans";

    /// Steps not yet completed.
    pub fn remaining_steps(&self) -> impl Iterator<Item = &RollbackStep> {
        self.steps
            .iter()
            .filter(|s| s.status != PlanStatus::Completed)
    }
}

/// Result of executing a rollback plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackOutcome {
    /// Plan that was executed.
    pub plan_id: String,
    /// Final plan status.
    pub status: PlanStatus,
    /// Steps run during this invocation.
    pub steps_executed: usize,
    /// Steps skipped because an earlier invocation completed them.
    pub steps_skipped: usize,
    /// Total steps in the plan.
    pub total_steps: usize,
}
