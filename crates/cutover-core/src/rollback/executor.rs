//! Rollback step executors.
//!
//! Each [`StepType`] maps to one [`StepExecutor`] in an [`ExecutorRegistry`].
//! The bundled executors validate the step, log it and pause; deployments
//! register real implementations for the step types they use.

use super::model::{RollbackStep, StepType};
use crate::config::DEFAULT_STEP_DELAY_MS;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Errors raised while executing a rollback step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step's command or parameters are unusable.
    #[error("invalid step parameters: {0}")]
    InvalidParameters(String),

    /// The action ran and failed.
    #[error("{0}")]
    Failed(String),

    /// No executor is registered for the step type.
    #[error("no executor registered for step type '{0}'")]
    Unsupported(StepType),
}

/// Strategy for one kind of rollback step.
pub trait StepExecutor: Send + Sync {
    /// Perform the step's action.
    fn execute(&self, step: &RollbackStep) -> Result<(), StepError>;
}

impl<F> StepExecutor for F
where
    F: Fn(&RollbackStep) -> Result<(), StepError> + Send + Sync,
{
    fn execute(&self, step: &RollbackStep) -> Result<(), StepError> {
        self(step)
    }
}

fn require_command(step: &RollbackStep) -> Result<(), StepError> {
    if step.command.trim().is_empty() {
        return Err(StepError::InvalidParameters(format!(
            "step '{}' has no command",
            step.name
        )));
    }
    Ok(())
}

/// Placeholder executor for `sql` steps.
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    delay: Duration,
}

impl SqlExecutor {
    /// Create an executor that pauses for `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl StepExecutor for SqlExecutor {
    fn execute(&self, step: &RollbackStep) -> Result<(), StepError> {
        require_command(step)?;
        info!(step = %step.name, command = %step.command, "executing sql rollback step");
        std::thread::sleep(self.delay);
        Ok(())
    }
}

/// Placeholder executor for `api_call` steps.
#[derive(Debug, Clone)]
pub struct ApiCallExecutor {
    delay: Duration,
}

impl ApiCallExecutor {
    /// Create an executor that pauses for `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl StepExecutor for ApiCallExecutor {
    fn execute(&self, step: &RollbackStep) -> Result<(), StepError> {
        require_command(step)?;
        if let Some(timeout) = step.parameters.get("timeout_secs") {
            if !timeout.as_f64().is_some_and(|t| t > 0.0) {
                return Err(StepError::InvalidParameters(format!(
                    "timeout_secs must be a positive number, got {}",
                    timeout
                )));
            }
        }
        info!(
            step = %step.name,
            command = %step.command,
            parameters = %step.parameters,
            "executing api rollback step"
        );
        std::thread::sleep(self.delay);
        Ok(())
    }
}

/// Placeholder executor for `file_operation` steps.
#[derive(Debug, Clone)]
pub struct FileOperationExecutor {
    delay: Duration,
}

impl FileOperationExecutor {
    /// Create an executor that pauses for `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl StepExecutor for FileOperationExecutor {
    fn execute(&self, step: &RollbackStep) -> Result<(), StepError> {
        require_command(step)?;
        info!(step = %step.name, command = %step.command, "executing file rollback step");
        std::thread::sleep(self.delay);
        Ok(())
    }
}

/// Maps step types to executors.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<StepType, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    /// A registry with no executors.
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// A registry with the bundled `sql`, `api_call` and `file_operation`
    /// executors, each pausing for `delay`.
    pub fn with_defaults(delay: Duration) -> Self {
        Self::empty()
            .with(StepType::Sql, SqlExecutor::new(delay))
            .with(StepType::ApiCall, ApiCallExecutor::new(delay))
            .with(StepType::FileOperation, FileOperationExecutor::new(delay))
    }

    /// Register an executor, returning the one it replaces.
    pub fn register(
        &mut self,
        step_type: StepType,
        executor: impl StepExecutor + 'static,
    ) -> Option<Arc<dyn StepExecutor>> {
        self.executors.insert(step_type, Arc::new(executor))
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, step_type: StepType, executor: impl StepExecutor + 'static) -> Self {
        self.register(step_type, executor);
        self
    }

    /// Whether a step type has an executor.
    pub fn supports(&self, step_type: &StepType) -> bool {
        self.executors.contains_key(step_type)
    }

    /// Dispatch a step to the executor for its type.
    pub fn execute(&self, step: &RollbackStep) -> Result<(), StepError> {
        match self.executors.get(&step.step_type) {
            Some(executor) => executor.execute(step),
            None => Err(StepError::Unsupported(step.step_type.clone())),
        }
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults(Duration::from_millis(DEFAULT_STEP_DELAY_MS))
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.executors.keys().map(StepType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("step_types", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(step_type: StepType, command: &str) -> RollbackStep {
        RollbackStep::new("p", 1, step_type, "test").with_command(command)
    }

    #[test]
    fn test_defaults_cover_builtin_types() {
        let registry = ExecutorRegistry::with_defaults(Duration::ZERO);
        assert!(registry.supports(&StepType::Sql));
        assert!(registry.supports(&StepType::ApiCall));
        assert!(registry.supports(&StepType::FileOperation));
        assert!(!registry.supports(&StepType::Custom("shell".into())));

        assert!(registry.execute(&step(StepType::Sql, "SELECT 1")).is_ok());
        assert!(registry
            .execute(&step(StepType::FileOperation, "restore_config"))
            .is_ok());
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let registry = ExecutorRegistry::with_defaults(Duration::ZERO);
        let err = registry
            .execute(&step(StepType::Custom("shell".into()), "ls"))
            .unwrap_err();
        assert!(matches!(err, StepError::Unsupported(_)));
        assert!(err.to_string().contains("shell"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let registry = ExecutorRegistry::with_defaults(Duration::ZERO);
        let err = registry.execute(&step(StepType::Sql, "  ")).unwrap_err();
        assert!(matches!(err, StepError::InvalidParameters(_)));
    }

    #[test]
    fn test_api_call_timeout_validation() {
        let registry = ExecutorRegistry::with_defaults(Duration::ZERO);
        let ok = step(StepType::ApiCall, "GET /health").with_parameters(json!({ "timeout_secs": 30 }));
        assert!(registry.execute(&ok).is_ok());

        let bad = step(StepType::ApiCall, "GET /health").with_parameters(json!({ "timeout_secs": 0 }));
        assert!(matches!(
            registry.execute(&bad),
            Err(StepError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_closure_executor_replaces_default() {
        let mut registry = ExecutorRegistry::with_defaults(Duration::ZERO);
        let previous = registry.register(StepType::Sql, |s: &RollbackStep| -> Result<(), StepError> {
            Err(StepError::Failed(format!("refused {}", s.command)))
        });
        assert!(previous.is_some());

        let err = registry.execute(&step(StepType::Sql, "DROP")).unwrap_err();
        assert_eq!(err.to_string(), "refused DROP");
    }
}
