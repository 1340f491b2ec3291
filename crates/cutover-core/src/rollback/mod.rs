//! Rollback orchestration.
//!
//! A [`RollbackPlan`] is an ordered list of compensating [`RollbackStep`]s
//! prepared for a migration. [`RollbackManager::execute_rollback`] runs the
//! steps strictly in `step_order`, dispatching each one to the
//! [`StepExecutor`] registered for its [`StepType`], and stops at the first
//! failure.
//!
//! [`RollbackTrigger`]s are thresholds over live metrics; checking them tells
//! the caller whether to execute a plan, it never does so by itself.

pub mod executor;
pub mod manager;
pub mod model;
pub mod trigger;

pub use executor::{
    ApiCallExecutor, ExecutorRegistry, FileOperationExecutor, SqlExecutor, StepError, StepExecutor,
};
pub use manager::RollbackManager;
pub use model::{PlanStatus, RollbackOutcome, RollbackPlan, RollbackStep, StepType};
pub use trigger::{RollbackTrigger, TriggerOutcome, TriggerType};
