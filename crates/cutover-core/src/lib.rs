//! Cutover Core - migration tracking, rollback orchestration and data validation.
//!
//! This crate provides the engine used to move data from a legacy system to
//! a new one and, when live metrics say so, back again.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod error;
pub mod id;
pub mod migration;
pub mod rollback;
pub mod store;
pub mod validation;

pub use config::{
    CutoverConfig, IntegrityRules, Reference, RetryPolicy, RollbackConfig, TableRules,
    ValidationConfig,
};
pub use error::{CutoverError, Error};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use migration::{
    LogLevel, Migration, MigrationLog, MigrationManager, MigrationStatus, MigrationStep,
};
pub use rollback::{
    ExecutorRegistry, PlanStatus, RollbackManager, RollbackOutcome, RollbackPlan, RollbackStep,
    RollbackTrigger, StepError, StepExecutor, StepType, TriggerOutcome, TriggerType,
};
pub use store::{
    current_timestamp, Filter, JoinOn, MemoryStore, OrderBy, Record, RetryStore, SledStore,
    SortDirection, Store,
};
pub use validation::{
    Check, CheckKind, DataValidator, Severity, SuiteStatus, ValidationResult, ValidationStatus,
    ValidationSuite,
};
