//! Subcommand dispatch.

use crate::config::{
    Command, MigrationCommand, RollbackCommand, StepCommand, SuiteName, TriggerCommand,
    ValidateCommand,
};
use crate::error::CliError;
use cutover_core::{
    CutoverConfig, DataValidator, Migration, MigrationManager, MigrationStep, RetryStore,
    RollbackManager, SledStore, Store, SuiteStatus, TriggerType, ValidationSuite,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of a command.
#[derive(Debug)]
pub struct Output {
    /// Rendered by the formatter.
    pub value: Value,
    /// `false` when the command ran but found a blocking problem.
    pub success: bool,
}

impl Output {
    fn ok(value: impl Serialize) -> Result<Self, CliError> {
        Ok(Self {
            value: serde_json::to_value(value)?,
            success: true,
        })
    }

    fn message(text: impl Into<String>) -> Result<Self, CliError> {
        Self::ok(json!({ "message": text.into() }))
    }
}

/// The engine components a command runs against.
pub struct Context {
    migrations: MigrationManager,
    rollbacks: RollbackManager,
    validator: DataValidator,
    log_limit: usize,
}

impl Context {
    /// Open the on-disk store described by `config`.
    pub fn open(config: &CutoverConfig) -> Result<Self, CliError> {
        let sled = SledStore::open(&config.data_path).map_err(|source| CliError::OpenStore {
            path: config.data_path.clone(),
            source,
        })?;
        let store: Arc<dyn Store> = Arc::new(RetryStore::new(sled, config.retry.clone()));
        Ok(Self::with_store(store, config))
    }

    /// Build the components over an existing store.
    pub fn with_store(store: Arc<dyn Store>, config: &CutoverConfig) -> Self {
        Self {
            migrations: MigrationManager::from_config(store.clone(), config),
            rollbacks: RollbackManager::from_config(store.clone(), config),
            validator: DataValidator::from_config(store, config),
            log_limit: config.log_limit,
        }
    }
}

/// Execute a parsed command.
pub fn execute(ctx: &Context, command: Command) -> Result<Output, CliError> {
    debug!(?command, "executing command");
    match command {
        Command::Migration(cmd) => migration(ctx, cmd),
        Command::Step(cmd) => step(ctx, cmd),
        Command::Rollback(cmd) => rollback(ctx, cmd),
        Command::Trigger(cmd) => trigger(ctx, cmd),
        Command::Validate(cmd) => validate(ctx, cmd),
    }
}

fn migration(ctx: &Context, command: MigrationCommand) -> Result<Output, CliError> {
    let manager = &ctx.migrations;
    match command {
        MigrationCommand::Create {
            name,
            version,
            description,
            checksum,
        } => {
            let mut migration = Migration::new(name, version).with_description(description);
            if let Some(checksum) = checksum {
                migration = migration.with_checksum(checksum);
            }
            let checksum = if migration.checksum.is_empty() {
                migration.compute_checksum()
            } else {
                migration.checksum.clone()
            };
            if let Some(existing) = manager.find_migration_by_checksum(&checksum)? {
                return Err(CliError::InvalidArgument(format!(
                    "migration with the same checksum already exists: {}",
                    existing.id
                )));
            }
            Output::ok(manager.create_migration(migration)?)
        }
        MigrationCommand::Start { id } => {
            manager.start_migration(&id)?;
            Output::ok(manager.get_migration(&id)?)
        }
        MigrationCommand::Complete { id } => {
            manager.complete_migration(&id)?;
            Output::ok(manager.get_migration(&id)?)
        }
        MigrationCommand::Fail { id, message } => {
            manager.fail_migration(&id, &message)?;
            Output::ok(manager.get_migration(&id)?)
        }
        MigrationCommand::Show { id } => Output::ok(manager.get_migration(&id)?),
        MigrationCommand::Steps { id } => Output::ok(manager.get_migration_steps(&id)?),
        MigrationCommand::Log {
            id,
            level,
            message,
            step,
        } => {
            manager.get_migration(&id)?;
            Output::ok(manager.log_migration(&id, step.as_deref(), level, &message, Value::Null)?)
        }
        MigrationCommand::Logs { id, limit } => Output::ok(
            manager.get_migration_logs(&id, Some(limit.unwrap_or(ctx.log_limit)))?,
        ),
        MigrationCommand::Active => Output::ok(manager.get_active_migrations()?),
    }
}

fn step(ctx: &Context, command: StepCommand) -> Result<Output, CliError> {
    let manager = &ctx.migrations;
    let id = match command {
        StepCommand::Add {
            migration_id,
            name,
            order,
            total,
            description,
        } => {
            let mut step = MigrationStep::new(migration_id, name, order).with_description(description);
            if let Some(total) = total {
                step = step.with_records_total(total);
            }
            return Output::ok(manager.add_migration_step(step)?);
        }
        StepCommand::Start { id } => {
            manager.start_migration_step(&id)?;
            id
        }
        StepCommand::Progress { id, records_done } => {
            manager.update_step_progress(&id, records_done)?;
            id
        }
        StepCommand::Complete { id } => {
            manager.complete_step(&id)?;
            id
        }
        StepCommand::Fail { id, message } => {
            manager.fail_step(&id, &message)?;
            id
        }
    };
    Output::ok(manager.get_migration_step(&id)?)
}

fn rollback(ctx: &Context, command: RollbackCommand) -> Result<Output, CliError> {
    let manager = &ctx.rollbacks;
    match command {
        RollbackCommand::Plan {
            migration_id,
            name,
            description,
        } => Output::ok(manager.create_rollback_plan(&migration_id, &name, &description)?),
        RollbackCommand::Execute { plan_id } => Output::ok(manager.execute_rollback(&plan_id)?),
        RollbackCommand::Show { plan_id } => Output::ok(manager.get_rollback_plan(&plan_id)?),
        RollbackCommand::List { migration_id } => {
            Output::ok(manager.list_rollback_plans(&migration_id)?)
        }
    }
}

fn trigger(ctx: &Context, command: TriggerCommand) -> Result<Output, CliError> {
    let manager = &ctx.rollbacks;
    match command {
        TriggerCommand::Add {
            migration_id,
            trigger_type,
            threshold,
            window,
        } => Output::ok(manager.create_rollback_trigger(
            &migration_id,
            TriggerType::from(trigger_type),
            threshold,
            window,
        )?),
        TriggerCommand::Check {
            migration_id,
            metrics,
        } => {
            if metrics.is_empty() {
                return Err(CliError::InvalidArgument(
                    "at least one --metric NAME=VALUE is required".to_string(),
                ));
            }
            let metrics: HashMap<String, f64> = metrics.into_iter().collect();
            Output::ok(manager.check_rollback_triggers(&migration_id, &metrics)?)
        }
        TriggerCommand::List { migration_id } => {
            Output::ok(manager.get_rollback_triggers(&migration_id)?)
        }
        TriggerCommand::Deactivate { id } => {
            manager.deactivate_trigger(&id)?;
            Output::message(format!("trigger {} deactivated", id))
        }
    }
}

fn validate(ctx: &Context, command: ValidateCommand) -> Result<Output, CliError> {
    match command {
        ValidateCommand::Suite { suite } => {
            let validator = &ctx.validator;
            let suites = match suite {
                SuiteName::Users => vec![validator.validate_user_data()?],
                SuiteName::WechatUsers => vec![validator.validate_wechat_user_data()?],
                SuiteName::Events => vec![validator.validate_event_data()?],
                SuiteName::All => validator.validate_all()?,
            };
            suite_output(&suites)
        }
        ValidateCommand::Integrity { tables } => {
            let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
            ctx.migrations.validate_data_integrity(&tables)?;
            Output::message(format!("{} table(s) passed integrity checks", tables.len()))
        }
    }
}

/// Flatten suites into one row per check; fails when any suite failed.
fn suite_output(suites: &[ValidationSuite]) -> Result<Output, CliError> {
    let rows: Vec<Value> = suites
        .iter()
        .flat_map(|suite| {
            suite.results.iter().map(move |result| {
                json!({
                    "suite": suite.name,
                    "table": result.table_name,
                    "check": result.check_type,
                    "status": result.status,
                    "records": result.record_count,
                    "errors": result.error_count,
                    "message": result.message,
                })
            })
        })
        .collect();

    Ok(Output {
        value: Value::Array(rows),
        success: suites.iter().all(|s| s.status != SuiteStatus::Failed),
    })
}
