//! Command-line arguments.

use crate::formatter::OutputFormat;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use cutover_core::config::{DEFAULT_LOG_LIMIT, DEFAULT_STEP_DELAY_MS};
use cutover_core::{CutoverConfig, LogLevel, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Initial backoff between store retries.
const RETRY_BACKOFF_MS: u64 = 50;

/// Cutover migration and rollback engine.
#[derive(Parser, Debug)]
#[command(name = "cutover")]
#[command(version, about = "Track data migrations and orchestrate rollbacks")]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(ClapArgs, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the data directory.
    #[arg(short, long, global = true, default_value = "./data")]
    pub data_path: PathBuf,

    /// Output format.
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Pause taken by the bundled rollback executors, in milliseconds.
    #[arg(long, global = true, default_value_t = DEFAULT_STEP_DELAY_MS)]
    pub step_delay_ms: u64,

    /// Attempts per store operation (1 = no retry).
    #[arg(long, global = true, default_value_t = 1)]
    pub retries: u32,

    /// Use node-prefixed sequential identifiers instead of UUIDs.
    #[arg(long, global = true)]
    pub node_id: Option<String>,

    /// Default number of log entries shown.
    #[arg(long, global = true, default_value_t = DEFAULT_LOG_LIMIT)]
    pub log_limit: usize,

    /// Run validation checks one at a time.
    #[arg(long, global = true)]
    pub sequential: bool,
}

impl GlobalArgs {
    /// Convert command-line arguments to an engine configuration.
    pub fn into_config(self) -> CutoverConfig {
        let retry = if self.retries <= 1 {
            RetryPolicy::none()
        } else {
            RetryPolicy::exponential(self.retries, Duration::from_millis(RETRY_BACKOFF_MS))
        };

        let mut config = CutoverConfig::new(self.data_path)
            .with_retry(retry)
            .with_step_delay(Duration::from_millis(self.step_delay_ms))
            .with_log_limit(self.log_limit)
            .with_parallel_validation(!self.sequential);
        if let Some(node) = self.node_id {
            config = config.with_node_id(node);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage migrations.
    #[command(subcommand)]
    Migration(MigrationCommand),

    /// Manage migration steps.
    #[command(subcommand)]
    Step(StepCommand),

    /// Prepare and execute rollback plans.
    #[command(subcommand)]
    Rollback(RollbackCommand),

    /// Manage rollback triggers.
    #[command(subcommand)]
    Trigger(TriggerCommand),

    /// Validate migrated data.
    #[command(subcommand)]
    Validate(ValidateCommand),
}

#[derive(Subcommand, Debug)]
pub enum MigrationCommand {
    /// Register a new migration.
    Create {
        name: String,
        version: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Explicit checksum; computed from name, version and description otherwise.
        #[arg(long)]
        checksum: Option<String>,
    },
    /// Mark a migration running.
    Start { id: String },
    /// Mark a migration completed.
    Complete { id: String },
    /// Mark a migration failed.
    Fail { id: String, message: String },
    /// Show a migration.
    Show { id: String },
    /// List the steps of a migration.
    Steps { id: String },
    /// Append a log entry.
    Log {
        id: String,
        level: LogLevel,
        message: String,
        #[arg(long)]
        step: Option<String>,
    },
    /// Show log entries, newest first.
    Logs {
        id: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List pending and running migrations.
    Active,
}

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    /// Add a step to a migration.
    Add {
        migration_id: String,
        name: String,
        /// Position; 0 appends after the last step.
        #[arg(long, default_value_t = 0)]
        order: u32,
        #[arg(long)]
        total: Option<u64>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Mark a step running.
    Start { id: String },
    /// Record processed records.
    Progress { id: String, records_done: u64 },
    /// Mark a step completed.
    Complete { id: String },
    /// Mark a step failed.
    Fail { id: String, message: String },
}

#[derive(Subcommand, Debug)]
pub enum RollbackCommand {
    /// Create a plan with the default steps.
    Plan {
        migration_id: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Execute or resume a plan.
    Execute { plan_id: String },
    /// Show a plan and its steps.
    Show { plan_id: String },
    /// List the plans of a migration.
    List { migration_id: String },
}

#[derive(Subcommand, Debug)]
pub enum TriggerCommand {
    /// Add a metric threshold.
    Add {
        migration_id: String,
        /// Metric name, e.g. error_rate, latency, validation_failure.
        trigger_type: String,
        threshold: f64,
        /// Observation window in minutes.
        #[arg(long, default_value_t = 5)]
        window: u32,
    },
    /// Evaluate triggers against metric values.
    Check {
        migration_id: String,
        /// Metric value as NAME=VALUE. Repeatable.
        #[arg(long = "metric", value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,
    },
    /// List the triggers of a migration.
    List { migration_id: String },
    /// Stop evaluating a trigger.
    Deactivate { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ValidateCommand {
    /// Run a validation suite.
    Suite {
        #[arg(value_enum, default_value = "all")]
        suite: SuiteName,
    },
    /// Check references and unique keys of tables.
    Integrity {
        #[arg(required = true)]
        tables: Vec<String>,
    },
}

/// Built-in validation suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteName {
    Users,
    WechatUsers,
    Events,
    All,
}

fn parse_metric(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("metric name missing in '{}'", s));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for {}: {}", name, e))?;
    Ok((name.to_string(), value))
}
