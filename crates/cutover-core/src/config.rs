//! Engine configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default pause taken by the bundled rollback step executors.
pub const DEFAULT_STEP_DELAY_MS: u64 = 100;

/// Default number of log entries returned when no limit is given.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Default timeout for the legacy health check step.
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 30;

/// Bounded exponential backoff for persistence calls.
///
/// Only transient store errors are retried. Step and plan failures are never
/// retried regardless of this policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Pause before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for a single pause.
    pub max_backoff: Duration,
    /// Growth factor between pauses.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// A policy with `max_attempts` attempts and doubling backoff.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Pause before the given retry (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let nanos = (self.initial_backoff.as_nanos() as f64 * factor).round();
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Parameters baked into the default rollback plan.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackConfig {
    /// Tables snapshotted by the backup step.
    pub affected_tables: Vec<String>,
    /// Health endpoint of the legacy system.
    pub legacy_health_url: String,
    /// Timeout for the legacy health check.
    pub health_timeout: Duration,
    /// Name of the configuration backup restored by the last step.
    pub config_backup: String,
    /// Pause taken by the bundled step executors.
    pub step_delay: Duration,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            affected_tables: vec![
                "users".to_string(),
                "wechat_users".to_string(),
                "events".to_string(),
                "event_registrations".to_string(),
            ],
            legacy_health_url: "http://legacy.internal/health".to_string(),
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
            config_backup: "config.pre_migration.bak".to_string(),
            step_delay: Duration::from_millis(DEFAULT_STEP_DELAY_MS),
        }
    }
}

/// Data validator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Run the checks of a suite on separate threads.
    pub parallel: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// A foreign reference `column -> parent_table.parent_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column.
    pub parent_column: String,
}

impl Reference {
    /// Create a reference.
    pub fn new(
        column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
        }
    }
}

/// Structural rules for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRules {
    /// References that must resolve (orphan detection).
    pub references: Vec<Reference>,
    /// Column sets that must be unique (duplicate detection).
    pub unique_keys: Vec<Vec<String>>,
}

impl TableRules {
    /// Add a reference rule.
    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Add a unique key rule.
    pub fn with_unique_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.unique_keys
            .push(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Rules consulted by the migration integrity gate, keyed by table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityRules {
    tables: BTreeMap<String, TableRules>,
}

impl IntegrityRules {
    /// An empty rule set.
    pub fn empty() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Set the rules for a table.
    pub fn with_table(mut self, table: impl Into<String>, rules: TableRules) -> Self {
        self.tables.insert(table.into(), rules);
        self
    }

    /// Rules for a table, if any are registered.
    pub fn get(&self, table: &str) -> Option<&TableRules> {
        self.tables.get(table)
    }

    /// Names of all tables with rules.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl Default for IntegrityRules {
    fn default() -> Self {
        Self::empty()
            .with_table("users", TableRules::default().with_unique_key(["username"]))
            .with_table(
                "wechat_users",
                TableRules::default()
                    .with_reference(Reference::new("user_id", "users", "id"))
                    .with_unique_key(["openid"]),
            )
            .with_table("events", TableRules::default())
            .with_table(
                "event_registrations",
                TableRules::default()
                    .with_reference(Reference::new("event_id", "events", "id"))
                    .with_reference(Reference::new("user_id", "users", "id")),
            )
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct CutoverConfig {
    /// Path to the state directory.
    pub data_path: PathBuf,
    /// Retry policy applied to persistence calls.
    pub retry: RetryPolicy,
    /// Default rollback plan parameters.
    pub rollback: RollbackConfig,
    /// Data validator settings.
    pub validation: ValidationConfig,
    /// Log entries returned when the caller gives no limit.
    pub log_limit: usize,
    /// Rules for the migration integrity gate.
    pub integrity: IntegrityRules,
    /// Node name used for sequential identifiers; UUIDs when `None`.
    pub node_id: Option<String>,
}

impl CutoverConfig {
    /// Create a configuration with the given data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            retry: RetryPolicy::default(),
            rollback: RollbackConfig::default(),
            validation: ValidationConfig::default(),
            log_limit: DEFAULT_LOG_LIMIT,
            integrity: IntegrityRules::default(),
            node_id: None,
        }
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the rollback plan parameters.
    pub fn with_rollback(mut self, rollback: RollbackConfig) -> Self {
        self.rollback = rollback;
        self
    }

    /// Set the pause taken by the bundled step executors.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.rollback.step_delay = delay;
        self
    }

    /// Enable or disable parallel validation.
    pub fn with_parallel_validation(mut self, parallel: bool) -> Self {
        self.validation.parallel = parallel;
        self
    }

    /// Set the default log limit.
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit.max(1);
        self
    }

    /// Set the integrity rules.
    pub fn with_integrity(mut self, integrity: IntegrityRules) -> Self {
        self.integrity = integrity;
        self
    }

    /// Use sequential identifiers for the given node.
    pub fn with_node_id(mut self, node: impl Into<String>) -> Self {
        self.node_id = Some(node.into());
        self
    }

    /// Build the identifier generator described by this configuration.
    pub fn id_generator(&self) -> std::sync::Arc<dyn crate::id::IdGenerator> {
        match &self.node_id {
            Some(node) => std::sync::Arc::new(crate::id::SequentialIdGenerator::new(node.clone())),
            None => std::sync::Arc::new(crate::id::UuidGenerator),
        }
    }
}

impl Default for CutoverConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}
