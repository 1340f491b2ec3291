//! Migration records and their lifecycle states.

use serde::{Deserialize, Serialize};

/// State of a migration or migration step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Created but not started.
    #[default]
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Reverted by a rollback plan.
    RolledBack,
}

impl MigrationStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::Running => "running",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::RolledBack => "rolled_back",
        }
    }

    /// Whether no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Failed | MigrationStatus::RolledBack
        )
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked data migration from the legacy system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Migration {
    /// Unique migration ID.
    pub id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Version label of the migration.
    pub version: String,
    /// Current status.
    pub status: MigrationStatus,
    /// When the migration started (microseconds since epoch).
    pub started_at: Option<u64>,
    /// When the migration completed or failed (microseconds since epoch).
    pub completed_at: Option<u64>,
    /// Error message of the last failure.
    pub error_msg: String,
    /// Content hash used to detect re-application.
    pub checksum: String,
    /// When the migration was created (microseconds since epoch).
    pub created_at: u64,
}

impl Migration {
    /// Table holding migrations.
    pub const TABLE: &'static str = "migrations";

    /// Create a new migration with a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set an explicit checksum.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    /// Hash of name, version and description.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for part in [&self.name, &self.version, &self.description] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Check if the migration is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Elapsed time between start and completion, in microseconds.
    pub fn duration_micros(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

/// One ordered unit of work within a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationStep {
    /// Unique step ID.
    pub id: String,
    /// Owning migration.
    pub migration_id: String,
    /// Human readable name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Position within the migration. `0` asks the manager to append.
    pub step_order: u32,
    /// Current status.
    pub status: MigrationStatus,
    /// Total records to process, if known.
    pub records_total: u64,
    /// Records processed so far.
    pub records_done: u64,
    /// When the step started.
    pub started_at: Option<u64>,
    /// When the step completed or failed.
    pub completed_at: Option<u64>,
    /// Error message of the last failure.
    pub error_msg: String,
    /// When the step was added.
    pub created_at: u64,
}

impl MigrationStep {
    /// Table holding migration steps.
    pub const TABLE: &'static str = "migration_steps";

    /// Create a step for a migration.
    pub fn new(migration_id: impl Into<String>, name: impl Into<String>, step_order: u32) -> Self {
        Self {
            migration_id: migration_id.into(),
            name: name.into(),
            step_order,
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the expected record count.
    pub fn with_records_total(mut self, total: u64) -> Self {
        self.records_total = total;
        self
    }

    /// Calculate percentage complete.
    pub fn percent_complete(&self) -> Option<f64> {
        if self.records_total == 0 {
            return match self.status {
                MigrationStatus::Completed => Some(100.0),
                _ => None,
            };
        }
        Some((self.records_done as f64 / self.records_total as f64) * 100.0)
    }
}

/// Severity of a migration log entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational.
    #[default]
    Info,
    /// Something unexpected but not fatal.
    Warn,
    /// A failure.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Append-only log entry attached to a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationLog {
    /// Unique entry ID.
    pub id: String,
    /// Migration the entry belongs to.
    pub migration_id: String,
    /// Step the entry belongs to, if any.
    pub step_id: Option<String>,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Free-form structured details.
    pub details: serde_json::Value,
    /// When the entry was written.
    pub timestamp: u64,
}

impl MigrationLog {
    /// Table holding migration logs.
    pub const TABLE: &'static str = "migration_logs";
}
