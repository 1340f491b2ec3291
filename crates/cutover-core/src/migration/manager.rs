//! Migration manager - owns migration and step lifecycles.
//!
//! Every transition is a single partial update against the store. Prior
//! state is not checked: callers sequence the calls, and repeating a
//! transition overwrites the previous values.

use super::integrity;
use super::model::{LogLevel, Migration, MigrationLog, MigrationStatus, MigrationStep};
use crate::config::{CutoverConfig, IntegrityRules};
use crate::error::CutoverError;
use crate::id::IdGenerator;
use crate::store::{current_timestamp, decode, encode, fields, Filter, OrderBy, Store};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Migration manager.
pub struct MigrationManager {
    store: Arc<dyn Store>,
    ids: Arc<dyn IdGenerator>,
    integrity: IntegrityRules,
}

impl MigrationManager {
    /// Create a manager with the default integrity rules.
    pub fn new(store: Arc<dyn Store>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            ids,
            integrity: IntegrityRules::default(),
        }
    }

    /// Create a manager from an engine configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &CutoverConfig) -> Self {
        Self {
            store,
            ids: config.id_generator(),
            integrity: config.integrity.clone(),
        }
    }

    /// Replace the integrity rules.
    pub fn with_integrity_rules(mut self, rules: IntegrityRules) -> Self {
        self.integrity = rules;
        self
    }

    // ---- migrations ----

    /// Persist a new migration in `pending` state.
    #[instrument(skip(self, migration), fields(name = %migration.name, version = %migration.version))]
    pub fn create_migration(&self, mut migration: Migration) -> Result<Migration, CutoverError> {
        migration.id = self.ids.generate();
        migration.status = MigrationStatus::Pending;
        migration.started_at = None;
        migration.completed_at = None;
        migration.error_msg.clear();
        migration.created_at = current_timestamp();
        if migration.checksum.is_empty() {
            migration.checksum = migration.compute_checksum();
        }

        self.insert("create_migration", Migration::TABLE, &migration)?;
        info!(migration_id = %migration.id, checksum = %migration.checksum, "migration created");
        Ok(migration)
    }

    /// Mark a migration as running.
    pub fn start_migration(&self, id: &str) -> Result<(), CutoverError> {
        self.update(
            "start_migration",
            Migration::TABLE,
            id,
            json!({
                "status": MigrationStatus::Running,
                "started_at": current_timestamp(),
            }),
        )?;
        info!(migration_id = id, "migration started");
        Ok(())
    }

    /// Mark a migration as completed.
    pub fn complete_migration(&self, id: &str) -> Result<(), CutoverError> {
        self.update(
            "complete_migration",
            Migration::TABLE,
            id,
            json!({
                "status": MigrationStatus::Completed,
                "completed_at": current_timestamp(),
            }),
        )?;
        info!(migration_id = id, "migration completed");
        Ok(())
    }

    /// Mark a migration as failed with an error message.
    pub fn fail_migration(&self, id: &str, error_msg: &str) -> Result<(), CutoverError> {
        self.update(
            "fail_migration",
            Migration::TABLE,
            id,
            json!({
                "status": MigrationStatus::Failed,
                "completed_at": current_timestamp(),
                "error_msg": error_msg,
            }),
        )?;
        error!(migration_id = id, error = error_msg, "migration failed");
        Ok(())
    }

    /// Fetch a migration.
    pub fn get_migration(&self, id: &str) -> Result<Migration, CutoverError> {
        self.fetch("get_migration", Migration::TABLE, id)
    }

    /// Migrations that are pending or running, oldest first.
    pub fn get_active_migrations(&self) -> Result<Vec<Migration>, CutoverError> {
        let filter = Filter::any_of(
            "status",
            [MigrationStatus::Pending.as_str(), MigrationStatus::Running.as_str()],
        );
        self.select(
            "get_active_migrations",
            Migration::TABLE,
            &filter,
            Some(&OrderBy::asc("created_at")),
            None,
        )
    }

    /// Find a migration previously created with the same checksum.
    pub fn find_migration_by_checksum(
        &self,
        checksum: &str,
    ) -> Result<Option<Migration>, CutoverError> {
        let mut found: Vec<Migration> = self.select(
            "find_migration_by_checksum",
            Migration::TABLE,
            &Filter::eq("checksum", checksum),
            Some(&OrderBy::asc("created_at")),
            Some(1),
        )?;
        Ok(found.pop())
    }

    // ---- steps ----

    /// Persist a new step in `pending` state.
    ///
    /// A `step_order` of `0` appends the step after the current last one.
    #[instrument(skip(self, step), fields(migration_id = %step.migration_id, name = %step.name))]
    pub fn add_migration_step(&self, mut step: MigrationStep) -> Result<MigrationStep, CutoverError> {
        if step.migration_id.is_empty() {
            return Err(CutoverError::InvalidInput(
                "step has no migration id".to_string(),
            ));
        }
        // The owning migration must exist.
        self.get_migration(&step.migration_id)?;

        let existing = self.get_migration_steps(&step.migration_id)?;
        if step.step_order == 0 {
            step.step_order = match existing.last() {
                None => 1,
                Some(last) => last.step_order.checked_add(1).ok_or_else(|| {
                    CutoverError::InvalidInput("step_order overflow".to_string())
                })?,
            };
        } else if existing.iter().any(|s| s.step_order == step.step_order) {
            warn!(step_order = step.step_order, "duplicate step order within migration");
        }

        step.id = self.ids.generate();
        step.status = MigrationStatus::Pending;
        step.records_done = 0;
        step.started_at = None;
        step.completed_at = None;
        step.error_msg.clear();
        step.created_at = current_timestamp();

        self.insert("add_migration_step", MigrationStep::TABLE, &step)?;
        debug!(step_id = %step.id, step_order = step.step_order, "migration step added");
        Ok(step)
    }

    /// Mark a step as running.
    pub fn start_migration_step(&self, id: &str) -> Result<(), CutoverError> {
        self.update(
            "start_migration_step",
            MigrationStep::TABLE,
            id,
            json!({
                "status": MigrationStatus::Running,
                "started_at": current_timestamp(),
            }),
        )?;
        info!(step_id = id, "migration step started");
        Ok(())
    }

    /// Overwrite the processed record count of a step.
    pub fn update_step_progress(&self, id: &str, records_done: u64) -> Result<(), CutoverError> {
        self.update(
            "update_step_progress",
            MigrationStep::TABLE,
            id,
            json!({ "records_done": records_done }),
        )?;
        debug!(step_id = id, records_done, "migration step progress");
        Ok(())
    }

    /// Mark a step as completed.
    pub fn complete_step(&self, id: &str) -> Result<(), CutoverError> {
        self.update(
            "complete_step",
            MigrationStep::TABLE,
            id,
            json!({
                "status": MigrationStatus::Completed,
                "completed_at": current_timestamp(),
            }),
        )?;
        info!(step_id = id, "migration step completed");
        Ok(())
    }

    /// Mark a step as failed with an error message.
    pub fn fail_step(&self, id: &str, error_msg: &str) -> Result<(), CutoverError> {
        self.update(
            "fail_step",
            MigrationStep::TABLE,
            id,
            json!({
                "status": MigrationStatus::Failed,
                "completed_at": current_timestamp(),
                "error_msg": error_msg,
            }),
        )?;
        error!(step_id = id, error = error_msg, "migration step failed");
        Ok(())
    }

    /// Fetch a step.
    pub fn get_migration_step(&self, id: &str) -> Result<MigrationStep, CutoverError> {
        self.fetch("get_migration_step", MigrationStep::TABLE, id)
    }

    /// Steps of a migration ordered by `step_order`.
    pub fn get_migration_steps(&self, migration_id: &str) -> Result<Vec<MigrationStep>, CutoverError> {
        self.select(
            "get_migration_steps",
            MigrationStep::TABLE,
            &Filter::eq("migration_id", migration_id),
            Some(&OrderBy::asc("step_order")),
            None,
        )
    }

    // ---- logs ----

    /// Append a log entry and mirror it to the tracing output.
    pub fn log_migration(
        &self,
        migration_id: &str,
        step_id: Option<&str>,
        level: LogLevel,
        message: &str,
        details: Value,
    ) -> Result<MigrationLog, CutoverError> {
        let entry = MigrationLog {
            id: self.ids.generate(),
            migration_id: migration_id.to_string(),
            step_id: step_id.map(str::to_string),
            level,
            message: message.to_string(),
            details,
            timestamp: current_timestamp(),
        };

        match level {
            LogLevel::Info => info!(migration_id, step_id, details = %entry.details, "{}", message),
            LogLevel::Warn => warn!(migration_id, step_id, details = %entry.details, "{}", message),
            LogLevel::Error => error!(migration_id, step_id, details = %entry.details, "{}", message),
        }

        self.insert("log_migration", MigrationLog::TABLE, &entry)?;
        Ok(entry)
    }

    /// Log entries of a migration, newest first.
    pub fn get_migration_logs(
        &self,
        migration_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MigrationLog>, CutoverError> {
        self.select(
            "get_migration_logs",
            MigrationLog::TABLE,
            &Filter::eq("migration_id", migration_id),
            Some(&OrderBy::desc("timestamp")),
            limit,
        )
    }

    // ---- integrity ----

    /// Run orphan and duplicate detection over the given tables.
    ///
    /// Returns the first violation found, tagged with its table.
    #[instrument(skip(self))]
    pub fn validate_data_integrity(&self, tables: &[&str]) -> Result<(), CutoverError> {
        integrity::check_tables(self.store.as_ref(), &self.integrity, tables)?;
        info!(tables = tables.len(), "data integrity validated");
        Ok(())
    }

    // ---- store helpers ----

    fn insert<T: serde::Serialize>(
        &self,
        operation: &str,
        table: &str,
        value: &T,
    ) -> Result<(), CutoverError> {
        let record = encode(value).map_err(|e| CutoverError::persistence(operation, e))?;
        self.store
            .create(table, record)
            .map_err(|e| CutoverError::persistence(operation, e))
    }

    fn update(&self, operation: &str, table: &str, id: &str, changes: Value) -> Result<(), CutoverError> {
        self.store
            .update_fields(table, id, fields(changes))
            .map_err(|e| CutoverError::persistence(operation, e))
    }

    fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        id: &str,
    ) -> Result<T, CutoverError> {
        let record = self
            .store
            .find_by_id(table, id)
            .map_err(|e| CutoverError::persistence(operation, e))?
            .ok_or_else(|| CutoverError::NotFound {
                entity: table.to_string(),
                id: id.to_string(),
            })?;
        decode(record).map_err(|e| CutoverError::persistence(operation, e))
    }

    fn select<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<T>, CutoverError> {
        self.store
            .find_where(table, filter, order, limit)
            .map_err(|e| CutoverError::persistence(operation, e))?
            .into_iter()
            .map(|record| decode(record).map_err(|e| CutoverError::persistence(operation, e)))
            .collect()
    }
}
