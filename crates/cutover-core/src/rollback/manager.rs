//! Rollback manager - prepares and runs rollback plans and evaluates triggers.

use super::executor::{ExecutorRegistry, StepExecutor};
use super::model::{PlanStatus, RollbackOutcome, RollbackPlan, RollbackStep, StepType};
use super::trigger::{RollbackTrigger, TriggerOutcome, TriggerType};
use crate::config::{CutoverConfig, RollbackConfig};
use crate::error::CutoverError;
use crate::id::IdGenerator;
use crate::store::{current_timestamp, decode, encode, fields, Filter, OrderBy, Store};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Rollback manager.
pub struct RollbackManager {
    store: Arc<dyn Store>,
    ids: Arc<dyn IdGenerator>,
    executors: ExecutorRegistry,
    config: RollbackConfig,
}

impl RollbackManager {
    /// Create a manager with the default plan parameters and executors.
    pub fn new(store: Arc<dyn Store>, ids: Arc<dyn IdGenerator>) -> Self {
        let config = RollbackConfig::default();
        Self {
            store,
            ids,
            executors: ExecutorRegistry::with_defaults(config.step_delay),
            config,
        }
    }

    /// Create a manager from an engine configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &CutoverConfig) -> Self {
        Self {
            store,
            ids: config.id_generator(),
            executors: ExecutorRegistry::with_defaults(config.rollback.step_delay),
            config: config.rollback.clone(),
        }
    }

    /// Replace the executor registry.
    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Register an executor for a step type.
    pub fn register_executor(&mut self, step_type: StepType, executor: impl StepExecutor + 'static) {
        self.executors.register(step_type, executor);
    }

    // ---- plans ----

    /// Persist a plan with the five default rollback steps.
    #[instrument(skip(self, description))]
    pub fn create_rollback_plan(
        &self,
        migration_id: &str,
        name: &str,
        description: &str,
    ) -> Result<RollbackPlan, CutoverError> {
        if migration_id.is_empty() {
            return Err(CutoverError::InvalidInput(
                "rollback plan needs a migration id".to_string(),
            ));
        }

        let mut plan = RollbackPlan {
            id: self.ids.generate(),
            migration_id: migration_id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
            status: PlanStatus::Pending,
            executed_at: None,
            completed_at: None,
            created_at: current_timestamp(),
        };

        let mut record = encode(&plan).map_err(|e| CutoverError::persistence("create_rollback_plan", e))?;
        record.remove("steps");
        self.store
            .create(RollbackPlan::TABLE, record)
            .map_err(|e| CutoverError::persistence("create_rollback_plan", e))?;

        for step in self.default_steps(&plan) {
            let operation = format!("create rollback step '{}'", step.name);
            let record = encode(&step).map_err(|e| CutoverError::persistence(operation.as_str(), e))?;
            self.store
                .create(RollbackStep::TABLE, record)
                .map_err(|e| CutoverError::persistence(operation.as_str(), e))?;
            plan.steps.push(step);
        }

        info!(plan_id = %plan.id, steps = plan.steps.len(), "rollback plan created");
        Ok(plan)
    }

    /// The fixed rollback sequence: stop traffic, back up, restore, verify,
    /// restore configuration.
    fn default_steps(&self, plan: &RollbackPlan) -> Vec<RollbackStep> {
        let timestamp = current_timestamp();
        let backup_name = format!("rollback_{}_{}", plan.migration_id, timestamp);

        let specs: [(StepType, &str, &str, String, Value); 5] = [
            (
                StepType::ApiCall,
                "Stop New Traffic",
                "Redirect all traffic to the legacy system",
                "POST /admin/traffic/redirect".to_string(),
                json!({ "target": "legacy", "percentage": 100 }),
            ),
            (
                StepType::Sql,
                "Backup Current State",
                "Snapshot the tables touched by the migration",
                format!("BACKUP TABLES TO {}", backup_name),
                json!({
                    "tables": self.config.affected_tables,
                    "backup_name": backup_name,
                    "timestamp": timestamp,
                }),
            ),
            (
                StepType::Sql,
                "Restore Legacy Data",
                "Restore the pre-migration backup and verify row counts",
                "RESTORE FROM pre_migration_backup".to_string(),
                json!({
                    "backup_name": format!("pre_migration_{}", plan.migration_id),
                    "verify": true,
                }),
            ),
            (
                StepType::ApiCall,
                "Validate Legacy System",
                "Health check the legacy system",
                format!("GET {}", self.config.legacy_health_url),
                json!({
                    "url": self.config.legacy_health_url,
                    "timeout_secs": self.config.health_timeout.as_secs().max(1),
                }),
            ),
            (
                StepType::FileOperation,
                "Update Configuration",
                "Restore the pre-migration configuration backup",
                "restore_config".to_string(),
                json!({ "backup_name": self.config.config_backup }),
            ),
        ];

        specs
            .into_iter()
            .zip(1u32..)
            .map(|((step_type, name, description, command, parameters), order)| {
                let mut step = RollbackStep::new(&plan.id, order, step_type, name)
                    .with_description(description)
                    .with_command(command)
                    .with_parameters(parameters);
                step.id = self.ids.generate();
                step
            })
            .collect()
    }

    /// Fetch a plan together with its ordered steps.
    pub fn get_rollback_plan(&self, plan_id: &str) -> Result<RollbackPlan, CutoverError> {
        let record = self
            .store
            .find_by_id(RollbackPlan::TABLE, plan_id)
            .map_err(|e| CutoverError::persistence("get_rollback_plan", e))?
            .ok_or_else(|| CutoverError::NotFound {
                entity: RollbackPlan::TABLE.to_string(),
                id: plan_id.to_string(),
            })?;
        let mut plan: RollbackPlan =
            decode(record).map_err(|e| CutoverError::persistence("get_rollback_plan", e))?;
        plan.steps = self.load_steps(plan_id)?;
        Ok(plan)
    }

    /// Plans prepared for a migration, oldest first.
    pub fn list_rollback_plans(&self, migration_id: &str) -> Result<Vec<RollbackPlan>, CutoverError> {
        let records = self
            .store
            .find_where(
                RollbackPlan::TABLE,
                &Filter::eq("migration_id", migration_id),
                Some(&OrderBy::asc("created_at")),
                None,
            )
            .map_err(|e| CutoverError::persistence("list_rollback_plans", e))?;

        records
            .into_iter()
            .map(|record| {
                let mut plan: RollbackPlan = decode(record)
                    .map_err(|e| CutoverError::persistence("list_rollback_plans", e))?;
                plan.steps = self.load_steps(&plan.id)?;
                Ok(plan)
            })
            .collect()
    }

    fn load_steps(&self, plan_id: &str) -> Result<Vec<RollbackStep>, CutoverError> {
        self.store
            .find_where(
                RollbackStep::TABLE,
                &Filter::eq("plan_id", plan_id),
                Some(&OrderBy::asc("step_order")),
                None,
            )
            .map_err(|e| CutoverError::persistence("load rollback steps", e))?
            .into_iter()
            .map(|record| decode(record).map_err(|e| CutoverError::persistence("load rollback steps", e)))
            .collect()
    }

    // ---- execution ----

    /// Execute a plan's steps one at a time, in order.
    ///
    /// The first failing step marks itself and the plan `failed` and stops
    /// execution; later steps stay `pending`. Steps already `completed` by a
    /// previous invocation are skipped, so a failed or interrupted plan can be
    /// re-run once the cause is fixed.
    #[instrument(skip(self))]
    pub fn execute_rollback(&self, plan_id: &str) -> Result<RollbackOutcome, CutoverError> {
        let plan = self.get_rollback_plan(plan_id)?;

        self.update(
            "execute_rollback",
            RollbackPlan::TABLE,
            plan_id,
            json!({
                "status": PlanStatus::Running,
                "executed_at": current_timestamp(),
            }),
        )?;
        warn!(plan_id, migration_id = %plan.migration_id, steps = plan.steps.len(), "rollback started");

        let mut outcome = RollbackOutcome {
            plan_id: plan_id.to_string(),
            status: PlanStatus::Running,
            steps_executed: 0,
            steps_skipped: 0,
            total_steps: plan.steps.len(),
        };

        for step in &plan.steps {
            if step.status == PlanStatus::Completed {
                debug!(step = %step.name, "step already completed, skipping");
                outcome.steps_skipped += 1;
                continue;
            }

            self.update(
                "start rollback step",
                RollbackStep::TABLE,
                &step.id,
                json!({
                    "status": PlanStatus::Running,
                    "started_at": current_timestamp(),
                    "error_msg": "",
                }),
            )?;
            info!(step = %step.name, step_order = step.step_order, step_type = %step.step_type, "executing rollback step");

            if let Err(e) = self.executors.execute(step) {
                let message = e.to_string();
                self.update(
                    "fail rollback step",
                    RollbackStep::TABLE,
                    &step.id,
                    json!({
                        "status": PlanStatus::Failed,
                        "completed_at": current_timestamp(),
                        "error_msg": message,
                    }),
                )?;
                self.update(
                    "fail rollback plan",
                    RollbackPlan::TABLE,
                    plan_id,
                    json!({ "status": PlanStatus::Failed }),
                )?;
                error!(plan_id, step = %step.name, error = %message, "rollback step failed, plan aborted");
                return Err(CutoverError::StepExecution {
                    step: step.name.clone(),
                    message,
                });
            }

            self.update(
                "complete rollback step",
                RollbackStep::TABLE,
                &step.id,
                json!({
                    "status": PlanStatus::Completed,
                    "completed_at": current_timestamp(),
                }),
            )?;
            outcome.steps_executed += 1;
        }

        self.update(
            "complete rollback plan",
            RollbackPlan::TABLE,
            plan_id,
            json!({
                "status": PlanStatus::Completed,
                "completed_at": current_timestamp(),
            }),
        )?;
        outcome.status = PlanStatus::Completed;
        info!(
            plan_id,
            executed = outcome.steps_executed,
            skipped = outcome.steps_skipped,
            "rollback completed"
        );
        Ok(outcome)
    }

    // ---- triggers ----

    /// Persist an active trigger.
    pub fn create_rollback_trigger(
        &self,
        migration_id: &str,
        trigger_type: TriggerType,
        threshold: f64,
        time_window_minutes: u32,
    ) -> Result<RollbackTrigger, CutoverError> {
        if !threshold.is_finite() {
            return Err(CutoverError::InvalidInput(format!(
                "trigger threshold must be finite, got {}",
                threshold
            )));
        }

        let trigger = RollbackTrigger {
            id: self.ids.generate(),
            migration_id: migration_id.to_string(),
            trigger_type,
            threshold,
            time_window: time_window_minutes,
            is_active: true,
            last_triggered: None,
            created_at: current_timestamp(),
        };

        let record = encode(&trigger).map_err(|e| CutoverError::persistence("create_rollback_trigger", e))?;
        self.store
            .create(RollbackTrigger::TABLE, record)
            .map_err(|e| CutoverError::persistence("create_rollback_trigger", e))?;

        info!(
            trigger_id = %trigger.id,
            migration_id,
            trigger_type = %trigger.trigger_type,
            threshold,
            "rollback trigger created"
        );
        Ok(trigger)
    }

    /// Stop evaluating a trigger.
    pub fn deactivate_trigger(&self, trigger_id: &str) -> Result<(), CutoverError> {
        self.update(
            "deactivate_trigger",
            RollbackTrigger::TABLE,
            trigger_id,
            json!({ "is_active": false }),
        )
    }

    /// All triggers of a migration, oldest first.
    pub fn get_rollback_triggers(&self, migration_id: &str) -> Result<Vec<RollbackTrigger>, CutoverError> {
        self.load_triggers("get_rollback_triggers", Filter::eq("migration_id", migration_id))
    }

    /// Evaluate the active triggers of a migration against live metrics.
    ///
    /// Triggers are evaluated oldest first and the first breach wins: it is
    /// stamped with `last_triggered` and returned. Executing the rollback is
    /// left to the caller.
    pub fn check_rollback_triggers(
        &self,
        migration_id: &str,
        metrics: &HashMap<String, f64>,
    ) -> Result<TriggerOutcome, CutoverError> {
        let triggers = self.load_triggers(
            "check_rollback_triggers",
            Filter::eq("migration_id", migration_id).and(Filter::eq("is_active", true)),
        )?;

        for trigger in triggers {
            let Some(value) = trigger.evaluate(metrics) else {
                continue;
            };

            self.update(
                "check_rollback_triggers",
                RollbackTrigger::TABLE,
                &trigger.id,
                json!({ "last_triggered": current_timestamp() }),
            )?;

            let reason = trigger.reason(value);
            warn!(
                migration_id,
                trigger_id = %trigger.id,
                trigger_type = %trigger.trigger_type,
                value,
                threshold = trigger.threshold,
                "rollback trigger fired"
            );
            return Ok(TriggerOutcome::Triggered {
                trigger_id: trigger.id,
                trigger_type: trigger.trigger_type,
                value,
                threshold: trigger.threshold,
                reason,
            });
        }

        Ok(TriggerOutcome::NotTriggered)
    }

    fn load_triggers(&self, operation: &str, filter: Filter) -> Result<Vec<RollbackTrigger>, CutoverError> {
        self.store
            .find_where(
                RollbackTrigger::TABLE,
                &filter,
                Some(&OrderBy::asc("created_at")),
                None,
            )
            .map_err(|e| CutoverError::persistence(operation, e))?
            .into_iter()
            .map(|record| decode(record).map_err(|e| CutoverError::persistence(operation, e)))
            .collect()
    }

    fn update(&self, operation: &str, table: &str, id: &str, changes: Value) -> Result<(), CutoverError> {
        self.store
            .update_fields(table, id, fields(changes))
            .map_err(|e| CutoverError::persistence(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::id::SequentialIdGenerator;
    use crate::rollback::executor::StepError;
    use crate::store::{MemoryStore, Record};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manager_with(store: Arc<dyn Store>) -> RollbackManager {
        let config = CutoverConfig::default()
            .with_step_delay(Duration::ZERO)
            .with_node_id("test");
        RollbackManager::from_config(store, &config)
    }

    fn manager() -> RollbackManager {
        manager_with(Arc::new(MemoryStore::new()))
    }

    fn metrics(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_plan_has_five_default_steps() {
        let manager = manager();
        let plan = manager
            .create_rollback_plan("m1", "emergency", "revert user cutover")
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Pending);
        let summary: Vec<(u32, &str, StepType)> = plan
            .steps
            .iter()
            .map(|s| (s.step_order, s.name.as_str(), s.step_type.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "Stop New Traffic", StepType::ApiCall),
                (2, "Backup Current State", StepType::Sql),
                (3, "Restore Legacy Data", StepType::Sql),
                (4, "Validate Legacy System", StepType::ApiCall),
                (5, "Update Configuration", StepType::FileOperation),
            ]
        );
        assert!(plan.steps.iter().all(|s| s.status == PlanStatus::Pending));

        let loaded = manager.get_rollback_plan(&plan.id).unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn test_new_uses_default_plan_parameters() {
        let manager = RollbackManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SequentialIdGenerator::new("rb")),
        )
        .with_executors(ExecutorRegistry::with_defaults(Duration::ZERO));

        let plan = manager.create_rollback_plan("m1", "p", "").unwrap();
        assert!(plan.id.starts_with("rb-"));
        assert_eq!(plan.steps[3].command, "GET http://legacy.internal/health");
        assert_eq!(plan.steps[3].parameters["timeout_secs"], json!(30));
        assert_eq!(plan.steps[1].parameters["tables"].as_array().unwrap().len(), 4);

        manager.execute_rollback(&plan.id).unwrap();
        let loaded = manager.get_rollback_plan(&plan.id).unwrap();
        assert_eq!(loaded.status, PlanStatus::Completed);
    }

    #[test]
    fn test_plan_requires_migration() {
        let err = manager().create_rollback_plan("", "x", "").unwrap_err();
        assert!(matches!(err, CutoverError::InvalidInput(_)));
    }

    #[test]
    fn test_execute_success() {
        let manager = manager();
        let plan = manager.create_rollback_plan("m1", "p", "").unwrap();

        let outcome = manager.execute_rollback(&plan.id).unwrap();
        assert_eq!(outcome.status, PlanStatus::Completed);
        assert_eq!(outcome.steps_executed, 5);
        assert_eq!(outcome.steps_skipped, 0);

        let done = manager.get_rollback_plan(&plan.id).unwrap();
        assert_eq!(done.status, PlanStatus::Completed);
        assert!(done.executed_at.unwrap() <= done.completed_at.unwrap());
        assert!(done.steps.iter().all(|s| s.status == PlanStatus::Completed));
    }

    #[test]
    fn test_third_step_failure_stops_plan() {
        let mut manager = manager();
        manager.register_executor(StepType::Sql, |step: &RollbackStep| -> Result<(), StepError> {
            if step.name == "Restore Legacy Data" {
                Err(StepError::Failed("backup checksum mismatch".to_string()))
            } else {
                Ok(())
            }
        });
        let plan = manager.create_rollback_plan("m1", "p", "").unwrap();

        let err = manager.execute_rollback(&plan.id).unwrap_err();
        assert!(matches!(err, CutoverError::StepExecution { ref step, .. } if step == "Restore Legacy Data"));

        let after = manager.get_rollback_plan(&plan.id).unwrap();
        assert_eq!(after.status, PlanStatus::Failed);
        let statuses: Vec<PlanStatus> = after.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                PlanStatus::Completed,
                PlanStatus::Completed,
                PlanStatus::Failed,
                PlanStatus::Pending,
                PlanStatus::Pending,
            ]
        );
        assert_eq!(after.steps[2].error_msg, "backup checksum mismatch");
        assert!(after.steps[3].started_at.is_none());
        assert!(after.completed_at.is_none());
    }

    #[test]
    fn test_rerun_resumes_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let mut manager = manager();
        {
            let calls = Arc::clone(&calls);
            let fail = Arc::clone(&fail);
            manager.register_executor(StepType::Sql, move |step: &RollbackStep| -> Result<(), StepError> {
                calls.fetch_add(1, Ordering::SeqCst);
                if step.step_order == 3 && fail.load(Ordering::SeqCst) {
                    return Err(StepError::Failed("transient".into()));
                }
                Ok(())
            });
        }
        let plan = manager.create_rollback_plan("m1", "p", "").unwrap();

        assert!(manager.execute_rollback(&plan.id).is_err());
        fail.store(false, Ordering::SeqCst);

        let outcome = manager.execute_rollback(&plan.id).unwrap();
        assert_eq!(outcome.status, PlanStatus::Completed);
        assert_eq!(outcome.steps_skipped, 2);
        assert_eq!(outcome.steps_executed, 3);
        // Step 2 ran once, step 3 twice.
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let after = manager.get_rollback_plan(&plan.id).unwrap();
        assert!(after.steps.iter().all(|s| s.error_msg.is_empty()));
    }

    #[test]
    fn test_unknown_step_type_fails_step() {
        let manager = manager().with_executors(ExecutorRegistry::empty());
        let plan = manager.create_rollback_plan("m1", "p", "").unwrap();

        let err = manager.execute_rollback(&plan.id).unwrap_err();
        assert!(err.to_string().contains("Stop New Traffic"));
        assert!(err.to_string().contains("api_call"));
    }

    #[test]
    fn test_execute_missing_plan() {
        assert!(matches!(
            manager().execute_rollback("nope"),
            Err(CutoverError::NotFound { .. })
        ));
    }

    #[test]
    fn test_trigger_fires_above_threshold() {
        let manager = manager();
        let trigger = manager
            .create_rollback_trigger("m1", TriggerType::ErrorRate, 5.0, 5)
            .unwrap();

        let quiet = manager
            .check_rollback_triggers("m1", &metrics(&[("error_rate", 3.0)]))
            .unwrap();
        assert!(!quiet.is_triggered());
        assert_eq!(quiet.reason(), "");

        let fired = manager
            .check_rollback_triggers("m1", &metrics(&[("error_rate", 7.2)]))
            .unwrap();
        assert!(fired.is_triggered());
        assert!(fired.reason().contains("error_rate"));

        let stored = manager.get_rollback_triggers("m1").unwrap();
        assert_eq!(stored[0].id, trigger.id);
        assert!(stored[0].last_triggered.is_some());
    }

    #[test]
    fn test_first_matching_trigger_wins() {
        let manager = manager();
        let latency = manager
            .create_rollback_trigger("m1", TriggerType::Latency, 200.0, 5)
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let errors = manager
            .create_rollback_trigger("m1", TriggerType::ErrorRate, 1.0, 5)
            .unwrap();

        let outcome = manager
            .check_rollback_triggers("m1", &metrics(&[("latency", 900.0), ("error_rate", 50.0)]))
            .unwrap();
        match outcome {
            TriggerOutcome::Triggered { trigger_id, .. } => assert_eq!(trigger_id, latency.id),
            TriggerOutcome::NotTriggered => panic!("expected a trigger to fire"),
        }

        let stored = manager.get_rollback_triggers("m1").unwrap();
        let untouched = stored.iter().find(|t| t.id == errors.id).unwrap();
        assert!(untouched.last_triggered.is_none());
    }

    #[test]
    fn test_inactive_and_foreign_triggers_ignored() {
        let manager = manager();
        let t = manager
            .create_rollback_trigger("m1", TriggerType::ErrorRate, 1.0, 5)
            .unwrap();
        manager
            .create_rollback_trigger("m2", TriggerType::ErrorRate, 1.0, 5)
            .unwrap();
        manager.deactivate_trigger(&t.id).unwrap();

        let outcome = manager
            .check_rollback_triggers("m1", &metrics(&[("error_rate", 99.0)]))
            .unwrap();
        assert_eq!(outcome, TriggerOutcome::NotTriggered);
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let err = manager()
            .create_rollback_trigger("m1", TriggerType::Latency, f64::NAN, 5)
            .unwrap_err();
        assert!(matches!(err, CutoverError::InvalidInput(_)));
    }

    /// Accepts the first `allowed` creates, then rejects everything.
    struct LimitedStore {
        inner: MemoryStore,
        allowed: usize,
        creates: AtomicUsize,
    }

    impl Store for LimitedStore {
        fn create(&self, table: &str, record: Record) -> Result<(), Error> {
            if self.creates.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(Error::Unavailable("quota exceeded".into()));
            }
            self.inner.create(table, record)
        }
        fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error> {
            self.inner.update_fields(table, id, fields)
        }
        fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error> {
            self.inner.find_by_id(table, id)
        }
        fn scan(&self, table: &str) -> Result<Vec<Record>, Error> {
            self.inner.scan(table)
        }
    }

    #[test]
    fn test_step_write_failure_names_step() {
        // Plan + two steps succeed, the third step write fails.
        let store = Arc::new(LimitedStore {
            inner: MemoryStore::new(),
            allowed: 3,
            creates: AtomicUsize::new(0),
        });
        let manager = manager_with(store);

        let err = manager.create_rollback_plan("m1", "p", "").unwrap_err();
        match err {
            CutoverError::Persistence { operation, .. } => {
                assert!(operation.contains("Restore Legacy Data"), "{operation}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
