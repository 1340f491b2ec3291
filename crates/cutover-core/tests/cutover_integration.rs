//! End-to-end tests over an on-disk store.

use cutover_core::{
    CutoverConfig, CutoverError, DataValidator, LogLevel, Migration, MigrationManager,
    MigrationStatus, MigrationStep, PlanStatus, RetryPolicy, RetryStore, RollbackManager,
    RollbackStep, SledStore, StepError, StepType, Store, SuiteStatus, TriggerType,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct TestContext {
    store: Arc<dyn Store>,
    config: CutoverConfig,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = CutoverConfig::new(dir.path())
            .with_step_delay(Duration::ZERO)
            .with_retry(RetryPolicy::exponential(3, Duration::from_millis(1)));
        let sled = SledStore::open(&config.data_path).unwrap();
        let store: Arc<dyn Store> = Arc::new(RetryStore::new(sled, config.retry.clone()));
        Self {
            store,
            config,
            _dir: dir,
        }
    }

    fn migrations(&self) -> MigrationManager {
        MigrationManager::from_config(self.store.clone(), &self.config)
    }

    fn rollbacks(&self) -> RollbackManager {
        RollbackManager::from_config(self.store.clone(), &self.config)
    }

    fn validator(&self) -> DataValidator {
        DataValidator::from_config(self.store.clone(), &self.config)
    }
}

#[test]
fn test_migration_lifecycle() {
    let ctx = TestContext::new();
    let manager = ctx.migrations();

    let migration = manager
        .create_migration(Migration::new("users", "2024.1").with_description("copy users"))
        .unwrap();
    assert_eq!(migration.status, MigrationStatus::Pending);
    assert!(!migration.checksum.is_empty());

    manager.start_migration(&migration.id).unwrap();
    let copy = manager
        .add_migration_step(MigrationStep::new(&migration.id, "copy", 0).with_records_total(4))
        .unwrap();
    let verify = manager
        .add_migration_step(MigrationStep::new(&migration.id, "verify", 0))
        .unwrap();
    assert_eq!((copy.step_order, verify.step_order), (1, 2));

    manager.start_migration_step(&copy.id).unwrap();
    manager.update_step_progress(&copy.id, 2).unwrap();
    assert_eq!(
        manager.get_migration_step(&copy.id).unwrap().percent_complete(),
        Some(50.0)
    );
    manager.complete_step(&copy.id).unwrap();
    manager
        .log_migration(&migration.id, Some(&copy.id), LogLevel::Info, "copied", json!({ "rows": 4 }))
        .unwrap();

    manager.complete_migration(&migration.id).unwrap();
    let done = manager.get_migration(&migration.id).unwrap();
    assert_eq!(done.status, MigrationStatus::Completed);
    assert!(done.started_at.unwrap() <= done.completed_at.unwrap());
    assert!(manager.get_active_migrations().unwrap().is_empty());

    let logs = manager.get_migration_logs(&migration.id, None).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].step_id.as_deref(), Some(copy.id.as_str()));
}

#[test]
fn test_steps_sorted_regardless_of_insertion() {
    let ctx = TestContext::new();
    let manager = ctx.migrations();
    let migration = manager.create_migration(Migration::new("events", "1")).unwrap();

    for (name, order) in [("third", 3), ("first", 1), ("second", 2)] {
        manager
            .add_migration_step(MigrationStep::new(&migration.id, name, order))
            .unwrap();
    }

    let names: Vec<String> = manager
        .get_migration_steps(&migration.id)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[test]
fn test_fail_twice_keeps_last_message() {
    let ctx = TestContext::new();
    let manager = ctx.migrations();
    let migration = manager.create_migration(Migration::new("users", "1")).unwrap();

    manager.fail_migration(&migration.id, "first").unwrap();
    manager.fail_migration(&migration.id, "second").unwrap();

    let failed = manager.get_migration(&migration.id).unwrap();
    assert_eq!(failed.status, MigrationStatus::Failed);
    assert_eq!(failed.error_msg, "second");
}

#[test]
fn test_rollback_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = CutoverConfig::new(dir.path()).with_step_delay(Duration::ZERO);

    let plan_id = {
        let sled = Arc::new(SledStore::open(dir.path()).unwrap());
        let mut manager = RollbackManager::from_config(sled.clone(), &config);
        manager.register_executor(StepType::Sql, |step: &RollbackStep| -> Result<(), StepError> {
            if step.name == "Restore Legacy Data" {
                Err(StepError::Failed("restore target locked".to_string()))
            } else {
                Ok(())
            }
        });
        let plan = manager.create_rollback_plan("m1", "emergency", "").unwrap();
        let err = manager.execute_rollback(&plan.id).unwrap_err();
        assert!(matches!(err, CutoverError::StepExecution { .. }));
        sled.flush().unwrap();
        plan.id
    };

    let store: Arc<dyn Store> = Arc::new(SledStore::open(dir.path()).unwrap());
    let manager = RollbackManager::from_config(store, &config);

    let plan = manager.get_rollback_plan(&plan_id).unwrap();
    assert_eq!(plan.status, PlanStatus::Failed);
    let statuses: Vec<PlanStatus> = plan.steps.iter().map(|s| s.status).collect();
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
    assert!(!plan.steps[2].error_msg.is_empty());

    let outcome = manager.execute_rollback(&plan_id).unwrap();
    assert_eq!(outcome.status, PlanStatus::Completed);
    assert_eq!(outcome.steps_skipped, 2);
    assert_eq!(manager.list_rollback_plans("m1").unwrap().len(), 1);
}

#[test]
fn test_trigger_drives_rollback() {
    let ctx = TestContext::new();
    let rollbacks = ctx.rollbacks();

    rollbacks
        .create_rollback_trigger("m1", TriggerType::ErrorRate, 5.0, 5)
        .unwrap();
    let plan = rollbacks.create_rollback_plan("m1", "auto", "").unwrap();

    let calm: HashMap<String, f64> = [("error_rate".to_string(), 3.0)].into();
    let outcome = rollbacks.check_rollback_triggers("m1", &calm).unwrap();
    assert!(!outcome.is_triggered());
    assert!(outcome.reason().is_empty());

    let burning: HashMap<String, f64> = [("error_rate".to_string(), 7.2)].into();
    let outcome = rollbacks.check_rollback_triggers("m1", &burning).unwrap();
    assert!(outcome.is_triggered());
    assert!(outcome.reason().contains("error_rate"));

    let result = rollbacks.execute_rollback(&plan.id).unwrap();
    assert_eq!(result.steps_executed, 5);
}

#[test]
fn test_integrity_and_validation_agree() {
    let ctx = TestContext::new();
    let manager = ctx.migrations();

    for (table, row) in [
        ("users", json!({ "id": "u1", "username": "ada", "email": "a@example.com" })),
        ("events", json!({ "id": "e1", "title": "Launch", "start_time": 1, "end_time": 2 })),
        ("event_registrations", json!({ "id": "r1", "event_id": "e1", "user_id": "u1" })),
    ] {
        ctx.store
            .create(table, cutover_core::store::fields(row))
            .unwrap();
    }

    manager
        .validate_data_integrity(&["users", "events", "event_registrations"])
        .unwrap();
    let suites = ctx.validator().validate_all().unwrap();
    assert!(suites.iter().all(|s| s.status == SuiteStatus::Completed));

    ctx.store
        .create(
            "event_registrations",
            cutover_core::store::fields(json!({ "id": "r2", "event_id": "e404", "user_id": "u1" })),
        )
        .unwrap();

    let err = manager
        .validate_data_integrity(&["users", "event_registrations"])
        .unwrap_err();
    assert!(matches!(err, CutoverError::Integrity { ref table, .. } if table == "event_registrations"));

    let events = ctx.validator().validate_event_data().unwrap();
    assert_eq!(events.status, SuiteStatus::Failed);
}
