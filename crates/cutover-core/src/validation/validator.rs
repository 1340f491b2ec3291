//! Data validator: runs suites of checks against persisted data.

use super::check::Check;
use super::result::{SuiteStatus, ValidationResult, ValidationSuite};
use crate::config::CutoverConfig;
use crate::error::CutoverError;
use crate::store::{current_timestamp, Store};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Name of the event data suite.
pub const EVENT_SUITE: &str = "event_data";
/// Name of the WeChat user data suite.
pub const WECHAT_USER_SUITE: &str = "wechat_user_data";
/// Name of the core user data suite.
pub const USER_SUITE: &str = "user_data";

/// Runs validation suites.
pub struct DataValidator {
    store: Arc<dyn Store>,
    parallel: bool,
}

impl DataValidator {
    /// Create a validator that runs checks concurrently.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            parallel: true,
        }
    }

    /// Create a validator from an engine configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &CutoverConfig) -> Self {
        Self {
            store,
            parallel: config.validation.parallel,
        }
    }

    /// Enable or disable concurrent checks.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run `checks` and aggregate their results.
    ///
    /// Results are returned in declaration order whether or not the checks
    /// ran concurrently. The first store error aborts the suite.
    #[instrument(skip(self, checks), fields(checks = checks.len()))]
    pub fn run_suite(&self, name: &str, checks: &[Check]) -> Result<ValidationSuite, CutoverError> {
        let started_at = current_timestamp();
        let started = Instant::now();

        let results = if self.parallel && checks.len() > 1 {
            self.run_parallel(checks)?
        } else {
            checks
                .iter()
                .map(|check| check.run(self.store.as_ref()))
                .collect::<Result<Vec<_>, _>>()?
        };

        for result in results.iter().filter(|r| r.is_failure()) {
            warn!(
                suite = name,
                table = %result.table_name,
                check = %result.check_type,
                errors = result.error_count,
                "validation check failed"
            );
        }

        let status = SuiteStatus::from_results(&results);
        let suite = ValidationSuite {
            name: name.to_string(),
            results,
            status,
            started_at,
            duration: started.elapsed().as_micros() as u64,
        };
        info!(suite = name, status = %suite.status, duration_us = suite.duration, "validation suite finished");
        Ok(suite)
    }

    fn run_parallel(&self, checks: &[Check]) -> Result<Vec<ValidationResult>, CutoverError> {
        let store = self.store.as_ref();
        std::thread::scope(|scope| {
            let handles: Vec<_> = checks
                .iter()
                .map(|check| scope.spawn(move || check.run(store)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    /// Checks over events and their registrations.
    pub fn event_checks() -> Vec<Check> {
        vec![
            Check::required("event_title_required", "events", "title"),
            Check::field_order("event_time_order", "events", "start_time", "end_time"),
            Check::orphans(
                "registration_event_exists",
                "event_registrations",
                "event_id",
                "events",
                "id",
            ),
            Check::orphans(
                "registration_user_exists",
                "event_registrations",
                "user_id",
                "users",
                "id",
            ),
            Check::duplicates(
                "duplicate_registrations",
                "event_registrations",
                ["event_id", "user_id"],
            )
            .as_warning(),
        ]
    }

    /// Checks over WeChat-linked users.
    pub fn wechat_user_checks() -> Vec<Check> {
        vec![
            Check::required("wechat_openid_required", "wechat_users", "openid"),
            Check::duplicates("duplicate_openid", "wechat_users", ["openid"]),
            Check::orphans("wechat_user_exists", "wechat_users", "user_id", "users", "id"),
        ]
    }

    /// Checks over core users.
    pub fn user_checks() -> Vec<Check> {
        vec![
            Check::required("username_required", "users", "username"),
            Check::duplicates("duplicate_username", "users", ["username"]),
            Check::duplicates("duplicate_email", "users", ["email"]).as_warning(),
        ]
    }

    /// Validate events and registrations.
    pub fn validate_event_data(&self) -> Result<ValidationSuite, CutoverError> {
        self.run_suite(EVENT_SUITE, &Self::event_checks())
    }

    /// Validate WeChat-linked users.
    pub fn validate_wechat_user_data(&self) -> Result<ValidationSuite, CutoverError> {
        self.run_suite(WECHAT_USER_SUITE, &Self::wechat_user_checks())
    }

    /// Validate core users.
    pub fn validate_user_data(&self) -> Result<ValidationSuite, CutoverError> {
        self.run_suite(USER_SUITE, &Self::user_checks())
    }

    /// Run the three domain suites: users, WeChat users, events.
    pub fn validate_all(&self) -> Result<Vec<ValidationSuite>, CutoverError> {
        Ok(vec![
            self.validate_user_data()?,
            self.validate_wechat_user_data()?,
            self.validate_event_data()?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{fields, MemoryStore, Record};
    use crate::validation::ValidationStatus;
    use serde_json::json;

    fn seed(store: &MemoryStore, table: &str, rows: Vec<serde_json::Value>) {
        for row in rows {
            store.create(table, fields(row)).unwrap();
        }
    }

    fn clean_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        seed(
            &store,
            "users",
            vec![
                json!({ "id": "u1", "username": "ada", "email": "ada@example.com" }),
                json!({ "id": "u2", "username": "bob", "email": "bob@example.com" }),
            ],
        );
        seed(
            &store,
            "wechat_users",
            vec![json!({ "id": "w1", "openid": "o-1", "user_id": "u1" })],
        );
        seed(
            &store,
            "events",
            vec![json!({ "id": "e1", "title": "Launch", "start_time": 10, "end_time": 20 })],
        );
        seed(
            &store,
            "event_registrations",
            vec![
                json!({ "id": "r1", "event_id": "e1", "user_id": "u1" }),
                json!({ "id": "r2", "event_id": "e1", "user_id": "u2" }),
            ],
        );
        Arc::new(store)
    }

    #[test]
    fn test_clean_data_completes() {
        let validator = DataValidator::new(clean_store());
        let suites = validator.validate_all().unwrap();
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![USER_SUITE, WECHAT_USER_SUITE, EVENT_SUITE]);
        assert!(suites.iter().all(|s| s.status == SuiteStatus::Completed));
    }

    #[test]
    fn test_duplicate_registration_is_warning() {
        let store = clean_store();
        store
            .create(
                "event_registrations",
                fields(json!({ "id": "r3", "event_id": "e1", "user_id": "u1" })),
            )
            .unwrap();

        let suite = DataValidator::new(store).validate_event_data().unwrap();
        assert_eq!(suite.status, SuiteStatus::CompletedWithWarnings);
        let warning: Vec<_> = suite.warnings().map(|r| r.check_type.as_str()).collect();
        assert_eq!(warning, vec!["duplicate_registrations"]);
    }

    #[test]
    fn test_orphan_registration_fails() {
        let store = clean_store();
        store
            .create(
                "event_registrations",
                fields(json!({ "id": "r9", "event_id": "gone", "user_id": "u2" })),
            )
            .unwrap();

        let suite = DataValidator::new(store).validate_event_data().unwrap();
        assert_eq!(suite.status, SuiteStatus::Failed);
        let failed: Vec<_> = suite.failures().map(|r| r.check_type.as_str()).collect();
        assert_eq!(failed, vec!["registration_event_exists"]);
    }

    #[test]
    fn test_results_keep_declaration_order() {
        let store = clean_store();
        let checks = DataValidator::event_checks();
        for parallel in [true, false] {
            let suite = DataValidator::new(store.clone())
                .with_parallel(parallel)
                .run_suite("events", &checks)
                .unwrap();
            let order: Vec<_> = suite.results.iter().map(|r| r.check_type.clone()).collect();
            let expected: Vec<_> = checks.iter().map(|c| c.name.clone()).collect();
            assert_eq!(order, expected);
        }
    }

    #[test]
    fn test_user_suite_mixes_fail_and_warning() {
        let store = clean_store();
        seed(
            &store,
            "users",
            vec![
                json!({ "id": "u3", "username": "ada", "email": "ada@example.com" }),
                json!({ "id": "u4", "username": "", "email": "x@example.com" }),
            ],
        );

        let suite = DataValidator::new(store).validate_user_data().unwrap();
        let statuses: Vec<_> = suite.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ValidationStatus::Fail,
                ValidationStatus::Fail,
                ValidationStatus::Warning
            ]
        );
        assert_eq!(suite.status, SuiteStatus::Failed);
    }

    struct BrokenStore;

    impl Store for BrokenStore {
        fn create(&self, _: &str, _: Record) -> Result<(), Error> {
            Err(Error::Unavailable("down".into()))
        }
        fn update_fields(&self, _: &str, _: &str, _: Record) -> Result<(), Error> {
            Err(Error::Unavailable("down".into()))
        }
        fn find_by_id(&self, _: &str, _: &str) -> Result<Option<Record>, Error> {
            Err(Error::Unavailable("down".into()))
        }
        fn scan(&self, _: &str) -> Result<Vec<Record>, Error> {
            Err(Error::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_store_error_propagates() {
        let err = DataValidator::new(Arc::new(BrokenStore))
            .validate_user_data()
            .unwrap_err();
        assert!(matches!(err, CutoverError::Persistence { .. }));
        assert!(err.to_string().contains("username_required"));
    }
}
