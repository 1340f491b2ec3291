//! Retrying store decorator.

use super::{Filter, JoinOn, OrderBy, Record, Store};
use crate::config::RetryPolicy;
use crate::error::Error;
use tracing::warn;

/// Wraps a [`Store`] and retries transient failures per a [`RetryPolicy`].
pub struct RetryStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Store> RetryStore<S> {
    /// Wrap `inner` with the given policy.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, operation: &str, mut f: impl FnMut(&S) -> Result<T, Error>) -> Result<T, Error> {
        let mut attempt = 1;
        loop {
            match f(&self.inner) {
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient store error, retrying"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl<S: Store> Store for RetryStore<S> {
    fn create(&self, table: &str, record: Record) -> Result<(), Error> {
        self.run("create", |s| s.create(table, record.clone()))
    }

    fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error> {
        self.run("update_fields", |s| s.update_fields(table, id, fields.clone()))
    }

    fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error> {
        self.run("find_by_id", |s| s.find_by_id(table, id))
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, Error> {
        self.run("scan", |s| s.scan(table))
    }

    fn find_where(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, Error> {
        self.run("find_where", |s| s.find_where(table, filter, order, limit))
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, Error> {
        self.run("count", |s| s.count(table, filter))
    }

    fn grouped_count_having(
        &self,
        table: &str,
        group_by: &[&str],
        having_count_gt: u64,
    ) -> Result<u64, Error> {
        self.run("grouped_count_having", |s| {
            s.grouped_count_having(table, group_by, having_count_gt)
        })
    }

    fn left_join_is_null_count(
        &self,
        table: &str,
        join_table: &str,
        join: &JoinOn,
    ) -> Result<u64, Error> {
        self.run("left_join_is_null_count", |s| {
            s.left_join_is_null_count(table, join_table, join)
        })
    }
}
