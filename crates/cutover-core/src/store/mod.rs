//! Persistence collaborator.
//!
//! Records are flat JSON objects keyed by their `id` field. The managers only
//! need the narrow contract expressed by [`Store`]: create, partial update,
//! point and filtered reads, and the two aggregates used for integrity checks.
//!
//! Filtering, ordering and aggregation have default implementations over
//! [`Store::scan`], so a backend only has to provide raw table access.
//! Backends with a native query engine can override them.

mod memory;
mod query;
mod retry;
mod sled_store;

pub use memory::MemoryStore;
pub use query::FilterEvaluator;
pub use retry::RetryStore;
pub use sled_store::SledStore;

use crate::error::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A persisted row.
pub type Record = serde_json::Map<String, Value>;

/// Name of the identifier column every record carries.
pub const ID_FIELD: &str = "id";

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Encode a typed value as a record.
pub fn encode<T: Serialize>(value: &T) -> Result<Record, Error> {
    match serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Decode a record into a typed value.
pub fn decode<T: DeserializeOwned>(record: Record) -> Result<T, Error> {
    serde_json::from_value(Value::Object(record)).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Build a field map from a `serde_json::json!` object literal.
pub fn fields(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Extract the identifier of a record.
pub fn record_id(record: &Record) -> Result<&str, Error> {
    record
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::InvalidData("record has no string id".to_string()))
}

/// Predicate over a record's fields. Missing fields behave as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every record.
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Field does not equal value.
    Ne(String, Value),
    /// Field equals one of the values.
    In(String, Vec<Value>),
    /// Field is null or absent.
    IsNull(String),
    /// Field is null, absent, or an empty/whitespace string.
    IsBlank(String),
    /// Both fields are present and `left < right`.
    FieldLt(String, String),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    /// `field IN (values)`.
    pub fn any_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Conjunction of two filters.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::All => other,
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

/// Ordering applied to filtered reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column to sort on.
    pub field: String,
    /// Direction of the sort.
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Join condition `table.column = join_table.join_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOn {
    /// Referencing column in the left table.
    pub column: String,
    /// Referenced column in the joined table.
    pub join_column: String,
}

impl JoinOn {
    /// Create a join condition.
    pub fn new(column: impl Into<String>, join_column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            join_column: join_column.into(),
        }
    }
}

/// The persistence contract required by the managers.
pub trait Store: Send + Sync {
    /// Insert a new record. Fails with [`Error::Duplicate`] if the id exists.
    fn create(&self, table: &str, record: Record) -> Result<(), Error>;

    /// Merge `fields` into an existing record.
    fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error>;

    /// Fetch a record by identifier.
    fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error>;

    /// Return every record in a table, in storage order.
    fn scan(&self, table: &str) -> Result<Vec<Record>, Error>;

    /// Records matching `filter`, optionally sorted and truncated.
    fn find_where(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, Error> {
        Ok(query::select(self.scan(table)?, filter, order, limit))
    }

    /// Number of records matching `filter`.
    fn count(&self, table: &str, filter: &Filter) -> Result<u64, Error> {
        Ok(query::count(&self.scan(table)?, filter))
    }

    /// Number of groups over `group_by` whose size exceeds `having_count_gt`.
    ///
    /// Rows with a null in any grouping column are not grouped.
    fn grouped_count_having(
        &self,
        table: &str,
        group_by: &[&str],
        having_count_gt: u64,
    ) -> Result<u64, Error> {
        Ok(query::grouped_count_having(
            &self.scan(table)?,
            group_by,
            having_count_gt,
        ))
    }

    /// Number of rows in `table` whose join column matches no row in
    /// `join_table`. Rows with a null join column are not counted.
    fn left_join_is_null_count(
        &self,
        table: &str,
        join_table: &str,
        join: &JoinOn,
    ) -> Result<u64, Error> {
        Ok(query::left_join_is_null_count(
            &self.scan(table)?,
            &self.scan(join_table)?,
            join,
        ))
    }
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn create(&self, table: &str, record: Record) -> Result<(), Error> {
        (**self).create(table, record)
    }

    fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error> {
        (**self).update_fields(table, id, fields)
    }

    fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error> {
        (**self).find_by_id(table, id)
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, Error> {
        (**self).scan(table)
    }

    fn find_where(
        &self,
        table: &str,
        filter: &Filter,
        order: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, Error> {
        (**self).find_where(table, filter, order, limit)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, Error> {
        (**self).count(table, filter)
    }

    fn grouped_count_having(
        &self,
        table: &str,
        group_by: &[&str],
        having_count_gt: u64,
    ) -> Result<u64, Error> {
        (**self).grouped_count_having(table, group_by, having_count_gt)
    }

    fn left_join_is_null_count(
        &self,
        table: &str,
        join_table: &str,
        join: &JoinOn,
    ) -> Result<u64, Error> {
        (**self).left_join_is_null_count(table, join_table, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Row {
            id: String,
            n: u64,
        }

        let row = Row {
            id: "a".to_string(),
            n: 3,
        };
        let record = encode(&row).unwrap();
        assert_eq!(record_id(&record).unwrap(), "a");
        let back: Row = decode(record).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_encode_rejects_non_object() {
        assert!(matches!(encode(&5u32), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_record_id_missing() {
        let record = fields(json!({ "name": "x" }));
        assert!(matches!(record_id(&record), Err(Error::InvalidData(_))));
        let record = fields(json!({ "id": "" }));
        assert!(record_id(&record).is_err());
    }

    #[test]
    fn test_filter_and_flattens() {
        let f = Filter::All.and(Filter::eq("a", 1)).and(Filter::eq("b", 2));
        assert_eq!(
            f,
            Filter::And(vec![Filter::eq("a", 1), Filter::eq("b", 2)])
        );
    }
}
