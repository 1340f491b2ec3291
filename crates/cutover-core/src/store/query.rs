//! Filter evaluation and aggregation over scanned records.

use super::{Filter, JoinOn, OrderBy, Record, SortDirection, ID_FIELD};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Evaluates [`Filter`] expressions against records.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Returns `true` if the record matches the filter.
    pub fn matches(filter: &Filter, record: &Record) -> bool {
        match filter {
            Filter::All => true,
            Filter::Eq(field, value) => values_equal(field_value(record, field), value),
            Filter::Ne(field, value) => !values_equal(field_value(record, field), value),
            Filter::In(field, values) => {
                let actual = field_value(record, field);
                values.iter().any(|v| values_equal(actual, v))
            }
            Filter::IsNull(field) => field_value(record, field).is_null(),
            Filter::IsBlank(field) => match field_value(record, field) {
                Value::Null => true,
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            },
            Filter::FieldLt(left, right) => {
                let (l, r) = (field_value(record, left), field_value(record, right));
                if l.is_null() || r.is_null() {
                    return false;
                }
                compare_values(l, r) == Some(Ordering::Less)
            }
            Filter::And(filters) => filters.iter().all(|f| Self::matches(f, record)),
            Filter::Or(filters) => filters.iter().any(|f| Self::matches(f, record)),
        }
    }
}

const NULL: Value = Value::Null;

fn field_value<'a>(record: &'a Record, field: &str) -> &'a Value {
    record.get(field).unwrap_or(&NULL)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Total-ish ordering used for sorting: nulls first, then booleans, numbers,
/// strings. Mixed or structured values compare as equal.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable key for grouping and join lookups.
fn group_key(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("n:{}", f as i64),
            _ => format!("n:{}", n),
        },
        Value::String(s) => format!("s:{}", s),
        other => other.to_string(),
    }
}

pub(crate) fn select(
    records: Vec<Record>,
    filter: &Filter,
    order: Option<&OrderBy>,
    limit: Option<usize>,
) -> Vec<Record> {
    let mut rows: Vec<Record> = records
        .into_iter()
        .filter(|r| FilterEvaluator::matches(filter, r))
        .collect();

    if let Some(order) = order {
        // Ties on the sort field fall back to the record id so the order does
        // not depend on storage layout.
        rows.sort_by(|a, b| {
            let ord = compare_values(field_value(a, &order.field), field_value(b, &order.field))
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    compare_values(field_value(a, ID_FIELD), field_value(b, ID_FIELD))
                        .unwrap_or(Ordering::Equal)
                });
            match order.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }

    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

pub(crate) fn count(records: &[Record], filter: &Filter) -> u64 {
    records
        .iter()
        .filter(|r| FilterEvaluator::matches(filter, r))
        .count() as u64
}

pub(crate) fn grouped_count_having(records: &[Record], group_by: &[&str], having_count_gt: u64) -> u64 {
    if group_by.is_empty() {
        return u64::from(records.len() as u64 > having_count_gt);
    }

    let mut groups: HashMap<Vec<String>, u64> = HashMap::new();
    'rows: for record in records {
        let mut key = Vec::with_capacity(group_by.len());
        for column in group_by {
            let value = field_value(record, column);
            if value.is_null() {
                continue 'rows;
            }
            key.push(group_key(value));
        }
        *groups.entry(key).or_default() += 1;
    }

    groups.values().filter(|&&n| n > having_count_gt).count() as u64
}

pub(crate) fn left_join_is_null_count(records: &[Record], joined: &[Record], join: &JoinOn) -> u64 {
    let present: HashSet<String> = joined
        .iter()
        .map(|r| field_value(r, &join.join_column))
        .filter(|v| !v.is_null())
        .map(group_key)
        .collect();

    records
        .iter()
        .map(|r| field_value(r, &join.column))
        .filter(|v| !v.is_null() && !present.contains(&group_key(v)))
        .count() as u64
}
