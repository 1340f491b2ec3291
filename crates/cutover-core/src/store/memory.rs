//! In-memory store.

use super::{record_id, Record, Store};
use crate::error::Error;
use parking_lot::RwLock;
use std::collections::BTreeMap;

type Table = BTreeMap<String, Record>;

/// A [`Store`] kept entirely in memory.
///
/// Used for tests and dry runs. Tables are created on first write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<BTreeMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in a table.
    pub fn len(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Whether a table is empty or missing.
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

impl Store for MemoryStore {
    fn create(&self, table: &str, record: Record) -> Result<(), Error> {
        let id = record_id(&record)?.to_string();
        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(Error::Duplicate {
                table: table.to_string(),
                id,
            });
        }
        rows.insert(id, record);
        Ok(())
    }

    fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error> {
        let mut tables = self.tables.write();
        let record = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| Error::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        for (key, value) in fields {
            if key == super::ID_FIELD {
                continue;
            }
            record.insert(key, value);
        }
        Ok(())
    }

    fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error> {
        Ok(self
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, Error> {
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fields, Filter, OrderBy};
    use serde_json::json;

    #[test]
    fn test_create_and_find() {
        let store = MemoryStore::new();
        store
            .create("users", fields(json!({ "id": "u1", "name": "Ann" })))
            .unwrap();

        let found = store.find_by_id("users", "u1").unwrap().unwrap();
        assert_eq!(found["name"], json!("Ann"));
        assert!(store.find_by_id("users", "u2").unwrap().is_none());
        assert!(store.find_by_id("missing", "u1").unwrap().is_none());
        assert_eq!(store.len("users"), 1);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let store = MemoryStore::new();
        store.create("users", fields(json!({ "id": "u1" }))).unwrap();
        let err = store.create("users", fields(json!({ "id": "u1" }))).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
    }

    #[test]
    fn test_update_fields_merges() {
        let store = MemoryStore::new();
        store
            .create("users", fields(json!({ "id": "u1", "name": "Ann", "age": 30 })))
            .unwrap();
        store
            .update_fields("users", "u1", fields(json!({ "age": 31, "id": "hijack" })))
            .unwrap();

        let found = store.find_by_id("users", "u1").unwrap().unwrap();
        assert_eq!(found["age"], json!(31));
        assert_eq!(found["name"], json!("Ann"));
        assert_eq!(found["id"], json!("u1"));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_fields("users", "nope", fields(json!({ "a": 1 })))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_default_query_methods() {
        let store = MemoryStore::new();
        for (id, order) in [("a", 2), ("b", 1), ("c", 3)] {
            store
                .create("steps", fields(json!({ "id": id, "step_order": order, "kind": "x" })))
                .unwrap();
        }

        let rows = store
            .find_where("steps", &Filter::eq("kind", "x"), Some(&OrderBy::asc("step_order")), Some(2))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], json!("b"));
        assert_eq!(store.count("steps", &Filter::All).unwrap(), 3);
        assert_eq!(store.count("nothing", &Filter::All).unwrap(), 0);
    }
}
