//! Sled-backed store.
//!
//! Each table lives in its own tree named `table:<name>`; keys are the raw
//! identifier bytes and values are JSON-encoded records.

use super::{record_id, Record, Store, ID_FIELD};
use crate::error::Error;
use std::path::Path;
use tracing::debug;

/// A [`Store`] persisted with sled.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Prefix for table tree names.
    pub const TREE_PREFIX: &'static str = "table:";

    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a temporary store that is removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Wrap an already opened database.
    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    fn tree(&self, table: &str) -> Result<sled::Tree, Error> {
        if table.is_empty() {
            return Err(Error::InvalidData("empty table name".to_string()));
        }
        Ok(self.db.open_tree(format!("{}{}", Self::TREE_PREFIX, table))?)
    }

    fn to_bytes(record: &Record) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(record).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Record, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl Store for SledStore {
    fn create(&self, table: &str, record: Record) -> Result<(), Error> {
        let id = record_id(&record)?.to_string();
        let tree = self.tree(table)?;
        let value = Self::to_bytes(&record)?;

        match tree.compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(value))? {
            Ok(()) => Ok(()),
            Err(_) => Err(Error::Duplicate {
                table: table.to_string(),
                id,
            }),
        }
    }

    fn update_fields(&self, table: &str, id: &str, fields: Record) -> Result<(), Error> {
        let tree = self.tree(table)?;

        // Read-modify-write; retried if another writer got in between.
        loop {
            let current = tree.get(id.as_bytes())?.ok_or_else(|| Error::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

            let mut record = Self::from_bytes(&current)?;
            for (key, value) in &fields {
                if key != ID_FIELD {
                    record.insert(key.clone(), value.clone());
                }
            }
            let updated = Self::to_bytes(&record)?;

            match tree.compare_and_swap(id.as_bytes(), Some(current), Some(updated))? {
                Ok(()) => return Ok(()),
                Err(_) => {
                    debug!(table, id, "concurrent update detected, retrying");
                }
            }
        }
    }

    fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Record>, Error> {
        match self.tree(table)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, table: &str) -> Result<Vec<Record>, Error> {
        let mut records = Vec::new();
        for result in self.tree(table)?.iter() {
            let (_, value) = result?;
            records.push(Self::from_bytes(&value)?);
        }
        Ok(records)
    }
}
