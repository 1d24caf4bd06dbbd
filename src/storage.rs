//! Durable record stores backing enrichments, alerts, decisions, and execution results
//! (§3, §4.1, §4.2, §4.5, §4.7). One Sled database, one named tree per record kind,
//! JSON-encoded values (kept as JSON rather than the KV layer's bincode so records stay
//! directly inspectable and interoperate with the execution log's JSON output, §6).

use crate::error::{AppError, Result};
use serde::{de::DeserializeOwned, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Db>,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn tree(&self, name: &'static str) -> Result<RecordTree> {
        let tree = self.db.open_tree(name)?;
        Ok(RecordTree { tree })
    }
}

/// A single named tree, storing one JSON record per `Uuid` key.
#[derive(Clone)]
pub struct RecordTree {
    tree: sled::Tree,
}

impl RecordTree {
    pub fn insert<T: Serialize>(&self, id: Uuid, record: &T) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.tree.insert(id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Insert only if no record exists yet for `id`; returns whether the insert happened.
    /// Used for the Decision Engine's exactly-one-Decision-per-Alert invariant (§3, §4.5).
    pub fn insert_if_absent<T: Serialize>(&self, id: Uuid, record: &T) -> Result<bool> {
        let bytes = serde_json::to_vec(record)?;
        let result = self
            .tree
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.is_ok())
    }

    pub fn get<T: DeserializeOwned>(&self, id: Uuid) -> Result<Option<T>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, id: Uuid) -> Result<bool> {
        Ok(self.tree.contains_key(id.as_bytes())?)
    }

    /// All records in the tree, newest-insertion-order not guaranteed (Sled orders by key).
    pub fn scan_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.tree
            .iter()
            .values()
            .map(|v| {
                let bytes = v?;
                serde_json::from_slice(&bytes).map_err(AppError::from)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Thing {
        label: String,
    }

    #[test]
    fn insert_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let tree = store.tree("things").unwrap();

        let id = Uuid::new_v4();
        tree.insert(id, &Thing { label: "a".to_string() }).unwrap();

        let fetched: Thing = tree.get(id).unwrap().unwrap();
        assert_eq!(fetched.label, "a");
    }

    #[test]
    fn insert_if_absent_refuses_a_second_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let tree = store.tree("things").unwrap();

        let id = Uuid::new_v4();
        assert!(tree.insert_if_absent(id, &Thing { label: "a".to_string() }).unwrap());
        assert!(!tree.insert_if_absent(id, &Thing { label: "b".to_string() }).unwrap());

        let fetched: Thing = tree.get(id).unwrap().unwrap();
        assert_eq!(fetched.label, "a");
    }

    #[test]
    fn scan_all_returns_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let tree = store.tree("things").unwrap();

        tree.insert(Uuid::new_v4(), &Thing { label: "a".to_string() }).unwrap();
        tree.insert(Uuid::new_v4(), &Thing { label: "b".to_string() }).unwrap();

        let all: Vec<Thing> = tree.scan_all().unwrap();
        assert_eq!(all.len(), 2);
    }
}
