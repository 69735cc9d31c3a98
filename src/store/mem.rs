//! In-memory user trait store backed by DashMap.
//!
//! All data is lost on process exit.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::StoreError;
use crate::model::Trait;
use crate::store::{StoreResult, TraitStore};

/// Concurrent in-memory store using a sharded hashmap.
#[derive(Debug, Default)]
pub struct MemStore {
    data: DashMap<String, Trait>,
    /// Serializes batch writes against single inserts.
    writes: Mutex<()>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraitStore for MemStore {
    fn list(&self) -> StoreResult<Vec<Trait>> {
        Ok(self.data.iter().map(|entry| entry.value().clone()).collect())
    }

    fn get(&self, id: &str) -> StoreResult<Option<Trait>> {
        Ok(self.data.get(id).map(|v| v.value().clone()))
    }

    fn insert_new(&self, record: &Trait) -> StoreResult<bool> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        match self.data.entry(record.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    fn insert_batch(&self, records: &[Trait]) -> StoreResult<()> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id.as_str()) || self.data.contains_key(&record.id) {
                return Err(StoreError::Duplicate {
                    id: record.id.clone(),
                });
            }
        }
        for record in records {
            self.data.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> StoreResult<bool> {
        Ok(self.data.remove(id).is_some())
    }

    fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.data.contains_key(id))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocalizedText, TraitCategory};

    fn record(id: &str) -> Trait {
        let mut t = Trait::draft(LocalizedText::uniform(id), TraitCategory::Lifestyle);
        t.id = id.into();
        t
    }

    #[test]
    fn insert_and_get() {
        let store = MemStore::new();
        assert!(store.insert_new(&record("a")).unwrap());
        assert_eq!(store.get("a").unwrap().unwrap().name.en, "a");
        assert!(store.get("b").unwrap().is_none());
    }

    #[test]
    fn existing_id_is_kept() {
        let store = MemStore::new();
        store.insert_new(&record("a")).unwrap();
        let mut replacement = record("a");
        replacement.formula = "SCORE(rs1:AA=1)".into();
        assert!(!store.insert_new(&replacement).unwrap());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("a").unwrap().unwrap().formula, "");
    }

    #[test]
    fn batch_with_taken_id_writes_nothing() {
        let store = MemStore::new();
        store.insert_new(&record("b")).unwrap();
        let err = store
            .insert_batch(&[record("a"), record("b"), record("c")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { id } if id == "b"));
        assert_eq!(store.len().unwrap(), 1);

        assert!(store.insert_batch(&[record("a"), record("a")]).is_err());
        assert!(!store.contains("a").unwrap());

        store.insert_batch(&[record("a"), record("c")]).unwrap();
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn remove() {
        let store = MemStore::new();
        store.insert_new(&record("a")).unwrap();
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(!store.contains("a").unwrap());
    }

    #[test]
    fn concurrent_access() {
        use std::sync::Arc;
        let store = Arc::new(MemStore::new());
        let handles: Vec<_> = (0..100)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.insert_new(&record(&format!("user-{i}"))).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 100);
    }

    #[test]
    fn concurrent_inserts_of_one_id_store_it_once() {
        use std::sync::{Arc, Barrier};
        let store = Arc::new(MemStore::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let mut t = record("same-id");
                    t.formula = format!("SCORE(rs1:AA={i})");
                    barrier.wait();
                    store.insert_new(&t).unwrap()
                })
            })
            .collect();
        let stored = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(stored, 1);
        assert_eq!(store.len().unwrap(), 1);
    }
}
