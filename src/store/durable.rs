//! ACID-durable user trait store backed by redb.
//!
//! Each trait is stored as a JSON document keyed by its id. All writes go
//! through transactions; reads use MVCC snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::error::StoreError;
use crate::model::Trait;
use crate::store::{StoreResult, TraitStore};

/// User traits: id -> JSON document.
const TRAITS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("user_traits");

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "traits.redb";

fn redb_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Redb {
        message: format!("{context} failed: {e}"),
    }
}

/// Durable store using redb.
pub struct DurableStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join(DB_FILE);
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;

        // Read transactions cannot open a table that was never created.
        let txn = db.begin_write().map_err(|e| redb_err("begin_write", e))?;
        txn.open_table(TRAITS_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        txn.commit().map_err(|e| redb_err("commit", e))?;

        tracing::debug!(path = %db_path.display(), "opened durable trait store");
        Ok(Self {
            db: Arc::new(db),
            path: db_path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn decode(id: &str, bytes: &[u8]) -> StoreResult<Trait> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
        message: format!("trait \"{id}\": {e}"),
    })
}

fn encode(record: &Trait) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| StoreError::Serialization {
        message: format!("trait \"{}\": {e}", record.id),
    })
}

impl TraitStore for DurableStore {
    fn list(&self) -> StoreResult<Vec<Trait>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(TRAITS_TABLE)
            .map_err(|e| redb_err("open_table", e))?;

        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| redb_err("iter", e))? {
            let (key, value) = entry.map_err(|e| redb_err("iter", e))?;
            out.push(decode(key.value(), value.value())?);
        }
        Ok(out)
    }

    fn get(&self, id: &str) -> StoreResult<Option<Trait>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(TRAITS_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        let result = table.get(id).map_err(|e| redb_err("get", e))?;
        result.map(|guard| decode(id, guard.value())).transpose()
    }

    fn insert_new(&self, record: &Trait) -> StoreResult<bool> {
        let bytes = encode(record)?;
        // redb admits one write transaction at a time.
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(TRAITS_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            let taken = table
                .get(record.id.as_str())
                .map_err(|e| redb_err("get", e))?
                .is_some();
            if taken {
                return Ok(false);
            }
            table
                .insert(record.id.as_str(), bytes.as_slice())
                .map_err(|e| redb_err("insert", e))?;
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(true)
    }

    fn insert_batch(&self, records: &[Trait]) -> StoreResult<()> {
        let encoded = records
            .iter()
            .map(|t| encode(t).map(|bytes| (t.id.as_str(), bytes)))
            .collect::<StoreResult<Vec<_>>>()?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        {
            let mut table = txn
                .open_table(TRAITS_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            for (id, bytes) in &encoded {
                // The previous value is only present on a taken or repeated id.
                let previous = table
                    .insert(*id, bytes.as_slice())
                    .map_err(|e| redb_err("insert", e))?;
                if previous.is_some() {
                    return Err(StoreError::Duplicate { id: id.to_string() });
                }
            }
        }
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(())
    }

    fn remove(&self, id: &str) -> StoreResult<bool> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| redb_err("begin_write", e))?;
        let existed = {
            let mut table = txn
                .open_table(TRAITS_TABLE)
                .map_err(|e| redb_err("open_table", e))?;
            let result = table.remove(id).map_err(|e| redb_err("remove", e))?;
            result.is_some()
        };
        txn.commit().map_err(|e| redb_err("commit", e))?;
        Ok(existed)
    }

    fn len(&self) -> StoreResult<usize> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| redb_err("begin_read", e))?;
        let table = txn
            .open_table(TRAITS_TABLE)
            .map_err(|e| redb_err("open_table", e))?;
        let n = table.len().map_err(|e| redb_err("len", e))?;
        Ok(n as usize)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocalizedText, TraitCategory};
    use tempfile::TempDir;

    fn record(id: &str, formula: &str) -> Trait {
        let mut t = Trait::draft(LocalizedText::new(id, id), TraitCategory::Risk)
            .with_variant("rs671", "GG", "GG")
            .with_formula(formula);
        t.id = id.into();
        t
    }

    #[test]
    fn insert_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.len().unwrap(), 0);

        assert!(store.insert_new(&record("user-1", "SCORE(rs671:GG=1)")).unwrap());
        let back = store.get("user-1").unwrap().unwrap();
        assert_eq!(back.formula, "SCORE(rs671:GG=1)");
        assert_eq!(back.your_genotypes, vec!["GG"]);
        assert!(store.contains("user-1").unwrap());

        assert!(store.remove("user-1").unwrap());
        assert!(!store.contains("user-1").unwrap());
        assert!(store.get("user-1").unwrap().is_none());
    }

    #[test]
    fn existing_value_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();

        assert!(store.insert_new(&record("k", "SCORE(rs671:GG=1)")).unwrap());
        assert!(!store.insert_new(&record("k", "SCORE(rs671:GG=2)")).unwrap());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get("k").unwrap().unwrap().formula, "SCORE(rs671:GG=1)");
    }

    #[test]
    fn batch_commits_in_one_transaction() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store.insert_new(&record("b", "SCORE(rs671:GG=1)")).unwrap();

        let batch = [
            record("a", "SCORE(rs671:GG=1)"),
            record("b", "SCORE(rs671:GG=9)"),
            record("c", "SCORE(rs671:GG=1)"),
        ];
        let err = store.insert_batch(&batch).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { id } if id == "b"));
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.contains("a").unwrap());
        assert_eq!(store.get("b").unwrap().unwrap().formula, "SCORE(rs671:GG=1)");

        store.insert_batch(&[batch[0].clone(), batch[2].clone()]).unwrap();
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn concurrent_inserts_of_one_id_store_it_once() {
        use std::sync::{Arc, Barrier};
        let dir = TempDir::new().unwrap();
        let store = Arc::new(DurableStore::open(dir.path()).unwrap());
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store
                        .insert_new(&record("same-id", &format!("SCORE(rs671:GG={i})")))
                        .unwrap()
                })
            })
            .collect();
        let stored = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(stored, 1);
    }

    #[test]
    fn list_returns_every_record() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        for id in ["b", "a", "c"] {
            store.insert_new(&record(id, "SCORE(rs671:GG=1)")).unwrap();
        }
        let mut ids: Vec<String> = store.list().unwrap().into_iter().map(|t| t.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn persistence_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.insert_new(&record("persist", "IF(rs671=GG, 1, 0)")).unwrap();
        }

        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("persist").unwrap().unwrap().formula,
            "IF(rs671=GG, 1, 0)"
        );
        assert!(store.path().ends_with(DB_FILE));
    }

    #[test]
    fn remove_nonexistent_key() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(!store.remove("nonexistent").unwrap());
    }
}
