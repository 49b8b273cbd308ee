use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{EntityKey, EntityKind, EntityStore, StoreError, StoredRecord, UnitOfWork, Write};

/// In-memory entity store.
///
/// Intended for tests/dev. Records are kept as JSON so every shape goes
/// through the same serde path a durable backend would use. A commit holds
/// the write lock for its whole duration, which serializes units of work.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    records: RwLock<HashMap<EntityKey, StoredRecord>>,
    fail_next_commit: AtomicBool,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with `Unavailable` without writing anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, key: &EntityKey) -> Result<Option<StoredRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    fn load_all(&self, kind: EntityKind) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let mut out: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.key.kind == kind)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        if unit.is_empty() {
            return Ok(());
        }

        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        // Stage every write against the current state (and earlier writes of
        // the same unit) before touching the map.
        let mut staged: HashMap<EntityKey, Option<StoredRecord>> = HashMap::new();
        for write in unit.into_writes() {
            let key = write.key();
            let current = match staged.get(&key) {
                Some(pending) => pending.as_ref().map(|r| r.version),
                None => records.get(&key).map(|r| r.version),
            };

            let expected = write.expected();
            if !expected.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{key}: expected {expected:?}, found {current:?}"
                )));
            }

            let next = match write {
                Write::Put { record, .. } => {
                    let version = record
                        .aggregate_version()
                        .unwrap_or_else(|| current.unwrap_or(0) + 1);
                    Some(StoredRecord {
                        payload: record.to_json()?,
                        key: key.clone(),
                        version,
                    })
                }
                Write::Delete { .. } => None,
            };
            staged.insert(key, next);
        }

        for (key, next) in staged {
            match next {
                Some(record) => {
                    records.insert(key, record);
                }
                None => {
                    records.remove(&key);
                }
            }
        }

        Ok(())
    }
}
