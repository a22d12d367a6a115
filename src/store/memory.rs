//! In-memory document store
//!
//! Backs tests and connectivity-free development with the same
//! optimistic-concurrency contract as the MongoDB backend: every
//! document carries a version counter and `transact` commits through a
//! bounded compare-and-swap loop.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::warn;

use crate::store::{
    CreateOutcome, DocPath, DocumentStore, TransactFn, TransactOutcome, Transition,
};
use crate::types::{EngineError, Result};

const MAX_TRANSACT_RETRIES: usize = 32;

#[derive(Debug, Clone)]
struct StoredDoc {
    version: u64,
    data: Value,
}

/// DashMap-backed document store
pub struct MemoryStore {
    docs: DashMap<String, StoredDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
        }
    }

    /// Number of documents across all collections
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &DocPath) -> Result<Option<Value>> {
        Ok(self
            .docs
            .get(&path.storage_key())
            .map(|entry| entry.value().data.clone()))
    }

    async fn write(&self, path: &DocPath, doc: Value) -> Result<()> {
        match self.docs.entry(path.storage_key()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                stored.version += 1;
                stored.data = doc;
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredDoc {
                    version: 1,
                    data: doc,
                });
            }
        }
        Ok(())
    }

    async fn create_if_absent(&self, path: &DocPath, doc: Value) -> Result<CreateOutcome> {
        match self.docs.entry(path.storage_key()) {
            Entry::Occupied(entry) => Ok(CreateOutcome::Exists(entry.get().data.clone())),
            Entry::Vacant(entry) => {
                entry.insert(StoredDoc {
                    version: 1,
                    data: doc,
                });
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn transact(&self, path: &DocPath, op: TransactFn<'_>) -> Result<TransactOutcome> {
        let key = path.storage_key();

        for _ in 0..MAX_TRANSACT_RETRIES {
            // Snapshot first; no shard lock may be held while the
            // closure runs.
            let observed = self.docs.get(&key).map(|entry| entry.value().clone());
            let observed_data = observed.as_ref().map(|stored| stored.data.clone());

            match op(observed_data.clone()) {
                Transition::Keep => {
                    return Ok(TransactOutcome {
                        committed: false,
                        doc: observed_data,
                    });
                }
                Transition::Write(new_doc) => match observed {
                    Some(prev) => {
                        let mut committed = false;
                        if let Some(mut entry) = self.docs.get_mut(&key) {
                            if entry.version == prev.version {
                                entry.version += 1;
                                entry.data = new_doc.clone();
                                committed = true;
                            }
                        }
                        if committed {
                            return Ok(TransactOutcome {
                                committed: true,
                                doc: Some(new_doc),
                            });
                        }
                        // Lost the race; re-run against the winner's state
                    }
                    None => match self.docs.entry(key.clone()) {
                        Entry::Occupied(_) => {
                            // Created mid-flight by another writer; re-run
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(StoredDoc {
                                version: 1,
                                data: new_doc.clone(),
                            });
                            return Ok(TransactOutcome {
                                committed: true,
                                doc: Some(new_doc),
                            });
                        }
                    },
                },
            }
        }

        warn!(path = %path, "Transaction retries exhausted");
        Err(EngineError::Conflict(format!(
            "transaction on {} exhausted {} retries",
            path, MAX_TRANSACT_RETRIES
        )))
    }

    async fn list_where(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>> {
        let prefix = format!("{}/", collection);
        let mut results = Vec::new();
        for entry in self.docs.iter() {
            if !entry.key().starts_with(&prefix) {
                continue;
            }
            if entry.value().data.get(field).and_then(Value::as_str) == Some(value) {
                results.push(entry.value().data.clone());
            }
        }
        Ok(results)
    }
}
