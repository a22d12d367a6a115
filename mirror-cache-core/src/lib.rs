//! Mirror Cache Core - Local Shadow Store for Selah Clients
//!
//! Keeps a client-resident copy of server records so journal entries,
//! favorites, devotional history and challenge progress stay readable
//! while the network is down. The mirror is a read fallback only: it
//! never participates in write decisions, and a stale or empty mirror
//! is always a safe state.
//!
//! Each named store is one JSON document on disk (`<dir>/<store>.json`,
//! an object keyed by record id). `MirrorCache::disabled` builds a
//! cache with no backing directory for environments without persistent
//! local storage; every operation on it is a no-op.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

/// Errors raised by the mirror cache
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Mirror I/O error: {0}")]
    Io(String),

    #[error("Mirror serialization error: {0}")]
    Serialization(String),

    #[error("Invalid mirror store name: {0}")]
    InvalidStore(String),
}

impl From<std::io::Error> for MirrorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Counters describing the mirror's current contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub store_count: usize,
    pub record_count: usize,
    pub write_count: u64,
    pub skipped_records: u64,
}

/// Client-resident mirror of server records, one JSON file per store.
///
/// Records are keyed by their natural `"id"` field; a `put` replaces a
/// store's contents wholesale so the mirror always reflects the last
/// snapshot the client saw from the server.
pub struct MirrorCache {
    // None = disabled guard: no persistent storage available
    dir: Option<PathBuf>,

    // store name -> (record id -> record)
    stores: HashMap<String, BTreeMap<String, Value>>,

    write_count: u64,
    skipped_records: u64,
}

impl MirrorCache {
    /// Open a file-backed mirror rooted at `dir`, loading any stores a
    /// previous session left behind.
    pub fn open(dir: impl AsRef<Path>) -> Result<MirrorCache> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut stores = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(store) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match load_store(&path) {
                Ok(records) => {
                    debug!(store, records = records.len(), "Loaded mirror store");
                    stores.insert(store.to_string(), records);
                }
                Err(e) => {
                    // A corrupt store file must not take the client down;
                    // the next put rewrites it from server state.
                    warn!(store, error = %e, "Skipping unreadable mirror store");
                }
            }
        }

        debug!(dir = %dir.display(), stores = stores.len(), "Mirror cache opened");
        Ok(MirrorCache {
            dir: Some(dir),
            stores,
            write_count: 0,
            skipped_records: 0,
        })
    }

    /// Build a disabled mirror for environments without persistent local
    /// storage. Every put reports zero records mirrored and every read
    /// returns empty.
    pub fn disabled() -> MirrorCache {
        MirrorCache {
            dir: None,
            stores: HashMap::new(),
            write_count: 0,
            skipped_records: 0,
        }
    }

    /// Whether this mirror has a backing directory.
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Replace the named store's contents with `records`, keyed by each
    /// record's `"id"` field. Records without a string id are skipped
    /// with a warning. Returns the number of records mirrored.
    pub fn put(&mut self, store: &str, records: &[Value]) -> Result<usize> {
        let Some(dir) = self.dir.clone() else {
            return Ok(0);
        };
        validate_store_name(store)?;

        let mut map = BTreeMap::new();
        for record in records {
            match record.get("id").and_then(Value::as_str) {
                Some(id) => {
                    map.insert(id.to_string(), record.clone());
                }
                None => {
                    self.skipped_records += 1;
                    warn!(store, "Skipping mirror record without an id field");
                }
            }
        }

        let mirrored = map.len();
        persist_store(&dir, store, &map)?;
        self.stores.insert(store.to_string(), map);
        self.write_count += 1;

        debug!(store, records = mirrored, "Mirrored store snapshot");
        Ok(mirrored)
    }

    /// All records in the named store, in stable id order. Empty when the
    /// store is unknown or the mirror is disabled.
    pub fn get_all(&self, store: &str) -> Vec<Value> {
        match self.stores.get(store) {
            Some(map) => map.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Point lookup of one record by id.
    pub fn get(&self, store: &str, id: &str) -> Option<Value> {
        self.stores.get(store).and_then(|map| map.get(id).cloned())
    }

    /// Drop every store, in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        if let Some(dir) = &self.dir {
            for store in self.stores.keys() {
                let path = store_path(dir, store);
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        self.stores.clear();
        Ok(())
    }

    /// Current mirror counters.
    pub fn stats(&self) -> MirrorStats {
        MirrorStats {
            store_count: self.stores.len(),
            record_count: self.stores.values().map(|m| m.len()).sum(),
            write_count: self.write_count,
            skipped_records: self.skipped_records,
        }
    }
}

fn store_path(dir: &Path, store: &str) -> PathBuf {
    dir.join(format!("{}.json", store))
}

// Store names become file names; keep them to a safe alphabet.
fn validate_store_name(store: &str) -> Result<()> {
    let ok = !store.is_empty()
        && store
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(MirrorError::InvalidStore(store.to_string()))
    }
}

fn load_store(path: &Path) -> Result<BTreeMap<String, Value>> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

// Write-then-rename so a crash mid-write never leaves a torn store file.
fn persist_store(dir: &Path, store: &str, map: &BTreeMap<String, Value>) -> Result<()> {
    let path = store_path(dir, store);
    let tmp = dir.join(format!("{}.json.tmp", store));
    fs::write(&tmp, serde_json::to_vec(map)?)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}
