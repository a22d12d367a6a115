//! Document store abstraction
//!
//! All engine state lives in a remote document database reached over the
//! network, with no ordering guarantees between concurrent clients.
//! Everything the engine needs from that database fits five operations;
//! backends implement them and the services stay agnostic. `MongoStore`
//! backs production, `MemoryStore` backs tests and connectivity-free
//! development.
//!
//! ## Concurrency contract
//!
//! `transact` runs its closure against a fresh read and commits only if
//! no other writer committed in between, retrying internally on
//! conflict. Two calls racing on one document are serialized: the
//! loser's closure re-runs against the winner's committed state before
//! its own write can land. Every engine mutation is exactly one
//! transaction on one document.

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use serde_json::Value;

use crate::types::Result;

/// Address of one document: a collection plus a document id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Flat key form, `collection/id`
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Outcome of a `create_if_absent` call
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// This call created the document
    Created,
    /// Another writer got there first; their document is returned untouched
    Exists(Value),
}

/// What a transaction closure decided for the document
#[derive(Debug, Clone)]
pub enum Transition {
    /// Commit this as the document's new state
    Write(Value),
    /// Leave the document exactly as observed
    Keep,
}

/// Result of a `transact` call
#[derive(Debug, Clone)]
pub struct TransactOutcome {
    /// Whether this call committed a write
    pub committed: bool,
    /// Final document state: the written document after a commit, the
    /// observed document after a `Keep`, `None` when nothing existed
    pub doc: Option<Value>,
}

/// Transaction body. Observes the current document (or its absence) and
/// decides the transition. The body is re-run from scratch whenever the
/// commit loses a race, so it must stay free of side effects.
pub type TransactFn<'a> = &'a (dyn Fn(Option<Value>) -> Transition + Send + Sync);

/// Narrow seam over the remote document database (allows swapping
/// backends and mocking in tests)
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point read of one document
    async fn read(&self, path: &DocPath) -> Result<Option<Value>>;

    /// Unconditional point write (insert or replace)
    async fn write(&self, path: &DocPath, doc: Value) -> Result<()>;

    /// Create the document only if nothing exists at `path`
    async fn create_if_absent(&self, path: &DocPath, doc: Value) -> Result<CreateOutcome>;

    /// Atomic read-modify-write with internal conflict retry
    async fn transact(&self, path: &DocPath, op: TransactFn<'_>) -> Result<TransactOutcome>;

    /// All documents in `collection` whose top-level `field` equals `value`
    async fn list_where(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>>;
}
