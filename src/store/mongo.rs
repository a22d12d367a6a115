//! MongoDB document store backend
//!
//! Every engine document is wrapped in an envelope carrying a `version`
//! counter; `transact` commits through an update filtered on that
//! version, so a racing writer makes the filter miss and the
//! transaction re-runs against the fresh state. Unique `_id` keys give
//! `create_if_absent` its atomicity via duplicate-key rejection.

use bson::{doc, DateTime, Document};
use futures_util::StreamExt;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::reflections::REFLECTION_COLLECTION;
use crate::store::{
    CreateOutcome, DocPath, DocumentStore, TransactFn, TransactOutcome, Transition,
};
use crate::types::{EngineError, Result};

const DEFAULT_TRANSACT_RETRIES: usize = 8;

/// Server error code for unique key collisions
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Common metadata carried by every stored document
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Metadata {
    /// When the document was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    /// When the document was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Metadata {
    /// Create new metadata with current timestamps
    pub fn new() -> Self {
        Self {
            created_at: Some(DateTime::now()),
            updated_at: Some(DateTime::now()),
        }
    }
}

/// Envelope wrapping every engine document in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DocEnvelope {
    #[serde(rename = "_id")]
    pub id: String,

    /// Optimistic concurrency counter, bumped by every committed write
    pub version: i64,

    /// The engine-level document
    pub data: Document,

    #[serde(default)]
    pub metadata: Metadata,
}

/// MongoDB-backed document store
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db_name: String,
    max_retries: usize,
}

impl MongoStore {
    /// Connect, verify with a ping, and apply indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| EngineError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| EngineError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            client,
            db_name: db_name.to_string(),
            max_retries: DEFAULT_TRANSACT_RETRIES,
        };
        store.ensure_indexes().await;
        Ok(store)
    }

    /// Connect using validated engine configuration
    pub async fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = Self::connect(&config.mongodb_uri, &config.mongodb_db).await?;
        Ok(store.with_max_retries(config.txn_max_retries))
    }

    /// Override the transaction retry budget
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn collection(&self, name: &str) -> Collection<DocEnvelope> {
        self.client.database(&self.db_name).collection(name)
    }

    /// Ensure secondary indexes exist; failures are logged, not fatal
    async fn ensure_indexes(&self) {
        let indexes = vec![(REFLECTION_COLLECTION, doc! { "data.content_id": 1 })];

        for (collection, keys) in indexes {
            let index = IndexModel::builder().keys(keys).build();
            if let Err(e) = self.collection(collection).create_index(index).await {
                warn!(collection, "Failed to create index: {}", e);
            }
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == DUPLICATE_KEY_CODE
    )
}

#[async_trait::async_trait]
impl DocumentStore for MongoStore {
    async fn read(&self, path: &DocPath) -> Result<Option<Value>> {
        let envelope = self
            .collection(&path.collection)
            .find_one(doc! { "_id": &path.id })
            .await
            .map_err(|e| EngineError::Database(format!("Find failed: {}", e)))?;

        match envelope {
            Some(env) => Ok(Some(bson::from_document(env.data)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, path: &DocPath, doc: Value) -> Result<()> {
        let data = bson::to_document(&doc)?;
        let update = doc! {
            "$set": { "data": data, "metadata.updated_at": DateTime::now() },
            "$setOnInsert": { "metadata.created_at": DateTime::now() },
            "$inc": { "version": 1i64 },
        };

        self.collection(&path.collection)
            .update_one(doc! { "_id": &path.id }, update)
            .upsert(true)
            .await
            .map_err(|e| EngineError::Database(format!("Write failed: {}", e)))?;
        Ok(())
    }

    async fn create_if_absent(&self, path: &DocPath, doc: Value) -> Result<CreateOutcome> {
        let data = bson::to_document(&doc)?;

        for _ in 0..self.max_retries {
            let envelope = DocEnvelope {
                id: path.id.clone(),
                version: 1,
                data: data.clone(),
                metadata: Metadata::new(),
            };

            match self.collection(&path.collection).insert_one(&envelope).await {
                Ok(_) => return Ok(CreateOutcome::Created),
                Err(e) if is_duplicate_key(&e) => {
                    // Another writer won; hand back their document
                    if let Some(existing) = self.read(path).await? {
                        return Ok(CreateOutcome::Exists(existing));
                    }
                    // Winner not visible yet; re-check
                }
                Err(e) => return Err(EngineError::Database(format!("Insert failed: {}", e))),
            }
        }

        Err(EngineError::Conflict(format!(
            "create_if_absent on {} exhausted {} retries",
            path, self.max_retries
        )))
    }

    async fn transact(&self, path: &DocPath, op: TransactFn<'_>) -> Result<TransactOutcome> {
        let collection = self.collection(&path.collection);

        for _ in 0..self.max_retries {
            let envelope = collection
                .find_one(doc! { "_id": &path.id })
                .await
                .map_err(|e| EngineError::Database(format!("Find failed: {}", e)))?;

            let observed = match &envelope {
                Some(env) => Some(bson::from_document::<Value>(env.data.clone())?),
                None => None,
            };

            match op(observed.clone()) {
                Transition::Keep => {
                    return Ok(TransactOutcome {
                        committed: false,
                        doc: observed,
                    });
                }
                Transition::Write(new_doc) => {
                    let data = bson::to_document(&new_doc)?;
                    match envelope {
                        None => {
                            let fresh = DocEnvelope {
                                id: path.id.clone(),
                                version: 1,
                                data,
                                metadata: Metadata::new(),
                            };
                            match collection.insert_one(&fresh).await {
                                Ok(_) => {
                                    return Ok(TransactOutcome {
                                        committed: true,
                                        doc: Some(new_doc),
                                    });
                                }
                                // Created mid-flight by another writer; re-run
                                Err(e) if is_duplicate_key(&e) => {}
                                Err(e) => {
                                    return Err(EngineError::Database(format!(
                                        "Insert failed: {}",
                                        e
                                    )));
                                }
                            }
                        }
                        Some(env) => {
                            let filter = doc! { "_id": &path.id, "version": env.version };
                            let update = doc! {
                                "$set": { "data": data, "metadata.updated_at": DateTime::now() },
                                "$inc": { "version": 1i64 },
                            };
                            let result = collection
                                .update_one(filter, update)
                                .await
                                .map_err(|e| {
                                    EngineError::Database(format!("Update failed: {}", e))
                                })?;
                            if result.matched_count == 1 {
                                return Ok(TransactOutcome {
                                    committed: true,
                                    doc: Some(new_doc),
                                });
                            }
                            // Version moved underneath us; re-run
                        }
                    }
                }
            }
        }

        Err(EngineError::Conflict(format!(
            "transaction on {} exhausted {} retries",
            path, self.max_retries
        )))
    }

    async fn list_where(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Value>> {
        let mut filter = Document::new();
        filter.insert(format!("data.{}", field), value);
        let cursor = self
            .collection(collection)
            .find(filter)
            .await
            .map_err(|e| EngineError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<Value> = cursor
            .filter_map(|envelope| async {
                match envelope {
                    Ok(env) => match bson::from_document(env.data) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            error!("Error decoding document: {}", e);
                            None
                        }
                    },
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }
}
