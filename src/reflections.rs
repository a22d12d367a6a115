//! Community reflections and upvote toggling
//!
//! Reflections are short notes users share under devotional content;
//! anyone can endorse one with an upvote. The displayed count and the
//! upvoter set are mutated together inside one transaction, and the
//! caller's membership is always recomputed from the fresh read, never
//! from what a client assumed. `upvotes == upvoted_by.len()` holds in
//! every committed state.
//!
//! Clients flip their local copy optimistically before the transaction
//! confirms; `toggle_locally` / `revert` / `reconcile` keep assumed and
//! confirmed state strictly apart so a failed call restores the exact
//! prior display.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{DocPath, DocumentStore, Transition};
use crate::types::Result;

/// Collection name for reflections
pub const REFLECTION_COLLECTION: &str = "reflections";

/// A reflection shared under a piece of content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reflection {
    pub id: String,
    /// Content the reflection was shared under
    pub content_id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Displayed count; equals `upvoted_by.len()` in committed state
    pub upvotes: u32,
    /// User ids currently endorsing this reflection
    pub upvoted_by: Vec<String>,
}

impl Reflection {
    pub fn is_upvoted_by(&self, user_id: &str) -> bool {
        self.upvoted_by.iter().any(|u| u == user_id)
    }

    /// Flip the local copy immediately for optimistic display, returning
    /// a token that restores the exact pre-toggle state on failure.
    pub fn toggle_locally(&mut self, user_id: &str) -> OptimisticToggle {
        let token = OptimisticToggle {
            upvotes: self.upvotes,
            upvoted_by: self.upvoted_by.clone(),
        };
        if let Some(pos) = self.upvoted_by.iter().position(|u| u == user_id) {
            self.upvoted_by.remove(pos);
            self.upvotes = self.upvotes.saturating_sub(1);
        } else {
            self.upvoted_by.push(user_id.to_string());
            self.upvotes += 1;
        }
        token
    }

    /// Restore the pre-toggle state after a failed or refused toggle.
    pub fn revert(&mut self, token: &OptimisticToggle) {
        self.upvotes = token.upvotes;
        self.upvoted_by = token.upvoted_by.clone();
    }

    /// Adopt the committed server state after a successful toggle.
    pub fn reconcile(&mut self, outcome: &UpvoteOutcome) {
        self.upvotes = outcome.upvotes;
        self.upvoted_by = outcome.upvoted_by.clone();
    }
}

/// Pre-toggle state captured by `toggle_locally`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticToggle {
    upvotes: u32,
    upvoted_by: Vec<String>,
}

/// Authoritative result of a toggle transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvoteOutcome {
    /// False when the reflection no longer exists; nothing was written
    pub ok: bool,
    /// Whether the caller's upvote is present in the committed state
    pub upvoted: bool,
    /// Committed display count
    pub upvotes: u32,
    /// Committed upvoter set
    pub upvoted_by: Vec<String>,
}

impl UpvoteOutcome {
    fn missing() -> Self {
        Self {
            ok: false,
            upvoted: false,
            upvotes: 0,
            upvoted_by: Vec::new(),
        }
    }
}

/// Reflection sharing and upvote toggling
pub struct ReflectionService<S: DocumentStore> {
    store: Arc<S>,
}

impl<S: DocumentStore> ReflectionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Share a new reflection under a piece of content.
    pub async fn share(
        &self,
        content_id: &str,
        author_id: &str,
        author_name: &str,
        text: &str,
    ) -> Result<Reflection> {
        let reflection = Reflection {
            id: Uuid::new_v4().to_string(),
            content_id: content_id.to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            upvotes: 0,
            upvoted_by: Vec::new(),
        };

        let path = DocPath::new(REFLECTION_COLLECTION, reflection.id.clone());
        self.store
            .write(&path, serde_json::to_value(&reflection)?)
            .await?;

        info!(
            reflection = %reflection.id,
            content_id = %content_id,
            author_id = %author_id,
            "Reflection shared"
        );
        Ok(reflection)
    }

    /// Point read of one reflection.
    pub async fn get(&self, reflection_id: &str) -> Result<Option<Reflection>> {
        let path = DocPath::new(REFLECTION_COLLECTION, reflection_id);
        match self.store.read(&path).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Reflections under a piece of content, newest first.
    pub async fn list_for(&self, content_id: &str) -> Result<Vec<Reflection>> {
        let docs = self
            .store
            .list_where(REFLECTION_COLLECTION, "content_id", content_id)
            .await?;

        let mut reflections = Vec::with_capacity(docs.len());
        for doc in docs {
            reflections.push(serde_json::from_value::<Reflection>(doc)?);
        }
        reflections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reflections)
    }

    /// Toggle the caller's upvote in one atomic transaction and return
    /// the committed state. A missing reflection is a refusal
    /// (`ok = false`), not an error; the caller reverts its optimistic
    /// copy and moves on.
    pub async fn toggle_upvote(
        &self,
        reflection_id: &str,
        user_id: &str,
    ) -> Result<UpvoteOutcome> {
        let path = DocPath::new(REFLECTION_COLLECTION, reflection_id);

        let op = |doc: Option<Value>| -> Transition {
            let Some(doc) = doc else {
                return Transition::Keep;
            };
            let Ok(mut reflection) = serde_json::from_value::<Reflection>(doc) else {
                return Transition::Keep;
            };
            if let Some(pos) = reflection.upvoted_by.iter().position(|u| u == user_id) {
                reflection.upvoted_by.remove(pos);
            } else {
                reflection.upvoted_by.push(user_id.to_string());
            }
            // Count and set move together
            reflection.upvotes = reflection.upvoted_by.len() as u32;
            match serde_json::to_value(&reflection) {
                Ok(updated) => Transition::Write(updated),
                Err(_) => Transition::Keep,
            }
        };

        let outcome = self.store.transact(&path, &op).await?;

        let doc = match outcome.doc {
            Some(doc) if outcome.committed => doc,
            _ => {
                debug!(reflection = %reflection_id, "Toggle on missing reflection refused");
                return Ok(UpvoteOutcome::missing());
            }
        };

        let reflection: Reflection = serde_json::from_value(doc)?;
        let upvoted = reflection.is_upvoted_by(user_id);
        info!(
            reflection = %reflection_id,
            user_id = %user_id,
            upvoted,
            upvotes = reflection.upvotes,
            "Upvote toggled"
        );
        Ok(UpvoteOutcome {
            ok: true,
            upvoted,
            upvotes: reflection.upvotes,
            upvoted_by: reflection.upvoted_by,
        })
    }
}
