//! Achievement evaluation and unlocks
//!
//! Badges are measured against cumulative progress counters computed by
//! the caller. The sole evidence an achievement was earned is its
//! unlock record; existence is the signal. Unlocking is therefore a
//! create-if-absent on a composite `{user}_{achievement}` key, which
//! makes every unlock structurally exactly-once and permanent even when
//! counters later regress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{ContentCatalog, ProgressSnapshot};
use crate::store::{CreateOutcome, DocPath, DocumentStore};
use crate::types::Result;

/// Collection name for unlock records
pub const ACHIEVEMENT_UNLOCK_COLLECTION: &str = "achievement_unlocks";

/// Proof that a user earned an achievement. Created exactly once, never
/// mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnlockRecord {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

impl UnlockRecord {
    /// Document id, `{user}_{achievement}`; at most one per pair
    pub fn doc_id(user_id: &str, achievement_id: &str) -> String {
        format!("{}_{}", user_id, achievement_id)
    }
}

/// Achievement evaluator
pub struct AchievementService<S: DocumentStore> {
    store: Arc<S>,
    catalog: Arc<ContentCatalog>,
}

impl<S: DocumentStore> AchievementService<S> {
    pub fn new(store: Arc<S>, catalog: Arc<ContentCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Evaluate every catalog achievement against `snapshot` and unlock
    /// the ones newly earned.
    ///
    /// Returns the ids unlocked by this call, in catalog order. A
    /// concurrent evaluator losing the create race reports nothing, so
    /// each unlock is announced to exactly one caller. Unknown criteria
    /// kinds and already-unlocked achievements are skipped; nothing in
    /// catalog content is a fatal error.
    pub async fn evaluate(
        &self,
        user_id: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<Vec<String>> {
        let mut newly_unlocked = Vec::new();

        for achievement in &self.catalog.achievements {
            let criteria = achievement.criteria;
            let Some(value) = snapshot.value_for(criteria.kind) else {
                debug!(achievement = %achievement.id, "Skipping unknown criteria kind");
                continue;
            };
            if value < criteria.threshold {
                continue;
            }

            let path = DocPath::new(
                ACHIEVEMENT_UNLOCK_COLLECTION,
                UnlockRecord::doc_id(user_id, &achievement.id),
            );

            // Presence of the record is the unlock signal
            if self.store.read(&path).await?.is_some() {
                continue;
            }

            let record = UnlockRecord {
                user_id: user_id.to_string(),
                achievement_id: achievement.id.clone(),
                unlocked_at: Utc::now(),
            };
            match self
                .store
                .create_if_absent(&path, serde_json::to_value(&record)?)
                .await?
            {
                CreateOutcome::Created => {
                    info!(
                        user_id = %user_id,
                        achievement = %achievement.id,
                        "Achievement unlocked"
                    );
                    newly_unlocked.push(achievement.id.clone());
                }
                CreateOutcome::Exists(_) => {
                    // A concurrent evaluation won; it owns the announcement
                }
            }
        }

        Ok(newly_unlocked)
    }

    /// Whether the user has earned an achievement
    pub async fn is_unlocked(&self, user_id: &str, achievement_id: &str) -> Result<bool> {
        let path = DocPath::new(
            ACHIEVEMENT_UNLOCK_COLLECTION,
            UnlockRecord::doc_id(user_id, achievement_id),
        );
        Ok(self.store.read(&path).await?.is_some())
    }

    /// Every unlock record the user has earned
    pub async fn unlocks_for(&self, user_id: &str) -> Result<Vec<UnlockRecord>> {
        let docs = self
            .store
            .list_where(ACHIEVEMENT_UNLOCK_COLLECTION, "user_id", user_id)
            .await?;
        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            records.push(serde_json::from_value(doc)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AchievementDefinition, Criteria, CriteriaKind};
    use crate::store::MemoryStore;

    fn achievement(id: &str, kind: CriteriaKind, threshold: u32) -> AchievementDefinition {
        AchievementDefinition {
            id: id.to_string(),
            name: format!("Badge {}", id),
            description: "test badge".to_string(),
            criteria: Criteria { kind, threshold },
        }
    }

    fn catalog() -> Arc<ContentCatalog> {
        Arc::new(ContentCatalog::new(
            Vec::new(),
            vec![
                achievement("journal_1", CriteriaKind::JournalEntries, 1),
                achievement("streak_7", CriteriaKind::Streak, 7),
                achievement("challenge_5", CriteriaKind::ChallengesCompleted, 5),
                achievement("future", CriteriaKind::Unknown, 1),
            ],
        ))
    }

    fn service() -> AchievementService<MemoryStore> {
        AchievementService::new(Arc::new(MemoryStore::new()), catalog())
    }

    #[tokio::test]
    async fn test_unlocks_at_threshold() {
        let service = service();
        let snapshot = ProgressSnapshot {
            journal_entries: 1,
            ..Default::default()
        };

        let unlocked = service.evaluate("user_1", &snapshot).await.unwrap();
        assert_eq!(unlocked, vec!["journal_1".to_string()]);
        assert!(service.is_unlocked("user_1", "journal_1").await.unwrap());
        assert!(!service.is_unlocked("user_1", "streak_7").await.unwrap());
    }

    #[tokio::test]
    async fn test_below_threshold_stays_locked() {
        let service = service();
        let snapshot = ProgressSnapshot {
            streak: 6,
            ..Default::default()
        };

        let unlocked = service.evaluate("user_1", &snapshot).await.unwrap();
        assert!(unlocked.is_empty());
        assert!(!service.is_unlocked("user_1", "streak_7").await.unwrap());
    }

    #[tokio::test]
    async fn test_second_evaluation_announces_nothing() {
        let service = service();
        let snapshot = ProgressSnapshot {
            journal_entries: 3,
            ..Default::default()
        };

        let first = service.evaluate("user_1", &snapshot).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = service.evaluate("user_1", &snapshot).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_unlocks_follow_catalog_order() {
        let service = service();
        let snapshot = ProgressSnapshot {
            streak: 10,
            journal_entries: 2,
            ..Default::default()
        };

        let unlocked = service.evaluate("user_1", &snapshot).await.unwrap();
        assert_eq!(
            unlocked,
            vec!["journal_1".to_string(), "streak_7".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unlock_survives_counter_regression() {
        let service = service();

        let earned = ProgressSnapshot {
            streak: 7,
            ..Default::default()
        };
        service.evaluate("user_1", &earned).await.unwrap();

        // Streak broken; the badge stays
        let regressed = ProgressSnapshot::default();
        let unlocked = service.evaluate("user_1", &regressed).await.unwrap();
        assert!(unlocked.is_empty());
        assert!(service.is_unlocked("user_1", "streak_7").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_kind_never_unlocks() {
        let service = service();
        let maxed = ProgressSnapshot {
            streak: u32::MAX,
            journal_entries: u32::MAX,
            devotionals_completed: u32::MAX,
            challenges_completed: u32::MAX,
        };

        let unlocked = service.evaluate("user_1", &maxed).await.unwrap();
        assert!(!unlocked.contains(&"future".to_string()));
        assert!(!service.is_unlocked("user_1", "future").await.unwrap());
    }

    #[tokio::test]
    async fn test_users_do_not_share_unlocks() {
        let service = service();
        let snapshot = ProgressSnapshot {
            journal_entries: 1,
            ..Default::default()
        };

        service.evaluate("user_1", &snapshot).await.unwrap();
        assert!(!service.is_unlocked("user_2", "journal_1").await.unwrap());

        let records = service.unlocks_for("user_1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].achievement_id, "journal_1");
    }

    #[tokio::test]
    async fn test_concurrent_evaluation_announces_exactly_once() {
        let service = Arc::new(service());
        let snapshot = ProgressSnapshot {
            challenges_completed: 5,
            ..Default::default()
        };

        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.evaluate("user_1", &snapshot).await.unwrap()
            }));
        }

        let mut announced = 0;
        for handle in handles {
            announced += handle.await.unwrap().len();
        }
        assert_eq!(announced, 1);
    }
}
