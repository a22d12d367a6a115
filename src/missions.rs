//! Weekly mission assignment and completion
//!
//! Each user gets a fresh set of missions per ISO week, created lazily
//! on first access and never rewritten after that. Completion is an
//! atomic flag flip with exactly-once semantics: under concurrent
//! attempts one caller observes the `false -> true` transition and
//! awards points, everyone else gets an idempotent no-op.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::ContentCatalog;
use crate::config::EngineConfig;
use crate::store::{CreateOutcome, DocPath, DocumentStore, Transition};
use crate::types::{EngineError, Result};
use crate::week::week_key_for;

/// Collection name for weekly assignments
pub const WEEKLY_ASSIGNMENT_COLLECTION: &str = "weekly_assignments";

/// Missions offered per user per week unless overridden
pub const DEFAULT_MISSIONS_PER_WEEK: usize = 3;

// ============================================================================
// Records
// ============================================================================

/// One mission tuple inside a weekly assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedMission {
    pub mission_id: String,
    pub completed: bool,
}

/// The set of missions offered to one user for one week
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeeklyAssignment {
    pub user_id: String,
    pub week_id: String,
    /// Assigned tuples in selection order
    pub missions: Vec<AssignedMission>,
    pub assigned_at: DateTime<Utc>,
}

impl WeeklyAssignment {
    /// Document id, `{user}_{week}`; at most one document per user per week
    pub fn doc_id(user_id: &str, week_id: &str) -> String {
        format!("{}_{}", user_id, week_id)
    }

    /// Look up one assigned tuple by mission id
    pub fn mission(&self, mission_id: &str) -> Option<&AssignedMission> {
        self.missions.iter().find(|m| m.mission_id == mission_id)
    }
}

/// Result of a completion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// This call flipped the flag; the caller awards points now
    Completed,
    /// Completed earlier; idempotent no-op, no second award
    AlreadyCompleted,
    /// Mission id is not part of this week's assignment
    NotAssigned,
    /// No assignment exists for this user and week
    NoAssignment,
}

impl CompletionOutcome {
    /// Soft success as clients display it: both completed states count
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed | Self::AlreadyCompleted)
    }
}

// ============================================================================
// Mission Picker Trait (for dependency injection)
// ============================================================================

/// Strategy choosing which catalog missions a new week offers (allows
/// deterministic selection in tests)
pub trait MissionPicker: Send + Sync {
    /// Pick up to `count` distinct indices into a catalog of `len` missions
    fn pick_indices(&self, len: usize, count: usize) -> Vec<usize>;
}

/// Production picker drawing from thread-local entropy
pub struct EntropyPicker;

impl MissionPicker for EntropyPicker {
    fn pick_indices(&self, len: usize, count: usize) -> Vec<usize> {
        let mut rng = rand::thread_rng();
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut rng);
        indices.truncate(count.min(len));
        indices
    }
}

/// Deterministic picker for tests and replay
pub struct SeededPicker {
    rng: Mutex<StdRng>,
}

impl SeededPicker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl MissionPicker for SeededPicker {
    fn pick_indices(&self, len: usize, count: usize) -> Vec<usize> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(&mut *rng);
        indices.truncate(count.min(len));
        indices
    }
}

// ============================================================================
// Mission Service
// ============================================================================

/// Weekly mission assigner and completion coordinator
pub struct MissionService<S: DocumentStore> {
    store: Arc<S>,
    catalog: Arc<ContentCatalog>,
    picker: Arc<dyn MissionPicker>,
    missions_per_week: usize,
}

impl<S: DocumentStore> MissionService<S> {
    pub fn new(store: Arc<S>, catalog: Arc<ContentCatalog>) -> Self {
        Self {
            store,
            catalog,
            picker: Arc::new(EntropyPicker),
            missions_per_week: DEFAULT_MISSIONS_PER_WEEK,
        }
    }

    /// Build with the assignment policy taken from engine configuration
    pub fn from_config(
        store: Arc<S>,
        catalog: Arc<ContentCatalog>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(store, catalog).with_missions_per_week(config.missions_per_week)
    }

    /// Replace the selection strategy
    pub fn with_picker(mut self, picker: Arc<dyn MissionPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Override how many missions a new week offers
    pub fn with_missions_per_week(mut self, count: usize) -> Self {
        self.missions_per_week = count.max(1);
        self
    }

    /// The assignment for `user_id` in the week containing `now`,
    /// created on first access.
    ///
    /// Creation goes through `create_if_absent`: when two clients race
    /// on first access, exactly one selection is stored and the other
    /// caller adopts it, so a user never sees two mission sets for one
    /// week.
    pub async fn get_or_create_assignment(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WeeklyAssignment> {
        let week_id = week_key_for(now);
        let path = DocPath::new(
            WEEKLY_ASSIGNMENT_COLLECTION,
            WeeklyAssignment::doc_id(user_id, &week_id),
        );

        if let Some(doc) = self.store.read(&path).await? {
            return Ok(serde_json::from_value(doc)?);
        }

        if self.catalog.missions.is_empty() {
            return Err(EngineError::NoMissionsAvailable);
        }

        let assignment = WeeklyAssignment {
            user_id: user_id.to_string(),
            week_id: week_id.clone(),
            missions: self.pick_missions(),
            assigned_at: now,
        };

        match self
            .store
            .create_if_absent(&path, serde_json::to_value(&assignment)?)
            .await?
        {
            CreateOutcome::Created => {
                info!(
                    user_id = %user_id,
                    week_id = %week_id,
                    missions = assignment.missions.len(),
                    "Created weekly assignment"
                );
                Ok(assignment)
            }
            CreateOutcome::Exists(doc) => {
                // Lost the first-access race; the stored selection wins
                debug!(user_id = %user_id, week_id = %week_id, "Adopting concurrent assignment");
                Ok(serde_json::from_value(doc)?)
            }
        }
    }

    /// Flip one mission tuple to completed. Exactly one concurrent
    /// caller observes `Completed`; the rest observe `AlreadyCompleted`
    /// once the store has serialized them behind the winner.
    pub async fn complete_mission(
        &self,
        user_id: &str,
        week_id: &str,
        mission_id: &str,
    ) -> Result<CompletionOutcome> {
        let path = DocPath::new(
            WEEKLY_ASSIGNMENT_COLLECTION,
            WeeklyAssignment::doc_id(user_id, week_id),
        );

        let op = |doc: Option<Value>| -> Transition {
            let Some(doc) = doc else {
                return Transition::Keep;
            };
            let Ok(mut assignment) = serde_json::from_value::<WeeklyAssignment>(doc) else {
                return Transition::Keep;
            };
            let Some(slot) = assignment
                .missions
                .iter_mut()
                .find(|m| m.mission_id == mission_id)
            else {
                return Transition::Keep;
            };
            if slot.completed {
                return Transition::Keep;
            }
            slot.completed = true;
            match serde_json::to_value(&assignment) {
                Ok(updated) => Transition::Write(updated),
                Err(_) => Transition::Keep,
            }
        };

        let outcome = self.store.transact(&path, &op).await?;

        if outcome.committed {
            info!(
                user_id = %user_id,
                week_id = %week_id,
                mission_id = %mission_id,
                "Mission completed"
            );
            return Ok(CompletionOutcome::Completed);
        }

        let Some(doc) = outcome.doc else {
            return Ok(CompletionOutcome::NoAssignment);
        };
        let assignment: WeeklyAssignment = serde_json::from_value(doc)?;
        match assignment.mission(mission_id) {
            Some(slot) if slot.completed => Ok(CompletionOutcome::AlreadyCompleted),
            _ => Ok(CompletionOutcome::NotAssigned),
        }
    }

    fn pick_missions(&self) -> Vec<AssignedMission> {
        let count = self.missions_per_week.min(self.catalog.missions.len());
        let mut missions: Vec<AssignedMission> = Vec::with_capacity(count);
        for index in self.picker.pick_indices(self.catalog.missions.len(), count) {
            // Pickers are host-implementable; stray indices and repeats
            // are dropped rather than trusted
            let Some(definition) = self.catalog.missions.get(index) else {
                continue;
            };
            if missions.iter().any(|m| m.mission_id == definition.id) {
                continue;
            }
            missions.push(AssignedMission {
                mission_id: definition.id.clone(),
                completed: false,
            });
            if missions.len() == count {
                break;
            }
        }
        missions
    }
}

// ============================================================================
// Tests
// ============================================================================
