//! Mission and achievement catalogs
//!
//! Definition sets are authored by the content team and handed to the
//! engine at construction. The engine never mutates them; everything a
//! user earns is recorded against definition ids, so catalog entries
//! must keep their ids stable across releases.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{EngineError, Result};

/// A weekly mission as authored in the content catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MissionDefinition {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Points awarded on first completion
    pub points: u32,
    /// Optional deep link into the relevant app area
    #[serde(default)]
    pub route: Option<String>,
}

/// Counter an achievement criterion is measured against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CriteriaKind {
    #[serde(rename = "streak")]
    Streak,
    #[serde(rename = "journal_entries")]
    JournalEntries,
    #[serde(rename = "devotionals_completed")]
    DevotionalsCompleted,
    #[serde(rename = "challenges_completed")]
    ChallengesCompleted,
    /// Criteria kinds introduced by newer catalogs; evaluation skips them
    #[serde(rename = "unknown")]
    #[serde(other)]
    Unknown,
}

/// Threshold test against one progress counter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Criteria {
    pub kind: CriteriaKind,
    pub threshold: u32,
}

/// A badge as authored in the content catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub criteria: Criteria,
}

/// Cumulative progress counters supplied by the caller at evaluation
/// time. The engine never computes or persists these.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub streak: u32,
    pub journal_entries: u32,
    pub devotionals_completed: u32,
    pub challenges_completed: u32,
}

impl ProgressSnapshot {
    /// The counter a criteria kind is measured against, `None` for kinds
    /// this engine version does not know.
    pub fn value_for(&self, kind: CriteriaKind) -> Option<u32> {
        match kind {
            CriteriaKind::Streak => Some(self.streak),
            CriteriaKind::JournalEntries => Some(self.journal_entries),
            CriteriaKind::DevotionalsCompleted => Some(self.devotionals_completed),
            CriteriaKind::ChallengesCompleted => Some(self.challenges_completed),
            CriteriaKind::Unknown => None,
        }
    }
}

/// The full definition set the engine is constructed with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentCatalog {
    #[serde(default)]
    pub missions: Vec<MissionDefinition>,
    #[serde(default)]
    pub achievements: Vec<AchievementDefinition>,
}

impl ContentCatalog {
    pub fn new(
        missions: Vec<MissionDefinition>,
        achievements: Vec<AchievementDefinition>,
    ) -> Self {
        Self {
            missions,
            achievements,
        }
    }

    /// Parse a catalog from the content team's JSON payload and validate it.
    pub fn from_json_str(json: &str) -> Result<ContentCatalog> {
        let catalog: ContentCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check id hygiene. Duplicate or empty ids would silently merge
    /// distinct earned records, so they are rejected up front.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for mission in &self.missions {
            if mission.id.is_empty() {
                return Err(EngineError::Catalog("mission with empty id".into()));
            }
            if !seen.insert(mission.id.as_str()) {
                return Err(EngineError::Catalog(format!(
                    "duplicate mission id: {}",
                    mission.id
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for achievement in &self.achievements {
            if achievement.id.is_empty() {
                return Err(EngineError::Catalog("achievement with empty id".into()));
            }
            if !seen.insert(achievement.id.as_str()) {
                return Err(EngineError::Catalog(format!(
                    "duplicate achievement id: {}",
                    achievement.id
                )));
            }
            if achievement.criteria.kind == CriteriaKind::Unknown {
                warn!(
                    achievement = %achievement.id,
                    "Achievement has an unknown criteria kind and will never unlock here"
                );
            }
        }
        Ok(())
    }

    /// Look up a mission definition by id.
    pub fn mission(&self, id: &str) -> Option<&MissionDefinition> {
        self.missions.iter().find(|m| m.id == id)
    }

    /// Look up an achievement definition by id.
    pub fn achievement(&self, id: &str) -> Option<&AchievementDefinition> {
        self.achievements.iter().find(|a| a.id == id)
    }
}
