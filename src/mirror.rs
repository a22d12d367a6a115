//! Engine-side mirror layer
//!
//! Wraps the client-resident [`mirror_cache_core::MirrorCache`] with the
//! engine's record vocabulary. Snapshots flow one way, server to mirror;
//! reads consult the mirror only when the network is unavailable, so a
//! stale or empty mirror is always a safe state.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::info;

use mirror_cache_core::{MirrorCache, MirrorStats};

use crate::config::EngineConfig;
use crate::types::Result;

/// Server record families the mirror shadows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorStoreKind {
    Journal,
    Favorites,
    Devotionals,
    ChallengeProgress,
}

impl MirrorStoreKind {
    /// Store name backing this family on disk
    pub fn store_name(&self) -> &'static str {
        match self {
            MirrorStoreKind::Journal => "journal",
            MirrorStoreKind::Favorites => "favorites",
            MirrorStoreKind::Devotionals => "devotionals",
            MirrorStoreKind::ChallengeProgress => "challenge_progress",
        }
    }
}

/// Read-fallback mirror of server records
pub struct MirrorLayer {
    cache: Mutex<MirrorCache>,
}

impl MirrorLayer {
    /// Open a file-backed mirror rooted at `dir`, loading any snapshots a
    /// previous session left behind.
    pub fn open(dir: impl AsRef<Path>) -> Result<MirrorLayer> {
        let dir = dir.as_ref();
        let cache = MirrorCache::open(dir)?;
        info!(dir = %dir.display(), "Mirror layer opened");
        Ok(MirrorLayer {
            cache: Mutex::new(cache),
        })
    }

    /// Mirror with no local storage; every operation is a no-op.
    pub fn disabled() -> MirrorLayer {
        MirrorLayer {
            cache: Mutex::new(MirrorCache::disabled()),
        }
    }

    /// Build from engine configuration: a configured directory opens a
    /// file-backed mirror, no directory yields the disabled guard.
    pub fn from_config(config: &EngineConfig) -> Result<MirrorLayer> {
        match &config.mirror_dir {
            Some(dir) => MirrorLayer::open(dir),
            None => Ok(MirrorLayer::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_enabled()
    }

    /// Replace the mirrored snapshot for one record family. Returns the
    /// number of records mirrored.
    pub fn put(&self, kind: MirrorStoreKind, records: &[Value]) -> Result<usize> {
        let mirrored = self.lock().put(kind.store_name(), records)?;
        Ok(mirrored)
    }

    /// Mirrored records for one family, in stable id order. Empty when
    /// nothing has been mirrored or the mirror is disabled.
    pub fn get_all(&self, kind: MirrorStoreKind) -> Vec<Value> {
        self.lock().get_all(kind.store_name())
    }

    /// Point lookup of one mirrored record by id.
    pub fn get(&self, kind: MirrorStoreKind, id: &str) -> Option<Value> {
        self.lock().get(kind.store_name(), id)
    }

    /// Drop every mirrored snapshot, in memory and on disk.
    pub fn clear(&self) -> Result<()> {
        self.lock().clear()?;
        Ok(())
    }

    /// Current mirror counters.
    pub fn stats(&self) -> MirrorStats {
        self.lock().stats()
    }

    fn lock(&self) -> MutexGuard<'_, MirrorCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
