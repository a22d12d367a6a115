//! Auxano - Progress and engagement engine for Selah
//!
//! "But God gave the growth" - 1 Corinthians 3:6
//!
//! Auxano tracks a user's walk through the Selah devotional platform:
//! weekly mission rotation, achievement badges and community reflection
//! upvotes, with a client-resident mirror so recent records stay readable
//! offline. State lives in a versioned document store backed by MongoDB
//! in production and an in-memory map in tests; both backends serialize
//! contended writes through the same transaction contract.
//!
//! ## Services
//!
//! - **Missions**: Weekly mission assignment with exactly-once completion
//! - **Achievements**: Threshold badges unlocked at most once per user
//! - **Reflections**: Shared notes with transactional upvote toggling
//! - **Mirror**: Local read fallback for journal, favorites, devotionals and challenge progress
//! - **Store**: Versioned document store over MongoDB or memory
//! - **Week**: ISO week identifiers that anchor the mission rotation

pub mod achievements;
pub mod catalog;
pub mod config;
pub mod missions;
pub mod mirror;
pub mod reflections;
pub mod store;
pub mod types;
pub mod week;

pub use config::EngineConfig;
pub use store::{DocumentStore, MemoryStore, MongoStore};
pub use types::{EngineError, Result};
