//! Shared types for the Auxano engine

pub mod error;

pub use error::{EngineError, Result};
