//! Engine configuration
//!
//! Plain struct with environment variable handling; host applications can
//! also build one directly. Generic MongoDB settings use the conventional
//! unprefixed names, engine-specific knobs carry the `AUXANO_` prefix.

use std::path::PathBuf;

use crate::missions::DEFAULT_MISSIONS_PER_WEEK;
use crate::types::{EngineError, Result};

/// Configuration for the progress engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// MongoDB connection URI (default: mongodb://localhost:27017)
    pub mongodb_uri: String,
    /// MongoDB database name (default: auxano)
    pub mongodb_db: String,
    /// Missions assigned per user per week (default: 3)
    pub missions_per_week: usize,
    /// Retry budget for contended transactions (default: 8)
    pub txn_max_retries: usize,
    /// Directory for the local mirror; None disables mirroring
    pub mirror_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db: "auxano".to_string(),
            missions_per_week: DEFAULT_MISSIONS_PER_WEEK,
            txn_max_retries: 8,
            mirror_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("MONGODB_URI") {
            if !val.is_empty() {
                config.mongodb_uri = val;
            }
        }

        if let Ok(val) = std::env::var("MONGODB_DB") {
            if !val.is_empty() {
                config.mongodb_db = val;
            }
        }

        if let Ok(val) = std::env::var("AUXANO_MISSIONS_PER_WEEK") {
            if let Ok(count) = val.parse::<usize>() {
                config.missions_per_week = count;
            }
        }

        if let Ok(val) = std::env::var("AUXANO_TXN_MAX_RETRIES") {
            if let Ok(retries) = val.parse::<usize>() {
                config.txn_max_retries = retries;
            }
        }

        if let Ok(val) = std::env::var("AUXANO_MIRROR_DIR") {
            if !val.is_empty() {
                config.mirror_dir = Some(PathBuf::from(val));
            }
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.mongodb_uri.is_empty() {
            return Err(EngineError::Config("MONGODB_URI must not be empty".to_string()));
        }
        if self.mongodb_db.is_empty() {
            return Err(EngineError::Config("MONGODB_DB must not be empty".to_string()));
        }
        if self.missions_per_week == 0 {
            return Err(EngineError::Config(
                "AUXANO_MISSIONS_PER_WEEK must be at least 1".to_string(),
            ));
        }
        if self.txn_max_retries == 0 {
            return Err(EngineError::Config(
                "AUXANO_TXN_MAX_RETRIES must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert_eq!(config.missions_per_week, 3);
        assert_eq!(config.txn_max_retries, 8);
        assert!(config.mirror_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_missions_per_week_is_rejected() {
        let config = EngineConfig {
            missions_per_week: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_empty_uri_is_rejected() {
        let config = EngineConfig {
            mongodb_uri: String::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_budget_is_rejected() {
        let config = EngineConfig {
            txn_max_retries: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
