//! Configuration file
//!
//! ```yaml
//! database: /var/lib/storygraph/story.db
//! cache:
//!   enabled: true
//!   ttl: { node_list: 300, node: 600, relationships: 300, graph_traversal: 120, stats: 60 }
//! validator:
//!   category_timeout_ms: 5000
//!   skill_drop_threshold: 2
//!   bounded_attributes: [skill_level]
//! ```
//!
//! Every field is optional.

use crate::cache::CacheConfig;
use crate::consistency::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    /// SQLite database path; the CLI falls back to its data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    pub cache: CacheConfig,
    pub validator: ValidatorConfig,
}

impl StoryConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validator.category_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "validator.category_timeout_ms must be positive".to_string(),
            ));
        }
        let threshold = self.validator.state.skill_drop_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "validator.skill_drop_threshold must be a non-negative number, got {}",
                threshold
            )));
        }
        if let Some((class, secs)) = self.cache.ttl.first_excessive() {
            return Err(ConfigError::Invalid(format!(
                "cache.ttl.{} must be at most {} seconds, got {}",
                class,
                crate::cache::TtlPolicy::MAX_SECS,
                secs
            )));
        }
        Ok(())
    }
}
