//! Session configuration, loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::KeyScheme;
use crate::selection::SamplingStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub sampling: SamplingStrategy,
    pub key_scheme: KeyScheme,
    /// Fixed seed for reproducible draws. `None` seeds from OS entropy.
    pub rng_seed: Option<u64>,
    /// Resolve both participants' display assets after a pair is chosen.
    pub resolve_assets: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingStrategy::default(),
            key_scheme: KeyScheme::default(),
            rng_seed: None,
            resolve_assets: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SessionConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}
