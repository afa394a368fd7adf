//! Operator configuration (`config.toml` in the config dir)

use anyhow::{Context, Result};
use declarative::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Defaults for commands, overridable by CLI flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Parallel jobs per dependency level
    pub jobs: Option<usize>,
    pub failure_policy: Option<FailurePolicy>,
    /// Retries for transient provider errors
    pub retries: Option<u32>,
    /// Stack file used instead of the built-in stack
    pub stack: Option<String>,
    /// Parameter values; `-p NAME=VALUE` wins over these
    pub parameters: BTreeMap<String, String>,
}

impl Config {
    /// Load `config.toml`, or the defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Stack file from config, with ~ and variables expanded
    pub fn stack_path(&self) -> Option<PathBuf> {
        self.stack.as_deref().map(crate::paths::expand)
    }
}
