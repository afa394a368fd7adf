//! On-disk store for last-applied state
//!
//! One pretty-printed JSON file per stack and target, under
//! `<state dir>/stacks/`.

use anyhow::{Context, Result};
use chrono::Utc;
use declarative::{AppliedState, Target};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Get the state file path for a stack and target
    pub fn path_for(&self, stack: &str, target: &Target) -> PathBuf {
        crate::paths::stack_state_file(&self.state_dir, stack, target)
    }

    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load(&self, stack: &str, target: &Target) -> Result<AppliedState> {
        let path = self.path_for(stack, target);

        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(AppliedState::new(stack, target.clone()));
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: AppliedState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        if state.stack != stack || &state.target != target {
            anyhow::bail!(
                "State file {} belongs to {} in {}, not {} in {}",
                path.display(),
                state.stack,
                state.target,
                stack,
                target
            );
        }

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    ///
    /// Writes a sibling temp file and renames it over the old state.
    pub fn save(&self, state: &mut AppliedState) -> Result<()> {
        state.last_updated = Utc::now();

        let path = self.path_for(&state.stack, &state.target);
        let dir = path
            .parent()
            .context("State file path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let content =
            serde_json::to_string_pretty(state).context("Failed to serialize state to JSON")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}
