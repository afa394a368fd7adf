//! Centralized path resolution for greenstack
//!
//! # Environment Variables
//!
//! - `GREENSTACK_CONFIG_DIR` - Override config directory
//! - `GREENSTACK_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `GREENSTACK_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/greenstack` (if set)
//! 3. `~/.config/greenstack`
//!
//! For state_dir():
//! 1. `GREENSTACK_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/greenstack` (if set)
//! 3. `~/.local/state/greenstack`

use anyhow::{Context, Result};
use declarative::Target;
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "GREENSTACK_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "GREENSTACK_STATE_DIR";

const APP_DIR: &str = "greenstack";

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get the greenstack config directory path
pub fn config_dir() -> Result<PathBuf> {
    config_dir_with(env_lookup, dirs::home_dir())
}

/// Get the greenstack state directory path
pub fn state_dir() -> Result<PathBuf> {
    state_dir_with(env_lookup, dirs::home_dir())
}

fn config_dir_with<F>(lookup: F, home: Option<PathBuf>) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Some(xdg_config) = lookup("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

fn state_dir_with<F>(lookup: F, home: Option<PathBuf>) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_state) = lookup("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Path of the config file inside a config dir
pub fn config_file(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

/// Path of a stack's last-applied state for one target
pub fn stack_state_file(state_dir: &Path, stack: &str, target: &Target) -> PathBuf {
    state_dir
        .join("stacks")
        .join(format!("{}-{}-{}.json", stack, target.account, target.region))
}

/// Root directory of resources the local provider materializes for a target
pub fn target_dir(state_dir: &Path, target: &Target) -> PathBuf {
    state_dir
        .join("targets")
        .join(format!("{}-{}", target.account, target.region))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn home() -> Option<PathBuf> {
        Some(PathBuf::from("/home/ops"))
    }

    #[test]
    fn test_config_dir_env_override() {
        let dir = config_dir_with(
            lookup(&[(ENV_CONFIG_DIR, "/custom/config"), ("XDG_CONFIG_HOME", "/xdg")]),
            home(),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/custom/config"));
    }

    #[test]
    fn test_config_dir_xdg() {
        let dir = config_dir_with(lookup(&[("XDG_CONFIG_HOME", "/xdg")]), home()).unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/greenstack"));
    }

    #[test]
    fn test_config_dir_default() {
        let dir = config_dir_with(lookup(&[]), home()).unwrap();
        assert_eq!(dir, PathBuf::from("/home/ops/.config/greenstack"));
    }

    #[test]
    fn test_state_dir_priority() {
        let dir = state_dir_with(
            lookup(&[(ENV_STATE_DIR, "/srv/state"), ("XDG_STATE_HOME", "/xdg")]),
            home(),
        )
        .unwrap();
        assert_eq!(dir, PathBuf::from("/srv/state"));

        let dir = state_dir_with(lookup(&[("XDG_STATE_HOME", "/xdg")]), home()).unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/greenstack"));

        let dir = state_dir_with(lookup(&[]), home()).unwrap();
        assert_eq!(dir, PathBuf::from("/home/ops/.local/state/greenstack"));
    }

    #[test]
    fn test_no_home_is_an_error() {
        assert!(state_dir_with(lookup(&[]), None).is_err());
    }

    #[test]
    fn test_stack_state_file() {
        let target = Target::new("123456789012", "eu-west-1");
        assert_eq!(
            stack_state_file(Path::new("/s"), "GREEN-InfraStack", &target),
            PathBuf::from("/s/stacks/GREEN-InfraStack-123456789012-eu-west-1.json")
        );
        assert_eq!(
            target_dir(Path::new("/s"), &target),
            PathBuf::from("/s/targets/123456789012-eu-west-1")
        );
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
