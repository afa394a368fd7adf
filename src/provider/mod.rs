//! Providers the CLI can apply stacks through

pub mod local;
pub mod validate;

pub use local::LocalProvider;

use declarative::Target;
use std::path::Path;

/// Local provider rooted at the target's directory under `state_dir`
pub fn local_for(state_dir: &Path, target: &Target) -> LocalProvider {
    LocalProvider::new(crate::paths::target_dir(state_dir, target))
}
