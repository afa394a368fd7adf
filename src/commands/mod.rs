//! Command implementations
//!
//! Every command opens a [`Session`]: config, stack, target and the state
//! store, loaded once per process.

pub mod apply;
pub mod destroy;
pub mod graph;
pub mod plan;
pub mod status;
pub mod synth;

use anyhow::Result;
use declarative::{AppliedState, ExecuteOptions, FailurePolicy, RetryConfig, StackDecl, Target};
use std::path::Path;

use crate::Context;
use crate::config::Config;
use crate::paths;
use crate::provider::{self, LocalProvider};
use crate::stack::{self, ResolvedStack};
use crate::state::StateStore;

pub struct Session {
    pub config: Config,
    pub stack: StackDecl,
    pub target: Target,
    pub store: StateStore,
    parameters: Vec<(String, String)>,
}

impl Session {
    /// Open a session using the standard config and state dirs
    pub fn open(ctx: &Context) -> Result<Self> {
        Self::open_in(ctx, &paths::config_dir()?, &paths::state_dir()?, stack::target_from_env())
    }

    pub fn open_in(
        ctx: &Context,
        config_dir: &Path,
        state_dir: &Path,
        target: Target,
    ) -> Result<Self> {
        let config = Config::load(&paths::config_file(config_dir))?;
        let stack_path = ctx.stack_file.clone().or_else(|| config.stack_path());
        let stack = stack::load(stack_path.as_deref())?;

        log::info!("Stack {} targeting {}", stack.name, target);

        Ok(Self {
            config,
            stack,
            target,
            store: StateStore::new(state_dir),
            parameters: ctx.parameters.clone(),
        })
    }

    /// Resolve parameters and build the graph
    pub fn resolve(&self) -> Result<ResolvedStack> {
        let supplied = stack::merge_parameters(&self.config.parameters, &self.parameters);
        stack::resolve(&self.stack, &supplied, &self.target)
    }

    pub fn load_state(&self) -> Result<AppliedState> {
        self.store.load(&self.stack.name, &self.target)
    }

    pub fn provider(&self) -> LocalProvider {
        provider::local_for(self.store.state_dir(), &self.target)
    }

    /// Executor options: CLI flags over config over defaults
    pub fn execute_options(
        &self,
        dry_run: bool,
        jobs: Option<usize>,
        failure_policy: Option<FailurePolicy>,
        retries: Option<u32>,
    ) -> ExecuteOptions {
        let defaults = ExecuteOptions::default();
        ExecuteOptions {
            dry_run,
            jobs: jobs.or(self.config.jobs).unwrap_or(defaults.jobs).max(1),
            failure_policy: failure_policy
                .or(self.config.failure_policy)
                .unwrap_or_default(),
            retry: retries
                .or(self.config.retries)
                .map_or(defaults.retry, RetryConfig::with_retries),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    pub fn green_context() -> Context {
        Context {
            verbose: 0,
            quiet: true,
            stack_file: None,
            parameters: vec![
                (
                    "FluxRepoURL".to_string(),
                    "ssh://git@github.com/acme/fleet.git".to_string(),
                ),
                ("FluxRepoPath".to_string(), "clusters/green".to_string()),
            ],
        }
    }

    /// Session over temp config and state dirs
    pub fn session(ctx: &Context) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join("config");
        let state_dir = dir.path().join("state");
        let session =
            Session::open_in(ctx, &config_dir, &state_dir, Target::new("local", "eu-west-1"))
                .unwrap();
        (dir, session)
    }
}
