//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Attribute map of a resource declaration.
///
/// Keys are kept sorted so serialized attributes are canonical.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Virtual network with subnets and gateways
    Network,
    /// Private service endpoint inside a network
    Endpoint,
    /// IAM role with managed policies
    Role,
    /// Managed Kubernetes control plane
    Cluster,
    /// Worker capacity joined to a cluster
    NodeGroup,
    /// In-cluster add-on (autoscaler, GitOps agent, controllers)
    Addon,
}

impl ResourceKind {
    /// All kinds, in the order they are usually declared
    pub const ALL: [ResourceKind; 6] = [
        Self::Network,
        Self::Endpoint,
        Self::Role,
        Self::Cluster,
        Self::NodeGroup,
        Self::Addon,
    ];

    /// Stable name used in declarations and state files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Endpoint => "endpoint",
            Self::Role => "role",
            Self::Cluster => "cluster",
            Self::NodeGroup => "node_group",
            Self::Addon => "addon",
        }
    }

    /// Prefix for provider-assigned physical ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Network => "vpc",
            Self::Endpoint => "vpce",
            Self::Role => "role",
            Self::Cluster => "eks",
            Self::NodeGroup => "ng",
            Self::Addon => "addon",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" | "vpc" => Ok(Self::Network),
            "endpoint" => Ok(Self::Endpoint),
            "role" => Ok(Self::Role),
            "cluster" => Ok(Self::Cluster),
            "node_group" | "nodegroup" => Ok(Self::NodeGroup),
            "addon" | "add_on" => Ok(Self::Addon),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Account and region a stack is deployed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub account: String,
    pub region: String,
}

impl Target {
    /// Account used when the environment names none
    pub const DEFAULT_ACCOUNT: &'static str = "local";
    /// Region used when the environment names none
    pub const DEFAULT_REGION: &'static str = "eu-west-1";

    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    /// Resolve the target through a variable lookup.
    ///
    /// Account: `CDK_DEPLOY_ACCOUNT`, then `CDK_DEFAULT_ACCOUNT`.
    /// Region: `CDK_DEPLOY_REGION`, then `CDK_DEFAULT_REGION`.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str], fallback: &str| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            account: first(
                &["CDK_DEPLOY_ACCOUNT", "CDK_DEFAULT_ACCOUNT"],
                Self::DEFAULT_ACCOUNT,
            ),
            region: first(
                &["CDK_DEPLOY_REGION", "CDK_DEFAULT_REGION"],
                Self::DEFAULT_REGION,
            ),
        }
    }

    /// Value for a `${target:KEY}` token
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "account" => Some(&self.account),
            "region" => Some(&self.region),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// Result of applying a single planned action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was updated in place or replaced
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
    /// Applied, then undone after a later failure
    RolledBack,
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }

    /// Short status symbol for terminal output
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoChange => "○",
            Self::Created | Self::Modified | Self::Removed => "✓",
            Self::Failed { .. } => "✗",
            Self::Skipped { .. } => "⊘",
            Self::RolledBack => "↺",
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    pub rolled_back: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created
            + self.modified
            + self.removed
            + self.skipped
            + self.failed
            + self.no_change
            + self.rolled_back
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
            ApplyResult::RolledBack => self.rolled_back += 1,
        }
    }
}

/// What the executor does when an action fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and keep what was applied
    #[default]
    Halt,
    /// Stop at the first failure and undo this run's changes
    Rollback,
    /// Keep going; skip only resources that depend on a failure
    Continue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Halt => "halt",
            Self::Rollback => "rollback",
            Self::Continue => "continue",
        })
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "halt" => Ok(Self::Halt),
            "rollback" => Ok(Self::Rollback),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Backoff settings for transient provider errors
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Config with `retries` retries after the first attempt
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries + 1,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't call the provider, just report what would happen
    pub dry_run: bool,
    /// Number of parallel jobs within one dependency level
    pub jobs: usize,
    /// Behaviour on the first failed action
    pub failure_policy: FailurePolicy,
    /// Retry settings for transient provider errors
    pub retry: RetryConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            failure_policy: FailurePolicy::Halt,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("bucket".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_target_prefers_deploy_variables() {
        let target = Target::from_lookup(|name| match name {
            "CDK_DEPLOY_ACCOUNT" => Some("111111111111".into()),
            "CDK_DEFAULT_ACCOUNT" => Some("222222222222".into()),
            "CDK_DEFAULT_REGION" => Some("us-east-2".into()),
            _ => None,
        });
        assert_eq!(target.account, "111111111111");
        assert_eq!(target.region, "us-east-2");
    }

    #[test]
    fn test_target_falls_back_when_unset_or_empty() {
        let target = Target::from_lookup(|name| match name {
            "CDK_DEPLOY_ACCOUNT" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(target.account, Target::DEFAULT_ACCOUNT);
        assert_eq!(target.region, Target::DEFAULT_REGION);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Modified);
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });
        summary.add_result(&ApplyResult::RolledBack);
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(30));
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("rollback".parse::<FailurePolicy>(), Ok(FailurePolicy::Rollback));
        assert!("panic".parse::<FailurePolicy>().is_err());
    }
}
