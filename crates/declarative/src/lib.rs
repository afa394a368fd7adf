//! # Declarative
//!
//! A framework for declarative infrastructure stacks.
//!
//! A stack declares resources, their attributes, and how they depend on
//! each other. This crate turns that declaration into an ordered plan
//! against the last-applied state and converges a target to it through a
//! [`Provider`].
//!
//! ## Core Concepts
//!
//! - **ResourceDecl**: A logical resource with a kind, attributes and dependencies
//! - **ResourceGraph**: Validated, acyclic dependency graph over declarations
//! - **Plan**: Create/update/replace/delete actions in dependency order
//! - **Executor**: Applies a plan level by level, in parallel, with a failure policy
//! - **AppliedState**: What was last applied, used to detect drift and orphans
//!
//! Attributes may carry tokens, resolved at different times:
//!
//! - `${param:NAME}` and `${target:account|region}` before planning
//! - `${ref:ID}` / `${ref:ID:OUTPUT}` while applying, from recorded state
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     AppliedState, ExecuteOptions, MemoryProvider, Planner, ResourceDecl, ResourceGraph,
//!     ResourceKind, Target, execute_simple,
//! };
//! use serde_json::json;
//!
//! let decls = vec![
//!     ResourceDecl::new("vpc", ResourceKind::Network).with_attribute("cidr", json!("172.0.0.0/26")),
//!     ResourceDecl::new("cluster", ResourceKind::Cluster).with_attribute("vpc", json!("${ref:vpc}")),
//! ];
//! let graph = ResourceGraph::build(decls).unwrap();
//! let mut state = AppliedState::new("demo", Target::new("local", "eu-west-1"));
//!
//! let plan = Planner::new().plan(&graph, &state);
//! let report = execute_simple(&plan, &mut state, &MemoryProvider::new(), &ExecuteOptions::default()).unwrap();
//! assert_eq!(report.summary.created, 2);
//!
//! // Converged: nothing left to do.
//! assert!(Planner::new().plan(&graph, &state).is_empty());
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: Creates, reads, updates and deletes resources on a target
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks or target systems.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod graph;
pub mod params;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod state;
pub mod tokens;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{AttributeChange, diff_attributes, render_value};
pub use error::{Error, ErrorCategory, ProviderError, Result};
pub use executor::{ActionOutcome, ApplyReport, execute, execute_simple, resolve_references};
pub use graph::ResourceGraph;
pub use params::{ParameterDecl, ResolvedParameters, resolve_stack};
pub use planner::{ActionKind, Plan, PlanSummary, PlannedAction, Planner};
pub use provider::{MemoryProvider, MemoryRecord, Provider, ProviderOutput};
pub use resource::{ResourceDecl, StackDecl};
pub use retry::with_retry;
pub use state::{AppliedResource, AppliedState};
pub use tokens::Reference;
pub use types::{
    ApplyResult, Attributes, ExecuteOptions, ExecuteSummary, FailurePolicy, ResourceKind,
    RetryConfig, Target,
};
