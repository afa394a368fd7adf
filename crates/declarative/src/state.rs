//! Last-applied state
//!
//! What the executor recorded the last time each resource was applied.
//! The planner compares declarations against this; the executor resolves
//! `${ref:...}` tokens from it.

use crate::tokens::Reference;
use crate::types::{Attributes, ResourceKind, Target};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of one applied resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub kind: ResourceKind,
    /// Provider-assigned identifier
    pub physical_id: String,
    /// Fingerprint of the declaration that was applied
    pub fingerprint: String,
    /// Declared attributes, parameters substituted, refs left symbolic
    #[serde(default)]
    pub attributes: Attributes,
    /// Dependencies at the time of apply, used to order deletes
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Named outputs reported by the provider
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// What each `${ref:...}` resolved to when this was applied
    #[serde(default)]
    pub resolved_refs: BTreeMap<String, String>,
    pub applied_at: DateTime<Utc>,
}

/// Last-applied state of one stack in one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedState {
    pub stack: String,
    pub target: Target,
    #[serde(default)]
    pub resources: BTreeMap<String, AppliedResource>,
    pub last_updated: DateTime<Utc>,
}

impl AppliedState {
    /// Empty state for a stack that has never been applied
    pub fn new(stack: impl Into<String>, target: Target) -> Self {
        Self {
            stack: stack.into(),
            target,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&AppliedResource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Record (or replace) a resource and bump `last_updated`
    pub fn record(&mut self, id: impl Into<String>, resource: AppliedResource) {
        self.resources.insert(id.into(), resource);
        self.last_updated = Utc::now();
    }

    /// Forget a resource, returning its last record
    pub fn remove(&mut self, id: &str) -> Option<AppliedResource> {
        let removed = self.resources.remove(id);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Value a `${ref:...}` token resolves to, if recorded
    pub fn resolve_reference(&self, reference: &Reference) -> Option<String> {
        let resource = self.resources.get(&reference.resource)?;
        match &reference.output {
            None => Some(resource.physical_id.clone()),
            Some(output) => resource.outputs.get(output).cloned(),
        }
    }

    /// Recorded ids ordered so that dependents come before dependencies
    pub fn teardown_order(&self) -> Vec<String> {
        teardown_order(self, self.resources.keys().cloned().collect())
    }
}

/// Order `ids` so that every resource comes before the ones it depends on.
///
/// Only dependencies among `ids` are considered; unknown ids keep their
/// relative order at the end.
pub fn teardown_order(state: &AppliedState, ids: Vec<String>) -> Vec<String> {
    let mut remaining = ids;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        // A resource can go once nothing still remaining depends on it.
        let next = remaining.iter().position(|candidate| {
            !remaining.iter().any(|other| {
                other != candidate
                    && state
                        .get(other)
                        .is_some_and(|r| r.depends_on.contains(candidate))
            })
        });
        // A recorded cycle cannot come from a validated graph; fall back to
        // the remaining order rather than looping.
        let idx = next.unwrap_or(0);
        ordered.push(remaining.remove(idx));
    }

    ordered
}
