//! Plan evaluation - compare desired declarations with last-applied state

use crate::diff::{AttributeChange, diff_attributes};
use crate::graph::ResourceGraph;
use crate::resource::ResourceDecl;
use crate::state::{AppliedResource, AppliedState, teardown_order};
use crate::types::{Attributes, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// What the executor will do to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    /// Delete the recorded resource, then create the declared one
    Replace,
    Delete,
}

impl ActionKind {
    /// Diff-style symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "±",
            Self::Delete => "-",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        })
    }
}

/// A single planned action
#[derive(Debug, Clone)]
pub struct PlannedAction {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub action: ActionKind,
    /// Declaration to converge to; `None` for deletes
    pub desired: Option<ResourceDecl>,
    /// Last-applied record; `None` for creates
    pub previous: Option<AppliedResource>,
    /// Changed attributes, for display
    pub changes: Vec<AttributeChange>,
    /// Ids this action must wait for (graph dependencies, or for deletes
    /// the recorded dependents)
    pub after: Vec<String>,
}

impl PlannedAction {
    /// One-line human description
    pub fn description(&self) -> String {
        format!("{} {} {}", self.action, self.kind, self.resource_id)
    }
}

/// Counts of planned work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub unchanged: usize,
}

impl PlanSummary {
    /// Total number of actions
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// An ordered list of actions
///
/// Creates, updates and replaces come first in dependency order; deletes
/// of resources no longer declared come last, dependents first.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub stack: String,
    pub actions: Vec<PlannedAction>,
    /// Ids declared and already up to date
    pub unchanged: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            unchanged: self.unchanged.len(),
            ..Default::default()
        };
        for action in &self.actions {
            match action.action {
                ActionKind::Create => summary.creates += 1,
                ActionKind::Update => summary.updates += 1,
                ActionKind::Replace => summary.replaces += 1,
                ActionKind::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    /// Filter the plan to actions matching a predicate, keeping order
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&PlannedAction) -> bool,
    {
        Self {
            stack: self.stack,
            actions: self.actions.into_iter().filter(|a| predicate(a)).collect(),
            unchanged: self.unchanged,
        }
    }

    /// Filter the plan to actions matching a target pattern
    ///
    /// Target format: "kind" or "kind.id"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => {
                let (kind, name) = parse_target(t);
                self.filter(|a| matches_filter(a, kind.as_deref(), name.as_deref()))
            }
        }
    }
}

/// Parse a target string like "kind.id" into (kind, id)
///
/// Ids may themselves contain dots, so only the first dot splits.
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None if target.parse::<ResourceKind>().is_ok() => (Some(target.to_string()), None),
        None => (None, Some(target.to_string())),
        Some((kind, id)) if kind.parse::<ResourceKind>().is_ok() => {
            (Some(kind.to_string()), Some(id.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
    }
}

fn matches_filter(action: &PlannedAction, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind
        && k.parse::<ResourceKind>().ok() != Some(action.kind)
    {
        return false;
    }

    if let Some(n) = name
        && !action.resource_id.contains(n)
    {
        return false;
    }

    true
}

/// Builds plans from a graph and last-applied state
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the actions needed to converge `state` to `graph`
    pub fn plan(&self, graph: &ResourceGraph, state: &AppliedState) -> Plan {
        let mut actions = Vec::new();
        let mut unchanged = Vec::new();
        // Ids that get a new physical id when this plan runs
        let mut reidentified: HashSet<&str> = HashSet::new();

        for decl in graph.topological_order() {
            let after = graph
                .dependencies(&decl.id)
                .into_iter()
                .map(str::to_string)
                .collect();
            let fingerprint = decl.fingerprint();

            let (action, previous, changes) = match state.get(&decl.id) {
                None => (
                    ActionKind::Create,
                    None,
                    diff_attributes(&Attributes::new(), &decl.attributes),
                ),
                Some(prev) if prev.kind != decl.kind => (
                    ActionKind::Replace,
                    Some(prev.clone()),
                    diff_attributes(&prev.attributes, &decl.attributes),
                ),
                Some(prev) if prev.fingerprint != fingerprint => (
                    ActionKind::Update,
                    Some(prev.clone()),
                    diff_attributes(&prev.attributes, &decl.attributes),
                ),
                Some(prev) => {
                    let changes = stale_references(decl, prev, state, &reidentified);
                    if changes.is_empty() {
                        log::trace!("{} is up to date", decl.id);
                        unchanged.push(decl.id.clone());
                        continue;
                    }
                    log::debug!("{} refers to resources with new identities", decl.id);
                    (ActionKind::Update, Some(prev.clone()), changes)
                }
            };

            if matches!(action, ActionKind::Create | ActionKind::Replace) {
                reidentified.insert(&decl.id);
            }

            actions.push(PlannedAction {
                resource_id: decl.id.clone(),
                kind: decl.kind,
                action,
                desired: Some(decl.clone()),
                previous,
                changes,
                after,
            });
        }

        let orphans: Vec<String> = state
            .resources
            .keys()
            .filter(|id| !graph.contains(id))
            .cloned()
            .collect();
        actions.extend(delete_actions(state, orphans));

        log::debug!(
            "Planned {} actions, {} unchanged",
            actions.len(),
            unchanged.len()
        );

        Plan {
            stack: state.stack.clone(),
            actions,
            unchanged,
        }
    }

    /// Plan that deletes every recorded resource, dependents first
    pub fn plan_destroy(&self, state: &AppliedState) -> Plan {
        let ids = state.resources.keys().cloned().collect();
        Plan {
            stack: state.stack.clone(),
            actions: delete_actions(state, ids),
            unchanged: Vec::new(),
        }
    }
}

/// References of an otherwise unchanged resource that no longer resolve
/// to what was applied.
///
/// A referenced resource being created or replaced in the same plan always
/// counts; its new value is only known after apply.
fn stale_references(
    decl: &ResourceDecl,
    prev: &AppliedResource,
    state: &AppliedState,
    reidentified: &HashSet<&str>,
) -> Vec<AttributeChange> {
    decl.references()
        .into_iter()
        .filter_map(|reference| {
            let key = reference.to_string();
            let applied = prev.resolved_refs.get(&key);
            let to = if reidentified.contains(reference.resource.as_str()) {
                Value::String("(known after apply)".to_string())
            } else {
                let current = state.resolve_reference(&reference)?;
                if applied.is_none_or(|old| *old == current) {
                    return None;
                }
                Value::String(current)
            };
            Some(AttributeChange {
                name: format!("${{ref:{key}}}"),
                from: applied.map(|old| Value::String(old.clone())),
                to: Some(to),
            })
        })
        .collect()
}

fn delete_actions(state: &AppliedState, ids: Vec<String>) -> Vec<PlannedAction> {
    teardown_order(state, ids.clone())
        .into_iter()
        .filter_map(|id| {
            let prev = state.get(&id)?;
            let after = ids
                .iter()
                .filter(|other| state.get(other).is_some_and(|r| r.depends_on.contains(&id)))
                .cloned()
                .collect();
            Some(PlannedAction {
                resource_id: id.clone(),
                kind: prev.kind,
                action: ActionKind::Delete,
                desired: None,
                previous: Some(prev.clone()),
                changes: diff_attributes(&prev.attributes, &Attributes::new()),
                after,
            })
        })
        .collect()
}
