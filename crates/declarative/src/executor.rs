//! Execution engine - applies plans in dependency waves with a failure policy

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::error::{Error, ProviderError, Result};
use crate::planner::{ActionKind, Plan, PlannedAction};
use crate::provider::{Provider, ProviderOutput};
use crate::resource::ResourceDecl;
use crate::retry::with_retry;
use crate::state::{AppliedResource, AppliedState};
use crate::tokens::{self, Token};
use crate::types::{
    ApplyResult, Attributes, ExecuteOptions, ExecuteSummary, FailurePolicy, ResourceKind,
    RetryConfig,
};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Result of one planned action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub action: ActionKind,
    pub result: ApplyResult,
}

/// Everything an apply produced
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// One outcome per planned action, in plan order
    pub outcomes: Vec<ActionOutcome>,
    pub summary: ExecuteSummary,
    /// The run stopped early because of a failure
    pub halted: bool,
    /// This run's changes were compensated
    pub rolled_back: bool,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success() && !self.halted
    }

    /// Outcome for a resource id
    pub fn outcome(&self, id: &str) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.resource_id == id)
    }

    fn from_results(plan: &Plan, results: Vec<ApplyResult>) -> Self {
        let mut summary = ExecuteSummary::default();
        let outcomes = plan
            .actions
            .iter()
            .zip(results)
            .map(|(action, result)| {
                summary.add_result(&result);
                ActionOutcome {
                    resource_id: action.resource_id.clone(),
                    kind: action.kind,
                    action: action.action,
                    result,
                }
            })
            .collect();
        Self {
            outcomes,
            summary,
            halted: false,
            rolled_back: false,
        }
    }
}

/// What a successful action did to the recorded state
enum Step {
    Recorded(AppliedResource),
    Removed,
}

/// A failed action
struct Failure {
    error: Error,
    /// The recorded resource was deleted before the failure
    removed: bool,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            error,
            removed: false,
        }
    }
}

/// Execute a plan against a provider, updating `state` as actions succeed
///
/// # Type Parameters
/// * `P` - Provider type
/// * `G` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Returns
/// A report with one outcome per action. Provider failures are reported
/// in the outcomes, not as an `Err`.
pub fn execute<P, G, C>(
    plan: &Plan,
    state: &mut AppliedState,
    provider: &P,
    opts: &ExecuteOptions,
    progress: &mut G,
    confirm: &mut C,
) -> Result<ApplyReport>
where
    P: Provider + ?Sized,
    G: ProgressCallback,
    C: ConfirmCallback,
{
    if plan.is_empty() {
        return Ok(ApplyReport::default());
    }

    if opts.dry_run {
        let results = skipped_all(plan, "dry run");
        return Ok(ApplyReport::from_results(plan, results));
    }

    let prompt = format!("Apply {} changes to {}?", plan.len(), plan.stack);
    if !confirm.confirm(&prompt)? {
        let results = skipped_all(plan, "declined");
        return Ok(ApplyReport::from_results(plan, results));
    }

    log::info!(
        "Applying {} actions to {} via {} provider",
        plan.len(),
        plan.stack,
        provider.name()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| Error::Other(format!("Failed to create apply thread pool: {e}")))?;

    let mut results: Vec<Option<ApplyResult>> = vec![None; plan.len()];
    let mut journal: Vec<usize> = Vec::new();
    let mut not_ok: HashSet<&str> = HashSet::new();
    let mut halted = false;

    for (wave_index, wave) in schedule(plan).into_iter().enumerate() {
        let (runnable, blocked): (Vec<usize>, Vec<usize>) = wave.into_iter().partition(|&i| {
            !plan.actions[i]
                .after
                .iter()
                .any(|dep| not_ok.contains(dep.as_str()))
        });

        for i in blocked {
            let action = &plan.actions[i];
            let reason = action
                .after
                .iter()
                .find(|dep| not_ok.contains(dep.as_str()))
                .map(|dep| format!("{dep} did not apply"))
                .unwrap_or_default();
            results[i] = Some(ApplyResult::Skipped { reason });
            not_ok.insert(&action.resource_id);
        }

        if runnable.is_empty() {
            continue;
        }

        let label = if plan.actions[runnable[0]].action == ActionKind::Delete {
            "deletes".to_string()
        } else {
            format!("level {}", wave_index + 1)
        };
        progress.on_batch_start(&label, runnable.len());

        let snapshot: &AppliedState = state;
        let outcomes: Vec<(usize, std::result::Result<(ApplyResult, Step), Failure>)> =
            if runnable.len() == 1 || opts.jobs <= 1 {
                runnable
                    .iter()
                    .map(|&i| (i, apply_action(&plan.actions[i], snapshot, provider, &opts.retry)))
                    .collect()
            } else {
                pool.install(|| {
                    runnable
                        .par_iter()
                        .map(|&i| (i, apply_action(&plan.actions[i], snapshot, provider, &opts.retry)))
                        .collect()
                })
            };

        for (i, outcome) in outcomes {
            let action = &plan.actions[i];
            let result = match outcome {
                Ok((result, Step::Recorded(record))) => {
                    state.record(action.resource_id.clone(), record);
                    journal.push(i);
                    result
                }
                Ok((result, Step::Removed)) => {
                    state.remove(&action.resource_id);
                    journal.push(i);
                    result
                }
                Err(Failure { error: e, removed }) => {
                    log::error!("{}: {}", action.description(), e);
                    if removed {
                        // Rollback recreates what the replace deleted.
                        state.remove(&action.resource_id);
                        journal.push(i);
                    }
                    not_ok.insert(&action.resource_id);
                    if opts.failure_policy != FailurePolicy::Continue {
                        halted = true;
                    }
                    ApplyResult::Failed {
                        error: e.to_string(),
                    }
                }
            };
            progress.on_resource_complete(&action.resource_id, &result);
            results[i] = Some(result);
        }
        progress.on_batch_complete();

        if halted {
            break;
        }
    }

    let mut rolled_back = false;
    if halted && opts.failure_policy == FailurePolicy::Rollback {
        rollback(plan, &journal, state, provider, &opts.retry, &mut results, progress);
        rolled_back = true;
    }

    let results = results
        .into_iter()
        .map(|r| {
            r.unwrap_or(ApplyResult::Skipped {
                reason: "halted after failure".to_string(),
            })
        })
        .collect();

    let mut report = ApplyReport::from_results(plan, results);
    report.halted = halted;
    report.rolled_back = rolled_back;
    Ok(report)
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<P: Provider + ?Sized>(
    plan: &Plan,
    state: &mut AppliedState,
    provider: &P,
    opts: &ExecuteOptions,
) -> Result<ApplyReport> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, state, provider, opts, &mut NoProgress, &mut AutoConfirm)
}

fn skipped_all(plan: &Plan, reason: &str) -> Vec<ApplyResult> {
    plan.actions
        .iter()
        .map(|_| ApplyResult::Skipped {
            reason: reason.to_string(),
        })
        .collect()
}

/// Group action indices into waves.
///
/// An action lands one wave after the latest action it must wait for.
/// Deletes start in a wave of their own after every create/update.
fn schedule(plan: &Plan) -> Vec<Vec<usize>> {
    let mut wave_of: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<usize>> = Vec::new();
    let mut delete_base: Option<usize> = None;

    for (i, action) in plan.actions.iter().enumerate() {
        let base = if action.action == ActionKind::Delete {
            *delete_base.get_or_insert(waves.len())
        } else {
            0
        };
        let wave = action
            .after
            .iter()
            .filter_map(|dep| wave_of.get(dep.as_str()))
            .map(|w| w + 1)
            .max()
            .unwrap_or(0)
            .max(base);

        wave_of.insert(&action.resource_id, wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(i);
    }

    waves
}

/// Replace `${ref:...}` tokens with recorded physical ids and outputs
pub fn resolve_references(decl: &ResourceDecl, state: &AppliedState) -> Result<Attributes> {
    resolve_attribute_refs(&decl.id, &decl.attributes, state)
}

fn resolve_attribute_refs(id: &str, attributes: &Attributes, state: &AppliedState) -> Result<Attributes> {
    tokens::rewrite(id, attributes, |token| match token {
        Token::Ref(reference) => state
            .resolve_reference(reference)
            .map(Some)
            .ok_or_else(|| Error::UnresolvedReference {
                resource: id.to_string(),
                target: reference.to_string(),
            }),
        Token::Param(name) => Err(Error::UnknownParameter((*name).to_string())),
        Token::Target(key) => Err(Error::InvalidToken {
            resource: id.to_string(),
            attribute: "target".to_string(),
            token: format!("${{target:{key}}}"),
        }),
    })
}

/// Reference values as the executor resolved them, keyed by reference
fn resolved_refs(decl: &ResourceDecl, state: &AppliedState) -> BTreeMap<String, String> {
    decl.references()
        .into_iter()
        .filter_map(|r| state.resolve_reference(&r).map(|value| (r.to_string(), value)))
        .collect()
}

fn record_for(
    decl: &ResourceDecl,
    output: ProviderOutput,
    resolved_refs: BTreeMap<String, String>,
) -> AppliedResource {
    AppliedResource {
        kind: decl.kind,
        physical_id: output.physical_id,
        fingerprint: decl.fingerprint(),
        attributes: decl.attributes.clone(),
        depends_on: decl.dependency_ids(),
        outputs: output.outputs,
        resolved_refs,
        applied_at: Utc::now(),
    }
}

fn missing(what: &str, action: &PlannedAction) -> Error {
    Error::Other(format!("{} has no {}", action.description(), what))
}

/// Delete, treating "already gone" as success
fn delete_quietly<P: Provider + ?Sized>(
    provider: &P,
    kind: ResourceKind,
    physical_id: &str,
    retry: &RetryConfig,
) -> std::result::Result<(), ProviderError> {
    match with_retry(retry, &format!("delete {physical_id}"), || {
        provider.delete(kind, physical_id)
    }) {
        Err(ProviderError::NotFound { .. }) => {
            log::debug!("{} {} already gone", kind, physical_id);
            Ok(())
        }
        other => other,
    }
}

/// Apply a single action
fn apply_action<P: Provider + ?Sized>(
    action: &PlannedAction,
    state: &AppliedState,
    provider: &P,
    retry: &RetryConfig,
) -> std::result::Result<(ApplyResult, Step), Failure> {
    let id = action.resource_id.as_str();
    log::debug!("{}", action.description());

    match action.action {
        ActionKind::Create => {
            let decl = action.desired.as_ref().ok_or_else(|| missing("declaration", action))?;
            let attrs = resolve_references(decl, state)?;
            let output = with_retry(retry, &action.description(), || {
                provider.create(decl.kind, id, &attrs)
            })
            .map_err(|e| Error::provider("create", id, e))?;
            let record = record_for(decl, output, resolved_refs(decl, state));
            Ok((ApplyResult::Created, Step::Recorded(record)))
        }
        ActionKind::Update => {
            let decl = action.desired.as_ref().ok_or_else(|| missing("declaration", action))?;
            let prev = action.previous.as_ref().ok_or_else(|| missing("previous state", action))?;
            let attrs = resolve_references(decl, state)?;
            let output = with_retry(retry, &action.description(), || {
                provider.update(decl.kind, &prev.physical_id, &attrs)
            })
            .map_err(|e| Error::provider("update", id, e))?;
            let record = record_for(decl, output, resolved_refs(decl, state));
            Ok((ApplyResult::Modified, Step::Recorded(record)))
        }
        ActionKind::Replace => {
            let decl = action.desired.as_ref().ok_or_else(|| missing("declaration", action))?;
            let prev = action.previous.as_ref().ok_or_else(|| missing("previous state", action))?;
            let attrs = resolve_references(decl, state)?;
            delete_quietly(provider, prev.kind, &prev.physical_id, retry)
                .map_err(|e| Error::provider("delete", id, e))?;
            let output = with_retry(retry, &action.description(), || {
                provider.create(decl.kind, id, &attrs)
            })
            .map_err(|e| Failure {
                error: Error::provider("create", id, e),
                removed: true,
            })?;
            let record = record_for(decl, output, resolved_refs(decl, state));
            Ok((ApplyResult::Modified, Step::Recorded(record)))
        }
        ActionKind::Delete => {
            let prev = action.previous.as_ref().ok_or_else(|| missing("previous state", action))?;
            delete_quietly(provider, prev.kind, &prev.physical_id, retry)
                .map_err(|e| Error::provider("delete", id, e))?;
            Ok((ApplyResult::Removed, Step::Removed))
        }
    }
}

/// Undo journaled actions in reverse order
fn rollback<P, G>(
    plan: &Plan,
    journal: &[usize],
    state: &mut AppliedState,
    provider: &P,
    retry: &RetryConfig,
    results: &mut [Option<ApplyResult>],
    progress: &mut G,
) where
    P: Provider + ?Sized,
    G: ProgressCallback,
{
    if journal.is_empty() {
        return;
    }

    log::warn!("Rolling back {} applied actions", journal.len());
    progress.on_batch_start("rollback", journal.len());

    for &i in journal.iter().rev() {
        let action = &plan.actions[i];
        let result = match compensate(action, state, provider, retry) {
            Ok(()) => match results[i].take() {
                Some(ApplyResult::Failed { error }) => ApplyResult::Failed {
                    error: format!("{error}; previous resource restored"),
                },
                _ => ApplyResult::RolledBack,
            },
            Err(e) => {
                log::error!("Rollback of {} failed: {}", action.resource_id, e);
                ApplyResult::Failed {
                    error: format!("applied, but rollback failed: {e}"),
                }
            }
        };
        progress.on_resource_complete(&action.resource_id, &result);
        results[i] = Some(result);
    }

    progress.on_batch_complete();
}

/// Return one resource to its pre-run state, and its record with it
fn compensate<P: Provider + ?Sized>(
    action: &PlannedAction,
    state: &mut AppliedState,
    provider: &P,
    retry: &RetryConfig,
) -> Result<()> {
    let id = action.resource_id.as_str();

    // Remove whatever this run created.
    if matches!(action.action, ActionKind::Create | ActionKind::Replace)
        && let Some(current) = state.get(id)
    {
        let (kind, physical_id) = (current.kind, current.physical_id.clone());
        delete_quietly(provider, kind, &physical_id, retry)
            .map_err(|e| Error::provider("delete", id, e))?;
        state.remove(id);
    }

    let Some(prev) = action.previous.as_ref() else {
        return Ok(());
    };
    let attrs = resolve_attribute_refs(id, &prev.attributes, state)?;

    let output = match action.action {
        ActionKind::Create => return Ok(()),
        ActionKind::Update => {
            let physical_id = state
                .get(id)
                .map_or_else(|| prev.physical_id.clone(), |r| r.physical_id.clone());
            with_retry(retry, &format!("restore {id}"), || {
                provider.update(prev.kind, &physical_id, &attrs)
            })
            .map_err(|e| Error::provider("restore", id, e))?
        }
        ActionKind::Replace | ActionKind::Delete => {
            with_retry(retry, &format!("recreate {id}"), || {
                provider.create(prev.kind, id, &attrs)
            })
            .map_err(|e| Error::provider("recreate", id, e))?
        }
    };

    state.record(
        id,
        AppliedResource {
            physical_id: output.physical_id,
            outputs: output.outputs,
            ..prev.clone()
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, NoProgress};
    use crate::graph::ResourceGraph;
    use crate::planner::Planner;
    use crate::provider::MemoryProvider;
    use crate::types::Target;
    use serde_json::json;
    use std::time::Duration;

    fn decls() -> Vec<ResourceDecl> {
        vec![
            ResourceDecl::new("vpc", ResourceKind::Network)
                .with_attribute("cidr", json!("172.0.0.0/26")),
            ResourceDecl::new("cluster-role", ResourceKind::Role)
                .with_attribute("assumed_by", json!("eks.amazonaws.com")),
            ResourceDecl::new("worker-role", ResourceKind::Role)
                .with_attribute("assumed_by", json!("ec2.amazonaws.com")),
            ResourceDecl::new("cluster", ResourceKind::Cluster)
                .with_attribute("vpc", json!("${ref:vpc}"))
                .with_attribute("role_arn", json!("${ref:cluster-role:arn}")),
            ResourceDecl::new("ng", ResourceKind::NodeGroup)
                .with_attribute("cluster", json!("${ref:cluster}"))
                .with_attribute("node_role", json!("${ref:worker-role:arn}"))
                .with_attribute("min_size", json!(1)),
            ResourceDecl::new("flux", ResourceKind::Addon)
                .with_attribute("cluster", json!("${ref:cluster}")),
        ]
    }

    fn fresh_state() -> AppliedState {
        AppliedState::new("GREEN-InfraStack", Target::new("1", "eu-west-1"))
    }

    fn opts(policy: FailurePolicy) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: false,
            jobs: 4,
            failure_policy: policy,
            retry: RetryConfig {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                backoff_factor: 1.0,
                max_delay: Duration::from_millis(2),
            },
        }
    }

    fn plan_for(decls: Vec<ResourceDecl>, state: &AppliedState) -> Plan {
        let graph = ResourceGraph::build(decls).unwrap();
        Planner::new().plan(&graph, state)
    }

    #[test]
    fn test_execute_empty_plan() {
        let mut state = fresh_state();
        let report = execute_simple(
            &Plan::default(),
            &mut state,
            &MemoryProvider::new(),
            &ExecuteOptions::default(),
        )
        .unwrap();
        assert_eq!(report.summary.total(), 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_apply_creates_everything_and_resolves_refs() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);

        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        assert_eq!(report.summary.created, 6);
        assert_eq!(state.len(), 6);
        let cluster_id = &state.get("cluster").unwrap().physical_id;
        let ng = provider.find("ng").unwrap();
        assert_eq!(ng.attributes["cluster"], json!(cluster_id));
        assert!(ng.attributes["node_role"].as_str().unwrap().starts_with("arn:memory:role:"));
    }

    #[test]
    fn test_second_plan_after_apply_is_empty() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        let again = plan_for(decls(), &state);
        assert!(again.is_empty());
        assert_eq!(again.unchanged.len(), 6);
    }

    #[test]
    fn test_node_group_created_after_cluster_and_role() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        let calls = provider.calls();
        let pos = |c: &str| calls.iter().position(|x| x == c).unwrap();
        assert!(pos("create cluster") < pos("create ng"));
        assert!(pos("create worker-role") < pos("create ng"));
        assert!(pos("create vpc") < pos("create cluster"));
    }

    #[test]
    fn test_halt_skips_remaining_actions() {
        let provider = MemoryProvider::new();
        provider.fail_on("create", "cluster", ProviderError::Rejected("bad version".into()), 1);
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);

        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        assert!(report.halted);
        assert!(!report.is_success());
        assert!(matches!(
            report.outcome("cluster").unwrap().result,
            ApplyResult::Failed { .. }
        ));
        assert!(matches!(
            report.outcome("ng").unwrap().result,
            ApplyResult::Skipped { .. }
        ));
        // First level stays applied and recorded.
        assert!(state.contains("vpc"));
        assert!(!state.contains("cluster"));
        assert!(!provider.calls().contains(&"create ng".to_string()));
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        let provider = MemoryProvider::new();
        provider.fail_on("create", "ng", ProviderError::Rejected("no capacity".into()), 1);
        let mut state = fresh_state();
        let before = state.clone();
        let plan = plan_for(decls(), &state);

        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Rollback)).unwrap();

        assert!(report.rolled_back);
        assert!(report.summary.rolled_back >= 4);
        assert_eq!(state.resources, before.resources);
        assert!(provider.is_empty());
    }

    #[test]
    fn test_rollback_restores_updated_attributes() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        let applied = state.clone();

        let mut changed = decls();
        changed[0] = changed[0].clone().with_attribute("cidr", json!("10.0.0.0/16"));
        changed[4] = changed[4].clone().with_attribute("min_size", json!(3));
        provider.fail_on("update", "ng", ProviderError::Rejected("nope".into()), 1);
        let plan = plan_for(changed, &state);
        assert_eq!(plan.summary().updates, 2);

        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Rollback)).unwrap();

        assert!(report.rolled_back);
        assert_eq!(provider.find("vpc").unwrap().attributes["cidr"], json!("172.0.0.0/26"));
        assert_eq!(
            state.get("vpc").unwrap().fingerprint,
            applied.get("vpc").unwrap().fingerprint
        );
    }

    #[test]
    fn test_continue_skips_only_dependents() {
        let provider = MemoryProvider::new();
        provider.fail_on("create", "worker-role", ProviderError::Rejected("policy".into()), 1);
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);

        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Continue)).unwrap();

        assert!(!report.halted);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert!(state.contains("flux"));
        assert!(!state.contains("ng"));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let provider = MemoryProvider::new();
        provider.fail_on("create", "vpc", ProviderError::Transient("throttled".into()), 1);
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);

        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        assert!(report.is_success());
        assert_eq!(report.summary.created, 6);
    }

    #[test]
    fn test_deletes_run_dependents_first() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        let destroy = Planner::new().plan_destroy(&state);
        let report =
            execute_simple(&destroy, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        assert_eq!(report.summary.removed, 6);
        assert!(state.is_empty());
        assert!(provider.is_empty());
        let calls = provider.calls();
        let pos = |c: &str| calls.iter().position(|x| x == c).unwrap();
        assert!(pos("delete ng") < pos("delete cluster"));
        assert!(pos("delete cluster") < pos("delete vpc"));
    }

    #[test]
    fn test_dry_run_and_decline_touch_nothing() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);

        let mut dry = opts(FailurePolicy::Halt);
        dry.dry_run = true;
        let report = execute_simple(&plan, &mut state, &provider, &dry).unwrap();
        assert_eq!(report.summary.skipped, 6);

        let report = execute(
            &plan,
            &mut state,
            &provider,
            &opts(FailurePolicy::Halt),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(report.summary.skipped, 6);
        assert!(provider.calls().is_empty());
        assert!(state.is_empty());
    }

    fn kinds(plan: &Plan) -> Vec<(ActionKind, &str)> {
        plan.actions
            .iter()
            .map(|a| (a.action, a.resource_id.as_str()))
            .collect()
    }

    /// State and provider after applying `decls()` with `cluster` declared
    /// as an endpoint
    fn applied_with_endpoint_cluster() -> (MemoryProvider, AppliedState) {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let mut before = decls();
        before[3].kind = ResourceKind::Endpoint;
        let plan = plan_for(before, &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        (provider, state)
    }

    #[test]
    fn test_replace_updates_referencing_resources() {
        let (provider, mut state) = applied_with_endpoint_cluster();
        let old_cluster = state.get("cluster").unwrap().physical_id.clone();

        let plan = plan_for(decls(), &state);
        assert_eq!(
            kinds(&plan),
            vec![
                (ActionKind::Replace, "cluster"),
                (ActionKind::Update, "ng"),
                (ActionKind::Update, "flux"),
            ]
        );

        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        assert!(report.is_success());

        let new_cluster = state.get("cluster").unwrap().physical_id.clone();
        assert_ne!(new_cluster, old_cluster);
        assert_eq!(provider.find("ng").unwrap().attributes["cluster"], json!(new_cluster));
        assert_eq!(provider.find("flux").unwrap().attributes["cluster"], json!(new_cluster));
        assert!(plan_for(decls(), &state).is_empty());
    }

    #[test]
    fn test_interrupted_replace_is_repaired_by_next_plan() {
        let (provider, mut state) = applied_with_endpoint_cluster();
        provider.fail_on("update", "ng", ProviderError::Rejected("busy".into()), 1);

        let plan = plan_for(decls(), &state);
        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        assert!(report.halted);

        // ng still points at the deleted cluster
        let plan = plan_for(decls(), &state);
        assert_eq!(kinds(&plan), vec![(ActionKind::Update, "ng")]);
        assert_eq!(plan.actions[0].changes[0].name, "${ref:cluster}");

        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        let cluster = state.get("cluster").unwrap().physical_id.clone();
        assert_eq!(provider.find("ng").unwrap().attributes["cluster"], json!(cluster));
        assert!(plan_for(decls(), &state).is_empty());
    }

    #[test]
    fn test_failed_replace_halt_forgets_deleted_resource() {
        let (provider, mut state) = applied_with_endpoint_cluster();
        provider.fail_on("create", "cluster", ProviderError::Rejected("quota".into()), 1);

        let plan = plan_for(decls(), &state);
        let report = execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        assert!(report.halted);
        assert!(provider.find("cluster").is_none());
        assert!(!state.contains("cluster"));
        assert!(matches!(
            report.outcome("ng").unwrap().result,
            ApplyResult::Skipped { .. }
        ));

        let plan = plan_for(decls(), &state);
        assert_eq!(
            kinds(&plan),
            vec![
                (ActionKind::Create, "cluster"),
                (ActionKind::Update, "ng"),
                (ActionKind::Update, "flux"),
            ]
        );
    }

    #[test]
    fn test_failed_replace_rollback_recreates_previous() {
        let (provider, mut state) = applied_with_endpoint_cluster();
        let before = state.get("cluster").unwrap().clone();
        provider.fail_on("create", "cluster", ProviderError::Rejected("quota".into()), 1);

        let plan = plan_for(decls(), &state);
        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Rollback)).unwrap();

        assert!(report.rolled_back);
        let ApplyResult::Failed { error } = &report.outcome("cluster").unwrap().result else {
            panic!("replace should be reported as failed");
        };
        assert!(error.contains("previous resource restored"));

        let restored = state.get("cluster").unwrap();
        assert_eq!(restored.kind, ResourceKind::Endpoint);
        assert_eq!(restored.fingerprint, before.fingerprint);
        assert!(
            provider
                .read(ResourceKind::Endpoint, &restored.physical_id)
                .unwrap()
                .is_some()
        );
        assert_eq!(provider.find("cluster").unwrap().kind, ResourceKind::Endpoint);
    }

    #[test]
    fn test_rollback_recreates_replaced_resource() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();
        let applied = state.clone();

        let mut changed = decls();
        changed[5].kind = ResourceKind::Endpoint;
        changed[4] = changed[4].clone().with_attribute("min_size", json!(3));
        provider.fail_on("update", "ng", ProviderError::Rejected("nope".into()), 1);
        let plan = plan_for(changed, &state);
        assert_eq!(
            kinds(&plan),
            vec![(ActionKind::Update, "ng"), (ActionKind::Replace, "flux")]
        );

        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Rollback)).unwrap();

        assert!(report.rolled_back);
        assert_eq!(report.outcome("flux").unwrap().result, ApplyResult::RolledBack);
        assert_eq!(provider.len(), 6);
        assert_eq!(provider.find("flux").unwrap().kind, ResourceKind::Addon);
        let flux = state.get("flux").unwrap();
        assert_eq!(flux.kind, ResourceKind::Addon);
        assert_eq!(flux.fingerprint, applied.get("flux").unwrap().fingerprint);
        assert_eq!(
            provider.find("flux").unwrap().attributes["cluster"],
            json!(state.get("cluster").unwrap().physical_id)
        );
    }

    #[test]
    fn test_rollback_recreates_deleted_orphans() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        provider.fail_on("delete", "flux", ProviderError::Rejected("finalizer".into()), 1);
        let plan = plan_for(decls()[..4].to_vec(), &state);
        assert_eq!(
            kinds(&plan),
            vec![(ActionKind::Delete, "flux"), (ActionKind::Delete, "ng")]
        );

        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Rollback)).unwrap();

        assert!(report.rolled_back);
        assert_eq!(report.outcome("ng").unwrap().result, ApplyResult::RolledBack);
        assert!(matches!(
            report.outcome("flux").unwrap().result,
            ApplyResult::Failed { .. }
        ));
        assert_eq!(state.len(), 6);
        assert_eq!(provider.len(), 6);
        let ng = state.get("ng").unwrap();
        assert!(provider.read(ResourceKind::NodeGroup, &ng.physical_id).unwrap().is_some());
        assert_eq!(
            provider.find("ng").unwrap().attributes["cluster"],
            json!(state.get("cluster").unwrap().physical_id)
        );
    }

    #[test]
    fn test_continue_skips_deletes_of_dependencies() {
        let provider = MemoryProvider::new();
        let mut state = fresh_state();
        let plan = plan_for(decls(), &state);
        execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Halt)).unwrap();

        provider.fail_on("delete", "ng", ProviderError::Rejected("draining".into()), 1);
        let plan = plan_for(decls()[..3].to_vec(), &state);
        let report =
            execute_simple(&plan, &mut state, &provider, &opts(FailurePolicy::Continue)).unwrap();

        assert!(!report.halted);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.removed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(
            report.outcome("cluster").unwrap().result,
            ApplyResult::Skipped {
                reason: "ng did not apply".to_string()
            }
        );
        assert!(!state.contains("flux"));
        assert!(state.contains("ng"));
        assert!(state.contains("cluster"));
        assert!(provider.find("cluster").is_some());
    }

    #[test]
    fn test_schedule_waves() {
        let plan = plan_for(decls(), &fresh_state());
        let waves: Vec<Vec<&str>> = schedule(&plan)
            .iter()
            .map(|w| w.iter().map(|&i| plan.actions[i].resource_id.as_str()).collect())
            .collect();
        assert_eq!(waves[0], vec!["vpc", "cluster-role", "worker-role"]);
        assert_eq!(waves[1], vec!["cluster"]);
        assert_eq!(waves[2], vec!["ng", "flux"]);
    }
}
