//! `greenstack apply` - converge the target to the declared stack

use anyhow::{Result, bail};
use declarative::{ApplyReport, ExecuteOptions, Provider};

use super::Session;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine;
use crate::ui;

/// Plan, show and apply; returns the executor's report
pub fn apply_with<P: Provider + ?Sized>(
    ctx: &Context,
    session: &Session,
    provider: &P,
    target: Option<&str>,
    opts: &ExecuteOptions,
    assume_yes: bool,
) -> Result<ApplyReport> {
    let plan = super::plan::build(session, target)?;
    engine::display_plan(&plan, ctx.verbose > 0);

    if plan.is_empty() {
        return Ok(ApplyReport::default());
    }

    let mut state = session.load_state()?;
    log::info!(
        "Applying with {} jobs, failure policy {}",
        opts.jobs,
        opts.failure_policy
    );
    engine::run(&plan, &mut state, &session.store, provider, opts, assume_yes, ctx.quiet)
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let opts = session.execute_options(
        args.dry_run,
        args.jobs,
        args.failure_policy.map(Into::into),
        args.retries,
    );

    if !ctx.quiet {
        ui::header(&format!("{} → {}", session.stack.name, session.target));
    }

    let provider = session.provider();
    let report = apply_with(
        ctx,
        &session,
        &provider,
        args.target.as_deref(),
        &opts,
        args.yes,
    )?;

    if report.outcomes.is_empty() {
        return Ok(());
    }
    engine::print_report(&report, opts.dry_run);

    if !report.is_success() {
        bail!("{} resources failed to apply", report.summary.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{green_context, session};
    use declarative::{ApplyResult, FailurePolicy, MemoryProvider, ProviderError, RetryConfig};

    fn opts(policy: FailurePolicy) -> ExecuteOptions {
        ExecuteOptions {
            failure_policy: policy,
            retry: RetryConfig::no_retry(),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_green_stack_then_plan_is_empty() {
        let ctx = green_context();
        let (_dir, session) = session(&ctx);
        let provider = session.provider();

        let report = apply_with(&ctx, &session, &provider, None, &opts(FailurePolicy::Halt), true)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.summary.created, 11);

        let state = session.load_state().unwrap();
        assert_eq!(state.len(), 11);
        let cluster = state.get("GREEN-Cluster").unwrap();
        assert!(cluster.physical_id.starts_with("eks-"));
        assert!(provider.read(cluster.kind, &cluster.physical_id).unwrap().is_some());

        let again = super::super::plan::build(&session, None).unwrap();
        assert!(again.is_empty());
        assert_eq!(again.unchanged.len(), 11);
    }

    #[test]
    fn test_apply_changed_parameter_updates_only_flux() {
        let mut ctx = green_context();
        let (dir, session) = session(&ctx);
        let provider = session.provider();
        apply_with(&ctx, &session, &provider, None, &opts(FailurePolicy::Halt), true).unwrap();

        ctx.parameters.push(("FluxRepoBranch".into(), "release".into()));
        let session = Session::open_in(
            &ctx,
            &dir.path().join("config"),
            &dir.path().join("state"),
            session.target.clone(),
        )
        .unwrap();
        let plan = super::super::plan::build(&session, None).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.actions[0].resource_id, "FluxV2");
    }

    #[test]
    fn test_rollback_leaves_state_untouched() {
        let ctx = green_context();
        let (_dir, session) = session(&ctx);
        let provider = MemoryProvider::new();
        provider.fail_on(
            "create",
            "GREEN-WorkerNodeGroup",
            ProviderError::Rejected("no capacity".into()),
            1,
        );

        let report =
            apply_with(&ctx, &session, &provider, None, &opts(FailurePolicy::Rollback), true)
                .unwrap();

        assert!(report.rolled_back);
        assert!(matches!(
            report.outcome("GREEN-WorkerNodeGroup").unwrap().result,
            ApplyResult::Failed { .. }
        ));
        assert!(session.load_state().unwrap().is_empty());
        assert!(provider.is_empty());
    }
}
