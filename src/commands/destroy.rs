//! `greenstack destroy` - delete every recorded resource

use anyhow::{Result, bail};
use declarative::{ApplyReport, ExecuteOptions, FailurePolicy, Planner, Provider};

use super::Session;
use crate::Context;
use crate::engine;
use crate::ui;

pub fn destroy_with<P: Provider + ?Sized>(
    ctx: &Context,
    session: &Session,
    provider: &P,
    opts: &ExecuteOptions,
    assume_yes: bool,
) -> Result<ApplyReport> {
    let mut state = session.load_state()?;
    let plan = Planner::new().plan_destroy(&state);
    engine::display_plan(&plan, ctx.verbose > 0);

    if plan.is_empty() {
        return Ok(ApplyReport::default());
    }

    engine::run(&plan, &mut state, &session.store, provider, opts, assume_yes, ctx.quiet)
}

pub fn run(ctx: &Context, yes: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    // Halting keeps resources whose dependents could not be removed
    let opts = session.execute_options(false, None, Some(FailurePolicy::Halt), None);

    if !ctx.quiet {
        ui::header(&format!("Destroy {} in {}", session.stack.name, session.target));
    }

    let provider = session.provider();
    let report = destroy_with(ctx, &session, &provider, &opts, yes)?;
    if report.outcomes.is_empty() {
        return Ok(());
    }
    engine::print_report(&report, false);

    if !report.is_success() {
        bail!("{} resources could not be deleted", report.summary.failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::apply::apply_with;
    use crate::commands::testing::{green_context, session};
    use declarative::RetryConfig;

    #[test]
    fn test_destroy_after_apply_removes_everything() {
        let ctx = green_context();
        let (_dir, session) = session(&ctx);
        let provider = session.provider();
        let opts = ExecuteOptions {
            retry: RetryConfig::no_retry(),
            ..Default::default()
        };

        apply_with(&ctx, &session, &provider, None, &opts, true).unwrap();
        let report = destroy_with(&ctx, &session, &provider, &opts, true).unwrap();

        assert!(report.is_success());
        assert_eq!(report.summary.removed, 11);
        assert!(session.load_state().unwrap().is_empty());
    }

    #[test]
    fn test_destroy_with_nothing_recorded() {
        let ctx = green_context();
        let (_dir, session) = session(&ctx);
        let report =
            destroy_with(&ctx, &session, &session.provider(), &ExecuteOptions::default(), true)
                .unwrap();
        assert!(report.outcomes.is_empty());
    }
}
