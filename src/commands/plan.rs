//! `greenstack plan` - preview what apply would change

use anyhow::Result;
use declarative::{Plan, Planner};

use super::Session;
use crate::Context;
use crate::engine;
use crate::ui;

/// Plan the session's stack against its recorded state
pub fn build(session: &Session, target: Option<&str>) -> Result<Plan> {
    let resolved = session.resolve()?;
    let state = session.load_state()?;
    Ok(Planner::new()
        .plan(&resolved.graph, &state)
        .filter_by_target(target))
}

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let session = Session::open(ctx)?;
    let plan = build(&session, target)?;

    if !ctx.quiet {
        ui::header(&format!("{} → {}", session.stack.name, session.target));
    }
    engine::display_plan(&plan, ctx.verbose > 0);
    Ok(())
}
