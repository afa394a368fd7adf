//! Execution engine - terminal integration for the declarative executor

use anyhow::Result;
use colored::Colorize;
use declarative::{
    AppliedState, ApplyReport, ApplyResult, ConfirmCallback, ExecuteOptions, Plan,
    ProgressCallback, Provider,
};
use indicatif::ProgressBar;
use std::io;

use crate::progress;
use crate::state::StateStore;

/// Progress bars per batch; failures are printed above the bar
#[derive(Default)]
pub struct TerminalProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_batch_start(&mut self, label: &str, count: usize) {
        if self.quiet {
            return;
        }
        println!();
        println!("  {} Applying {} ({} resources)...", "→".cyan(), label, count);
        self.bar = Some(progress::bar(count as u64, label));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let Some(pb) = &self.bar else {
            return;
        };
        pb.set_message(format!("{} {}", result.symbol(), id));
        if let ApplyResult::Failed { error } = result {
            pb.suspend(|| println!("    {} {} ({})", "✗".red(), id, error));
        }
        pb.inc(1);
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

/// Asks on the terminal, or says yes when `--yes` was given
pub struct TerminalConfirm {
    pub assume_yes: bool,
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Apply a plan, saving state even when actions fail
pub fn run<P: Provider + ?Sized>(
    plan: &Plan,
    state: &mut AppliedState,
    store: &StateStore,
    provider: &P,
    opts: &ExecuteOptions,
    assume_yes: bool,
    quiet: bool,
) -> Result<ApplyReport> {
    let mut progress = TerminalProgress::new(quiet);
    let mut confirm = TerminalConfirm { assume_yes };

    let report = declarative::execute(plan, state, provider, opts, &mut progress, &mut confirm)?;

    if !opts.dry_run && report.summary.total() > report.summary.skipped {
        store.save(state)?;
    }

    Ok(report)
}

/// Print final summary
pub fn print_report(report: &ApplyReport, dry_run: bool) {
    let summary = &report.summary;
    println!();

    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return;
    }

    if summary.total() > 0 && summary.skipped == summary.total() {
        println!("  {} Aborted", "✗".red());
        return;
    }

    if report.rolled_back {
        println!(
            "  {} Apply failed; changes from this run were rolled back",
            "↺".yellow().bold()
        );
    } else if report.is_success() {
        println!("  {} Stack applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Stack applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.rolled_back > 0 {
        println!("    • {} resources rolled back", summary.rolled_back);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
        for outcome in &report.outcomes {
            if let ApplyResult::Failed { error } = &outcome.result {
                println!("      {} {}: {}", "✗".red(), outcome.resource_id, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{MemoryProvider, Planner, ResourceDecl, ResourceGraph, ResourceKind, Target};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_run_saves_state_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let target = Target::new("local", "eu-west-1");
        let provider = MemoryProvider::new();
        let graph = ResourceGraph::build(vec![
            ResourceDecl::new("GREEN-VPC", ResourceKind::Network)
                .with_attribute("cidr", json!("172.0.0.0/26")),
            ResourceDecl::new("ec2.endpoint", ResourceKind::Endpoint)
                .with_attribute("vpc", json!("${ref:GREEN-VPC}")),
        ])
        .unwrap();

        let mut state = store.load("GREEN-InfraStack", &target).unwrap();
        let plan = Planner::new().plan(&graph, &state);
        let report = run(
            &plan,
            &mut state,
            &store,
            &provider,
            &ExecuteOptions::default(),
            true,
            true,
        )
        .unwrap();
        assert_eq!(report.summary.created, 2);

        let reloaded = store.load("GREEN-InfraStack", &target).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(Planner::new().plan(&graph, &reloaded).is_empty());
    }

    #[test]
    fn test_dry_run_does_not_save() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let target = Target::new("local", "eu-west-1");
        let graph = ResourceGraph::build(vec![
            ResourceDecl::new("GREEN-VPC", ResourceKind::Network)
                .with_attribute("cidr", json!("172.0.0.0/26")),
        ])
        .unwrap();

        let mut state = store.load("GREEN-InfraStack", &target).unwrap();
        let plan = Planner::new().plan(&graph, &state);
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        run(&plan, &mut state, &store, &MemoryProvider::new(), &opts, true, true).unwrap();

        assert!(!store.path_for("GREEN-InfraStack", &target).exists());
    }
}
