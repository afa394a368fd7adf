//! Plan display

use colored::Colorize;
use declarative::{ActionKind, AttributeChange, Plan, PlannedAction, render_value};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// One rendered line of an attribute change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Added(String),
    Removed(String),
    Changed(String),
}

/// Render a change as display lines.
///
/// Scalars render as `name: old → new`; lists and tables that exist on
/// both sides render as a line diff of their pretty JSON.
pub fn change_lines(change: &AttributeChange) -> Vec<DiffLine> {
    match (&change.from, &change.to) {
        (None, to) => vec![DiffLine::Added(format!(
            "{} = {}",
            change.name,
            render_value(to.as_ref())
        ))],
        (from, None) => vec![DiffLine::Removed(format!(
            "{} = {}",
            change.name,
            render_value(from.as_ref())
        ))],
        (Some(from), Some(to)) if is_composite(from) || is_composite(to) => {
            let old = pretty(from);
            let new = pretty(to);
            let mut lines = vec![DiffLine::Changed(format!("{}:", change.name))];
            for line in TextDiff::from_lines(&old, &new).iter_all_changes() {
                let text = line.to_string_lossy().trim_end().to_string();
                match line.tag() {
                    ChangeTag::Delete => lines.push(DiffLine::Removed(text)),
                    ChangeTag::Insert => lines.push(DiffLine::Added(text)),
                    ChangeTag::Equal => {}
                }
            }
            lines
        }
        (Some(from), Some(to)) => vec![DiffLine::Changed(format!(
            "{}: {} → {}",
            change.name,
            render_value(Some(from)),
            render_value(Some(to))
        ))],
    }
}

fn is_composite(value: &Value) -> bool {
    value.is_array() || value.is_object()
}

fn pretty(value: &Value) -> String {
    let mut s = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    s.push('\n');
    s
}

fn action_symbol(kind: ActionKind) -> colored::ColoredString {
    match kind {
        ActionKind::Create => kind.symbol().green(),
        ActionKind::Update => kind.symbol().yellow(),
        ActionKind::Replace => kind.symbol().magenta(),
        ActionKind::Delete => kind.symbol().red(),
    }
}

fn display_action(action: &PlannedAction, verbose: bool) {
    let note = match action.action {
        ActionKind::Replace => format!(
            " (kind {} → {}, will be recreated)",
            action.previous.as_ref().map_or("?", |p| p.kind.as_str()),
            action.kind
        ),
        ActionKind::Delete => " (no longer declared)".to_string(),
        _ => String::new(),
    };

    println!(
        "│   {} {:<28} {}{}",
        action_symbol(action.action),
        action.resource_id,
        action.kind.to_string().dimmed(),
        note.dimmed()
    );

    // Full attribute listings for creates and deletes only with -v
    if !verbose && matches!(action.action, ActionKind::Create | ActionKind::Delete) {
        return;
    }

    for change in &action.changes {
        for line in change_lines(change) {
            match line {
                DiffLine::Added(text) => println!("│       {}", format!("+ {text}").green()),
                DiffLine::Removed(text) => println!("│       {}", format!("- {text}").red()),
                DiffLine::Changed(text) => println!("│       {}", format!("~ {text}").yellow()),
            }
        }
    }
}

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &Plan, verbose: bool) {
    if plan.is_empty() {
        println!();
        println!(
            "  {} No changes needed ({} resources up to date)",
            "✓".green(),
            plan.unchanged.len()
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        format!("Plan: {}", plan.stack).bold()
    );
    println!("│");

    for action in &plan.actions {
        display_action(action, verbose);
    }

    let summary = plan.summary();
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to replace, {} to delete, {} unchanged",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.replaces.to_string().magenta(),
        summary.deletes.to_string().red(),
        summary.unchanged
    );
    println!("└─────────────────────────────────────────────────────┘");
}
