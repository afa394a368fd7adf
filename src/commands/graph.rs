//! `greenstack graph` - dependency levels or Graphviz DOT

use anyhow::Result;
use colored::Colorize;
use declarative::ResourceGraph;

use super::Session;
use crate::Context;
use crate::ui;

/// Levels as printable lines: `Level N: id (kind) <- deps`
pub fn level_lines(graph: &ResourceGraph) -> Vec<String> {
    let mut lines = Vec::new();
    for (n, level) in graph.levels().into_iter().enumerate() {
        lines.push(format!("Level {n}"));
        for decl in level {
            let deps = graph.dependencies(&decl.id);
            if deps.is_empty() {
                lines.push(format!("  {} ({})", decl.id, decl.kind));
            } else {
                lines.push(format!("  {} ({}) <- {}", decl.id, decl.kind, deps.join(", ")));
            }
        }
    }
    lines
}

pub fn run(ctx: &Context, dot: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    // Parameters are not needed to know who depends on whom
    let graph = ResourceGraph::build(session.stack.resources.clone())?;

    if dot {
        print!("{}", graph.to_dot(&session.stack.name));
        return Ok(());
    }

    ui::header(&format!("{} Graph", session.stack.name));
    for line in level_lines(&graph) {
        if line.starts_with("Level") {
            println!("  {}", line.bold());
        } else {
            println!("  {line}");
        }
    }
    println!();
    Ok(())
}
