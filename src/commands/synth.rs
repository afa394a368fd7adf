//! `greenstack synth` - emit the resolved deployment template

use anyhow::{Context as _, Result};
use declarative::{Attributes, ResolvedParameters, ResourceKind, Target};
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::Session;
use crate::Context;
use crate::stack::ResolvedStack;
use crate::ui;

/// The declarative deployment plan handed to a provider
#[derive(Debug, Serialize)]
pub struct Template {
    pub stack: String,
    pub description: String,
    pub target: Target,
    pub parameters: ResolvedParameters,
    /// Resource ids, dependencies first
    pub order: Vec<String>,
    /// Resources that may be applied together
    pub levels: Vec<Vec<String>>,
    pub resources: Vec<TemplateResource>,
}

#[derive(Debug, Serialize)]
pub struct TemplateResource {
    pub id: String,
    pub kind: ResourceKind,
    pub attributes: Attributes,
    pub depends_on: Vec<String>,
    pub fingerprint: String,
}

pub fn synthesize(session: &Session, resolved: &ResolvedStack) -> Template {
    let graph = &resolved.graph;

    Template {
        stack: session.stack.name.clone(),
        description: session.stack.description.clone(),
        target: session.target.clone(),
        parameters: resolved.parameters.clone(),
        order: graph
            .topological_order()
            .into_iter()
            .map(|d| d.id.clone())
            .collect(),
        levels: graph
            .levels()
            .into_iter()
            .map(|level| level.into_iter().map(|d| d.id.clone()).collect())
            .collect(),
        resources: graph
            .topological_order()
            .into_iter()
            .map(|decl| TemplateResource {
                id: decl.id.clone(),
                kind: decl.kind,
                attributes: decl.attributes.clone(),
                depends_on: graph
                    .dependencies(&decl.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                fingerprint: decl.fingerprint(),
            })
            .collect(),
    }
}

pub fn run(ctx: &Context, out: Option<&Path>) -> Result<()> {
    let session = Session::open(ctx)?;
    let resolved = session.resolve()?;
    let template = synthesize(&session, &resolved);
    let json = serde_json::to_string_pretty(&template).context("Failed to serialize template")?;

    match out {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write template: {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Synthesized {} ({} resources) to {}",
                    template.stack,
                    template.resources.len(),
                    path.display()
                ));
            }
        }
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{green_context, session};

    #[test]
    fn test_synthesize_green_stack() {
        let (_dir, session) = session(&green_context());
        let resolved = session.resolve().unwrap();
        let template = synthesize(&session, &resolved);

        assert_eq!(template.stack, "GREEN-InfraStack");
        assert_eq!(template.resources.len(), 11);
        assert_eq!(template.order[0], "GREEN-VPC");
        assert_eq!(template.levels[0], vec!["GREEN-VPC", "GREEN-ClusterRole", "GREEN-WorkerRole"]);

        let ng = template
            .resources
            .iter()
            .find(|r| r.id == "GREEN-WorkerNodeGroup")
            .unwrap();
        assert_eq!(ng.depends_on, vec!["GREEN-Cluster", "GREEN-WorkerRole"]);
        // References stay symbolic until apply
        assert_eq!(ng.attributes["cluster"], "${ref:GREEN-Cluster}");

        let json = serde_json::to_value(&template).unwrap();
        assert_eq!(json["target"]["region"], "eu-west-1");
        assert_eq!(json["parameters"]["FluxRepoBranch"], "main");
    }
}
