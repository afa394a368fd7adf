//! Stack loading, operator parameters and the deployment target

use anyhow::{Context, Result};
use declarative::{ResolvedParameters, ResourceGraph, StackDecl, Target, resolve_stack};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// The GREEN control-plane stack, compiled into the binary
pub const BUILTIN_STACK: &str = include_str!("../stacks/green.toml");

/// Bad `-p` argument
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParameterArgError {
    #[error("expected NAME=VALUE, got `{0}`")]
    MissingEquals(String),
    #[error("parameter name is empty in `{0}`")]
    EmptyName(String),
}

/// Parse one `NAME=VALUE` argument. The value may itself contain `=`.
pub fn parse_parameter(arg: &str) -> Result<(String, String), ParameterArgError> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| ParameterArgError::MissingEquals(arg.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParameterArgError::EmptyName(arg.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Parse a stack declaration from TOML
pub fn parse(content: &str, origin: &str) -> Result<StackDecl> {
    toml::from_str(content).with_context(|| format!("Failed to parse stack {origin}"))
}

/// Load the stack at `path`, or the built-in stack
pub fn load(path: Option<&Path>) -> Result<StackDecl> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read stack file: {}", path.display()))?;
            let stack = parse(&content, &path.display().to_string())?;
            log::debug!("Loaded stack {} from {}", stack.name, path.display());
            Ok(stack)
        }
        None => parse(BUILTIN_STACK, "built-in GREEN stack"),
    }
}

/// Deployment target from the process environment
pub fn target_from_env() -> Target {
    Target::from_lookup(|key| std::env::var(key).ok())
}

/// Config parameters overlaid with command-line ones
pub fn merge_parameters(
    config: &BTreeMap<String, String>,
    cli: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut merged = config.clone();
    merged.extend(cli.iter().cloned());
    merged
}

/// A stack with parameters resolved and its graph built
#[derive(Debug)]
pub struct ResolvedStack {
    pub parameters: ResolvedParameters,
    pub graph: ResourceGraph,
}

/// Resolve parameters and build the dependency graph.
///
/// Fails before anything is planned when a required parameter is missing.
pub fn resolve(
    stack: &StackDecl,
    supplied: &BTreeMap<String, String>,
    target: &Target,
) -> Result<ResolvedStack> {
    let (parameters, resources) = resolve_stack(stack, supplied, target)
        .with_context(|| format!("Failed to resolve parameters of {}", stack.name))?;
    let graph = ResourceGraph::build(resources)
        .with_context(|| format!("Invalid resource graph in {}", stack.name))?;
    Ok(ResolvedStack { parameters, graph })
}
