//! Parameter resolution
//!
//! Operator inputs are resolved once, up front. A required parameter with
//! no value fails closed here, before any graph or plan exists.

use crate::error::{Error, Result};
use crate::resource::{ResourceDecl, StackDecl};
use crate::tokens::{self, Token};
use crate::types::Target;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named operator input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDecl {
    #[serde(default)]
    pub description: String,
    /// Used when the operator supplies nothing
    #[serde(default)]
    pub default: Option<String>,
    /// Regex the whole value must match
    #[serde(default)]
    pub allowed_pattern: Option<String>,
}

impl ParameterDecl {
    /// A parameter with no default
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// A parameter with a default value
    pub fn with_default(description: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            default: Some(default.into()),
            allowed_pattern: None,
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Final parameter values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedParameters(BTreeMap<String, String>);

impl ResolvedParameters {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve declared parameters against operator-supplied values
pub fn resolve(
    decls: &BTreeMap<String, ParameterDecl>,
    supplied: &BTreeMap<String, String>,
) -> Result<ResolvedParameters> {
    if let Some(unknown) = supplied.keys().find(|name| !decls.contains_key(*name)) {
        return Err(Error::UnknownParameter(unknown.clone()));
    }

    let mut resolved = BTreeMap::new();
    for (name, decl) in decls {
        let value = match supplied.get(name) {
            Some(v) if v.is_empty() => return Err(Error::MissingParameter(name.clone())),
            Some(v) => v.clone(),
            None => decl
                .default
                .clone()
                .ok_or_else(|| Error::MissingParameter(name.clone()))?,
        };

        // Substituted values are scanned again for refs at apply time.
        if value.contains("${") {
            return Err(Error::InvalidParameter {
                name: name.clone(),
                reason: "values may not contain `${`".to_string(),
            });
        }

        if let Some(pattern) = &decl.allowed_pattern {
            check_pattern(name, pattern, &value)?;
        }

        log::debug!("Parameter {} resolved", name);
        resolved.insert(name.clone(), value);
    }

    Ok(ResolvedParameters(resolved))
}

fn check_pattern(name: &str, pattern: &str, value: &str) -> Result<()> {
    let anchored = format!("^(?:{pattern})$");
    let re = Regex::new(&anchored).map_err(|e| Error::InvalidParameter {
        name: name.to_string(),
        reason: format!("bad allowed_pattern: {e}"),
    })?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(Error::InvalidParameter {
            name: name.to_string(),
            reason: format!("does not match {pattern}"),
        })
    }
}

/// Substitute `${param:..}` and `${target:..}` tokens; `${ref:..}` is kept
pub fn substitute(
    decl: &ResourceDecl,
    params: &ResolvedParameters,
    target: &Target,
) -> Result<ResourceDecl> {
    let attributes = tokens::rewrite(&decl.id, &decl.attributes, |token| match token {
        Token::Param(name) => params
            .get(name)
            .map(|v| Some(v.to_string()))
            .ok_or_else(|| Error::UnknownParameter((*name).to_string())),
        Token::Target(key) => target
            .get(key)
            .map(|v| Some(v.to_string()))
            .ok_or_else(|| Error::InvalidToken {
                resource: decl.id.clone(),
                attribute: "target".to_string(),
                token: format!("${{target:{key}}}"),
            }),
        Token::Ref(_) => Ok(None),
    })?;

    Ok(ResourceDecl {
        attributes,
        ..decl.clone()
    })
}

/// Resolve parameters and substitute them into every resource of a stack
pub fn resolve_stack(
    stack: &StackDecl,
    supplied: &BTreeMap<String, String>,
    target: &Target,
) -> Result<(ResolvedParameters, Vec<ResourceDecl>)> {
    let params = resolve(&stack.parameters, supplied)?;
    let resources = stack
        .resources
        .iter()
        .map(|decl| substitute(decl, &params, target))
        .collect::<Result<Vec<_>>>()?;
    Ok((params, resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;
    use serde_json::json;

    fn flux_params() -> BTreeMap<String, ParameterDecl> {
        let mut decls = BTreeMap::new();
        decls.insert("FluxRepoURL".to_string(), ParameterDecl::required("repo"));
        decls.insert(
            "FluxRepoBranch".to_string(),
            ParameterDecl::with_default("branch", "main"),
        );
        decls
    }

    fn supplied(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_fill_unsupplied_values() {
        let params = resolve(&flux_params(), &supplied(&[("FluxRepoURL", "git@x:y.git")])).unwrap();
        assert_eq!(params.get("FluxRepoBranch"), Some("main"));
        assert_eq!(params.get("FluxRepoURL"), Some("git@x:y.git"));
    }

    #[test]
    fn test_missing_required_parameter_fails_closed() {
        let err = resolve(&flux_params(), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(ref n) if n == "FluxRepoURL"));
    }

    #[test]
    fn test_token_in_value_is_rejected() {
        for value in ["${ref:GREEN-Cluster}", "main-${param:FluxRepoURL}"] {
            let err = resolve(
                &flux_params(),
                &supplied(&[("FluxRepoURL", "git@x:y.git"), ("FluxRepoBranch", value)]),
            )
            .unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "FluxRepoBranch"));
        }
        // A lone `$` or brace is fine.
        assert!(resolve(&flux_params(), &supplied(&[("FluxRepoURL", "git@x:y.git#{$tag}")])).is_ok());
    }

    #[test]
    fn test_empty_value_is_not_substituted() {
        let err = resolve(&flux_params(), &supplied(&[("FluxRepoURL", "")])).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(_)));
    }

    #[test]
    fn test_unknown_supplied_parameter_is_rejected() {
        let err = resolve(
            &flux_params(),
            &supplied(&[("FluxRepoURL", "u"), ("FluxRepoTag", "v1")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownParameter(ref n) if n == "FluxRepoTag"));
    }

    #[test]
    fn test_allowed_pattern_is_anchored() {
        let mut decls = BTreeMap::new();
        decls.insert(
            "Branch".to_string(),
            ParameterDecl {
                allowed_pattern: Some("[a-z]+".into()),
                ..Default::default()
            },
        );
        assert!(resolve(&decls, &supplied(&[("Branch", "main")])).is_ok());
        let err = resolve(&decls, &supplied(&[("Branch", "main-2")])).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_substitute_params_and_target_but_not_refs() {
        let params = resolve(&flux_params(), &supplied(&[("FluxRepoURL", "https://git/x")])).unwrap();
        let target = Target::new("123", "eu-central-1");
        let decl = ResourceDecl::new("FluxV2", ResourceKind::Addon)
            .with_attribute("repo_url", json!("${param:FluxRepoURL}"))
            .with_attribute("branch", json!("${param:FluxRepoBranch}"))
            .with_attribute("region", json!("${target:region}"))
            .with_attribute("cluster", json!("${ref:GREEN-Cluster}"));

        let out = substitute(&decl, &params, &target).unwrap();
        assert_eq!(out.attributes["repo_url"], json!("https://git/x"));
        assert_eq!(out.attributes["branch"], json!("main"));
        assert_eq!(out.attributes["region"], json!("eu-central-1"));
        assert_eq!(out.attributes["cluster"], json!("${ref:GREEN-Cluster}"));
    }

    #[test]
    fn test_substitute_unknown_param_reference() {
        let params = ResolvedParameters::default();
        let decl = ResourceDecl::new("a", ResourceKind::Addon)
            .with_attribute("x", json!("${param:Nope}"));
        let err = substitute(&decl, &params, &Target::new("a", "b")).unwrap_err();
        assert!(matches!(err, Error::UnknownParameter(_)));
    }
}
