//! `${...}` tokens inside attribute strings
//!
//! Three forms are understood:
//! - `${param:NAME}` - operator parameter
//! - `${target:account}` / `${target:region}` - deployment target
//! - `${ref:ID}` / `${ref:ID:OUTPUT}` - another resource's physical id or output

use crate::error::{Error, Result};
use crate::types::Attributes;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]*)\}").unwrap_or_else(|e| panic!("token pattern is invalid: {e}"))
});

/// A parsed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Param(&'a str),
    Target(&'a str),
    Ref(Reference),
}

/// A `${ref:...}` target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Logical id of the referenced resource
    pub resource: String,
    /// Named output; the physical id when absent
    pub output: Option<String>,
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.output {
            Some(output) => write!(f, "{}:{}", self.resource, output),
            None => f.write_str(&self.resource),
        }
    }
}

/// Parse the inside of a `${...}` token
pub fn parse(inner: &str) -> Option<Token<'_>> {
    let (scheme, rest) = inner.split_once(':')?;
    if rest.is_empty() {
        return None;
    }
    match scheme {
        "param" => Some(Token::Param(rest)),
        "target" => Some(Token::Target(rest)),
        "ref" => {
            let (resource, output) = match rest.split_once(':') {
                Some((resource, output)) if !resource.is_empty() && !output.is_empty() => {
                    (resource, Some(output.to_string()))
                }
                _ => (rest, None),
            };
            Some(Token::Ref(Reference {
                resource: resource.to_string(),
                output,
            }))
        }
        _ => None,
    }
}

/// Collect every `${ref:...}` in an attribute map
pub fn references(attributes: &Attributes) -> Vec<Reference> {
    let mut refs = Vec::new();
    for value in attributes.values() {
        collect_refs(value, &mut refs);
    }
    refs
}

fn collect_refs(value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::String(s) => {
            for caps in TOKEN.captures_iter(s) {
                if let Some(Token::Ref(r)) = parse(&caps[1])
                    && !out.contains(&r)
                {
                    out.push(r);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, out)),
        _ => {}
    }
}

/// Rewrite tokens in every string of an attribute map.
///
/// `replace` receives the parsed token and returns `Ok(Some(text))` to
/// substitute it or `Ok(None)` to leave it as written. Tokens that do not
/// parse are reported as [`Error::InvalidToken`].
pub fn rewrite<F>(resource: &str, attributes: &Attributes, mut replace: F) -> Result<Attributes>
where
    F: FnMut(&Token<'_>) -> Result<Option<String>>,
{
    attributes
        .iter()
        .map(|(name, value)| {
            let rewritten = rewrite_value(resource, name, value, &mut replace)?;
            Ok((name.clone(), rewritten))
        })
        .collect()
}

fn rewrite_value<F>(resource: &str, path: &str, value: &Value, replace: &mut F) -> Result<Value>
where
    F: FnMut(&Token<'_>) -> Result<Option<String>>,
{
    match value {
        Value::String(s) => rewrite_string(resource, path, s, replace).map(Value::String),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| rewrite_value(resource, &format!("{path}[{i}]"), v, replace))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let rewritten = rewrite_value(resource, &format!("{path}.{k}"), v, replace)?;
                Ok((k.clone(), rewritten))
            })
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn rewrite_string<F>(resource: &str, path: &str, s: &str, replace: &mut F) -> Result<String>
where
    F: FnMut(&Token<'_>) -> Result<Option<String>>,
{
    if !s.contains("${") {
        return Ok(s.to_string());
    }

    let mut failure = None;
    let out = TOKEN.replace_all(s, |caps: &Captures<'_>| {
        if failure.is_some() {
            return caps[0].to_string();
        }
        let Some(token) = parse(&caps[1]) else {
            failure = Some(Error::InvalidToken {
                resource: resource.to_string(),
                attribute: path.to_string(),
                token: caps[0].to_string(),
            });
            return caps[0].to_string();
        };
        match replace(&token) {
            Ok(Some(text)) => text,
            Ok(None) => caps[0].to_string(),
            Err(e) => {
                failure = Some(e);
                caps[0].to_string()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(out.into_owned()),
    }
}
