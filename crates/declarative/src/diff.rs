//! Attribute-level diffs between last-applied and desired state

use crate::types::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One changed attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    /// Last-applied value; `None` when the attribute is new
    pub from: Option<Value>,
    /// Desired value; `None` when the attribute is dropped
    pub to: Option<Value>,
}

impl AttributeChange {
    pub fn is_addition(&self) -> bool {
        self.from.is_none() && self.to.is_some()
    }

    pub fn is_removal(&self) -> bool {
        self.from.is_some() && self.to.is_none()
    }
}

/// Compare two attribute maps key by key
///
/// Returns changes in key order; unchanged keys are omitted.
pub fn diff_attributes(old: &Attributes, new: &Attributes) -> Vec<AttributeChange> {
    let mut changes = Vec::new();

    for (name, from) in old {
        match new.get(name) {
            Some(to) if to == from => {}
            to => changes.push(AttributeChange {
                name: name.clone(),
                from: Some(from.clone()),
                to: to.cloned(),
            }),
        }
    }

    for (name, to) in new {
        if !old.contains_key(name) {
            changes.push(AttributeChange {
                name: name.clone(),
                from: None,
                to: Some(to.clone()),
            });
        }
    }

    changes.sort_by(|a, b| a.name.cmp(&b.name));
    changes
}

/// Compact single-line rendering of an attribute value
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None => "(none)".to_string(),
        Some(Value::String(s)) => format!("{s:?}"),
        Some(other) => other.to_string(),
    }
}
