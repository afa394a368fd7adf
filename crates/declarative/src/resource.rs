//! Resource and stack declarations
//!
//! A [`ResourceDecl`] states the desired attributes of one resource and
//! which other resources it needs. A [`StackDecl`] bundles the resources
//! together with the parameters an operator supplies at deploy time.
//!
//! # Example
//!
//! ```
//! use declarative::{ResourceDecl, ResourceKind};
//! use serde_json::json;
//!
//! let role = ResourceDecl::new("GREEN-WorkerRole", ResourceKind::Role)
//!     .with_attribute("assumed_by", json!("ec2.amazonaws.com"));
//! let nodes = ResourceDecl::new("GREEN-WorkerNodeGroup", ResourceKind::NodeGroup)
//!     .with_attribute("node_role", json!("${ref:GREEN-WorkerRole}"));
//!
//! assert_eq!(nodes.dependency_ids(), vec!["GREEN-WorkerRole".to_string()]);
//! assert_ne!(role.fingerprint(), nodes.fingerprint());
//! ```

use crate::params::ParameterDecl;
use crate::tokens::{self, Reference};
use crate::types::{Attributes, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Logical id, unique within a stack
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub attributes: Attributes,
    /// Dependencies not expressed through `${ref:...}` tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ResourceDecl {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            attributes: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    /// Set an attribute
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Add an explicit dependency
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    /// All `${ref:...}` tokens in the attributes
    pub fn references(&self) -> Vec<Reference> {
        tokens::references(&self.attributes)
    }

    /// Ids this resource depends on, explicit ones first, without duplicates
    pub fn dependency_ids(&self) -> Vec<String> {
        let mut ids = self.depends_on.clone();
        for reference in self.references() {
            if !ids.contains(&reference.resource) {
                ids.push(reference.resource);
            }
        }
        ids
    }

    /// blake3 hash of kind and attributes.
    ///
    /// Attribute maps are sorted, so equal declarations hash equally
    /// regardless of the order they were written in.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(&[0]);
        // Serializing a BTreeMap of JSON values cannot fail.
        let canonical = serde_json::to_vec(&self.attributes).unwrap_or_default();
        hasher.update(&canonical);
        let mut deps = self.depends_on.clone();
        deps.sort();
        for dep in deps {
            hasher.update(&[0]);
            hasher.update(dep.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// A named set of resource declarations plus operator parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackDecl {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterDecl>,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

impl StackDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a resource declaration
    pub fn add(&mut self, resource: ResourceDecl) -> &mut Self {
        self.resources.push(resource);
        self
    }

    /// Find a declaration by id
    pub fn find(&self, id: &str) -> Option<&ResourceDecl> {
        self.resources.iter().find(|r| r.id == id)
    }
}
