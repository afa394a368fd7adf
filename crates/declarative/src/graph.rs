//! Resource dependency graph
//!
//! Edges point from a resource to the resources it depends on. Building the
//! graph validates it: every referenced id must be declared, ids must be
//! unique, and the graph must be acyclic.

use crate::error::{Error, Result};
use crate::resource::ResourceDecl;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;

/// A validated, acyclic graph of resource declarations
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    nodes: Vec<ResourceDecl>,
    index: HashMap<String, usize>,
    /// `deps[i]`: indices node `i` depends on
    deps: Vec<Vec<usize>>,
    /// `dependents[i]`: indices that depend on node `i`
    dependents: Vec<Vec<usize>>,
    /// Topological order, dependencies first
    order: Vec<usize>,
}

impl ResourceGraph {
    /// Build and validate a graph from declarations
    pub fn build(decls: Vec<ResourceDecl>) -> Result<Self> {
        let mut index = HashMap::with_capacity(decls.len());
        for (i, decl) in decls.iter().enumerate() {
            if index.insert(decl.id.clone(), i).is_some() {
                return Err(Error::DuplicateResource(decl.id.clone()));
            }
        }

        let mut deps = vec![Vec::new(); decls.len()];
        let mut dependents = vec![Vec::new(); decls.len()];
        for (i, decl) in decls.iter().enumerate() {
            for dep in decl.dependency_ids() {
                let Some(&j) = index.get(&dep) else {
                    return Err(Error::DanglingReference {
                        from: decl.id.clone(),
                        to: dep,
                    });
                };
                if j == i {
                    return Err(Error::CycleDetected(vec![dep.clone(), dep]));
                }
                deps[i].push(j);
                dependents[j].push(i);
            }
        }

        let mut graph = Self {
            nodes: decls,
            index,
            deps,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.sort()?;
        log::debug!("Built resource graph with {} resources", graph.len());
        Ok(graph)
    }

    /// Kahn's algorithm; ready nodes are taken in declaration order
    fn sort(&self) -> Result<Vec<usize>> {
        let mut pending: Vec<usize> = self.deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| pending[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &self.dependents[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            Err(Error::CycleDetected(self.find_cycle(&pending)))
        }
    }

    /// Walk dependency edges among unsorted nodes until one repeats
    fn find_cycle(&self, pending: &[usize]) -> Vec<String> {
        let Some(start) = (0..self.nodes.len()).find(|&i| pending[i] > 0) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            // Every unsorted node has at least one unsorted dependency.
            let Some(&next) = self.deps[current].iter().find(|&&d| pending[d] > 0) else {
                return path.iter().map(|&i| self.nodes[i].id.clone()).collect();
            };
            if let Some(pos) = path.iter().position(|&i| i == next) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|&i| self.nodes[i].id.clone()).collect();
                cycle.push(self.nodes[next].id.clone());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDecl> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Declarations in the order they were written
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDecl> {
        self.nodes.iter()
    }

    /// Declarations with every dependency before its dependents
    pub fn topological_order(&self) -> Vec<&ResourceDecl> {
        self.order.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Position of a resource in the topological order
    pub fn position(&self, id: &str) -> Option<usize> {
        let i = *self.index.get(id)?;
        self.order.iter().position(|&o| o == i)
    }

    /// Groups whose dependencies all lie in earlier groups
    pub fn levels(&self) -> Vec<Vec<&ResourceDecl>> {
        let mut level = vec![0usize; self.nodes.len()];
        let mut levels: Vec<Vec<&ResourceDecl>> = Vec::new();
        for &i in &self.order {
            level[i] = self.deps[i]
                .iter()
                .map(|&d| level[d] + 1)
                .max()
                .unwrap_or(0);
            if levels.len() <= level[i] {
                levels.resize_with(level[i] + 1, Vec::new);
            }
            levels[level[i]].push(&self.nodes[i]);
        }
        levels
    }

    /// Direct dependencies of a resource
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| self.deps[i].iter().map(|&d| self.nodes[d].id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Resources that directly depend on `id`
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.nodes[d].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Graphviz rendering, edges pointing at dependencies
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{name}\" {{");
        let _ = writeln!(out, "  rankdir=BT;");
        for &i in &self.order {
            let node = &self.nodes[i];
            let _ = writeln!(out, "  \"{}\" [label=\"{}\\n({})\"];", node.id, node.id, node.kind);
        }
        for &i in &self.order {
            for &d in &self.deps[i] {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", self.nodes[i].id, self.nodes[d].id);
            }
        }
        out.push_str("}\n");
        out
    }
}
