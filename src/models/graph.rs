//! Graph algorithms for record dependency analysis.
//!
//! Records are stored flat and point at each other by id only, so the
//! storage layer can never form a cycle on its own. The *logical* graph
//! formed by `dependencies` (and separately by `parent_id`) still has to
//! be validated before a write: this module builds the edge set and runs
//! a depth-first cycle check that tracks the recursion stack.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{Record, RecordRef, Status};
use crate::{Error, Result};

/// Directed graph keyed by qualified record reference (`task:0001`).
///
/// An edge `a -> b` means "a depends on b".
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the dependency graph of a set of records.
    pub fn from_records<'a, I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut graph = Self::new();
        for record in records {
            let deps = record
                .dependency_refs()?
                .into_iter()
                .map(|r| r.qualified());
            graph.set_edges(record.reference().qualified(), deps);
        }
        Ok(graph)
    }

    /// Build the parent graph (child -> parent) of a set of records.
    pub fn parents_of<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut graph = Self::new();
        for record in records {
            let node = record.reference().qualified();
            let parent = record
                .parent_id
                .as_ref()
                .map(|p| RecordRef::new(record.collection(), p.clone()).qualified());
            graph.set_edges(node, parent);
        }
        graph
    }

    /// Replace the outgoing edges of `node`.
    pub fn set_edges<I>(&mut self, node: String, deps: I)
    where
        I: IntoIterator<Item = String>,
    {
        let deps: BTreeSet<String> = deps.into_iter().collect();
        for dep in &deps {
            self.edges.entry(dep.clone()).or_default();
        }
        self.edges.insert(node, deps);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.edges.contains_key(node)
    }

    /// What `node` depends on.
    pub fn dependencies(&self, node: &str) -> Vec<String> {
        self.edges
            .get(node)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// What depends on `node`.
    pub fn dependents(&self, node: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(node))
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Find one cycle, returned as a closed path (`a -> b -> c -> a`).
    ///
    /// Nodes are visited in sorted order so the reported path is stable.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for node in self.edges.keys() {
            if done.contains(node.as_str()) {
                continue;
            }
            if let Some(path) = self.visit(node, &mut stack, &mut done) {
                return Some(path);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut path: Vec<String> = stack[pos..].iter().map(|n| n.to_string()).collect();
            path.push(node.to_string());
            return Some(path);
        }
        if done.contains(node) {
            return None;
        }

        stack.push(node);
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if let Some(path) = self.visit(dep, stack, done) {
                    return Some(path);
                }
            }
        }
        stack.pop();
        done.insert(node);
        None
    }

    /// Reject the graph with `CyclicDependency` if it contains a cycle.
    pub fn ensure_acyclic(&self) -> Result<()> {
        match self.find_cycle() {
            Some(path) => Err(Error::CyclicDependency { path }),
            None => Ok(()),
        }
    }
}

/// Advisory readiness of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// True iff every dependency is `completed`
    pub ready: bool,
    /// Dependencies that are not completed (or do not resolve)
    pub waiting_on: Vec<RecordRef>,
}

/// Compute readiness given a status lookup for referenced records.
///
/// A dependency that cannot be resolved counts as not completed.
pub fn readiness<F>(record: &Record, status_of: F) -> Result<Readiness>
where
    F: Fn(&RecordRef) -> Option<Status>,
{
    let waiting_on: Vec<RecordRef> = record
        .dependency_refs()?
        .into_iter()
        .filter(|dep| status_of(dep) != Some(Status::Completed))
        .collect();
    Ok(Readiness {
        ready: waiting_on.is_empty(),
        waiting_on,
    })
}
