// src/dag/graph.rs

//! Forward/reverse adjacency for the task-class dependency DAG.
//!
//! Kept as a plain `HashMap` of adjacency sets rather than a `petgraph`
//! graph proper: node weights here are `TaskClassId` (`Arc<str>`), which
//! isn't `Copy`, so `petgraph::graphmap::DiGraphMap` (which requires `Copy`
//! node weights) doesn't fit as the primary storage. `petgraph` is still
//! used for the one-off acyclicity check, scoped to borrowed `&str`s.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::CircularDependencyError;
use crate::provider::DependencyProvider;
use crate::types::TaskClassId;

#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    /// class -> things class depends on
    deps: HashMap<TaskClassId, HashSet<TaskClassId>>,
    /// class -> things that depend on class
    dependents: HashMap<TaskClassId, HashSet<TaskClassId>>,
}

fn empty_set() -> &'static HashSet<TaskClassId> {
    use std::sync::OnceLock;
    static EMPTY: OnceLock<HashSet<TaskClassId>> = OnceLock::new();
    EMPTY.get_or_init(HashSet::new)
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskClassId> {
        self.deps.keys()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.deps.contains_key(class)
    }

    pub fn dependencies_of(&self, class: &str) -> &HashSet<TaskClassId> {
        self.deps.get(class).unwrap_or_else(|| empty_set())
    }

    pub fn dependents_of(&self, class: &str) -> &HashSet<TaskClassId> {
        self.dependents.get(class).unwrap_or_else(|| empty_set())
    }

    fn ensure_node(&mut self, class: &TaskClassId) {
        self.deps.entry(class.clone()).or_default();
        self.dependents.entry(class.clone()).or_default();
    }

    /// Add an edge meaning `from` depends on `to`.
    pub fn add_edge(&mut self, from: &TaskClassId, to: &TaskClassId) {
        self.ensure_node(from);
        self.ensure_node(to);
        self.deps.get_mut(from).unwrap().insert(to.clone());
        self.dependents.get_mut(to).unwrap().insert(from.clone());
    }

    /// Walk `provider` starting at `root`, adding every node and edge not
    /// already present. Returns the classes newly added by this call (in no
    /// particular order). Safe to call repeatedly as new roots are
    /// discovered (declared or runtime) — already-present nodes are skipped.
    ///
    /// `add_edge` inserts both endpoints into `self.deps` as a side effect,
    /// so "already explored" can't be decided by checking `self.deps`
    /// *after* an edge touching that node has been added — by then every
    /// node is always present. Each dependency's novelty is therefore
    /// decided before the edge to it is added, not after.
    pub fn extend_closure(
        &mut self,
        root: &TaskClassId,
        provider: &dyn DependencyProvider,
    ) -> Vec<TaskClassId> {
        let mut added = Vec::new();
        let mut stack = Vec::new();

        if !self.deps.contains_key(root) {
            self.ensure_node(root);
            added.push(root.clone());
            stack.push(root.clone());
        }

        while let Some(class) = stack.pop() {
            for dep in provider.declared_dependencies(&class) {
                let dep_is_new = !self.deps.contains_key(&dep);
                self.add_edge(&class, &dep);
                if dep_is_new {
                    added.push(dep.clone());
                    stack.push(dep);
                }
            }
        }

        added
    }

    /// Verify the graph built so far has no cycles.
    pub fn check_acyclic(&self, root: &TaskClassId) -> Result<(), CircularDependencyError> {
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        for node in self.deps.keys() {
            g.add_node(node.as_ref());
        }
        for (from, tos) in &self.deps {
            for to in tos {
                g.add_edge(from.as_ref(), to.as_ref(), ());
            }
        }
        match toposort(&g, None) {
            Ok(_) => Ok(()),
            Err(_) => Err(CircularDependencyError { root: root.clone() }),
        }
    }
}
