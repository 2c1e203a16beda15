// src/dag/scheduler.rs

//! `Scheduler` holds the dependency graph plus per-phase bookkeeping: which
//! tasks are ready, in flight, done, or skipped. It never runs anything
//! itself and never touches the task instances; it only answers "what can
//! run now" and "what just became unreachable".

use std::collections::HashMap;

use tracing::{debug, info};

use crate::dag::graph::DepGraph;
use crate::errors::CircularDependencyError;
use crate::provider::DependencyProvider;
use crate::types::TaskClassId;

/// Bookkeeping state for one task class within one phase (run or clean).
///
/// `Failed` is tracked distinctly from `Completed` even though the
/// distilled model only names four buckets, purely so `deps_satisfied`
/// can tell a successful dependency from a failed one; observably a failed
/// task never satisfies a dependent either way, since `cascade_skip_from`
/// converts every reachable `Pending` dependent straight to `Skipped`
/// before the ready-computation would otherwise run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedState {
    Pending,
    Enqueued,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    graph: DepGraph,
    states: HashMap<TaskClassId, TaskSchedState>,
    /// Clean-phase bookkeeping, keyed the same way but walked in reverse:
    /// a task's clean "dependencies" are its forward-graph *dependents*,
    /// since resources are released bottom-up.
    clean_states: HashMap<TaskClassId, TaskSchedState>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn state_of(&self, class: &str) -> Option<TaskSchedState> {
        self.states.get(class).copied()
    }

    /// Close the dependency graph from `root`, checking for cycles, and
    /// register every newly discovered node as `Pending`.
    pub fn build_dependency_graph(
        &mut self,
        root: &TaskClassId,
        provider: &dyn DependencyProvider,
    ) -> Result<(), CircularDependencyError> {
        let added = self.graph.extend_closure(root, provider);
        self.graph.check_acyclic(root)?;
        for class in added {
            self.states.entry(class).or_insert(TaskSchedState::Pending);
        }
        Ok(())
    }

    /// Merge a dependency edge discovered at runtime (i.e. not declared up
    /// front through the [`DependencyProvider`]), extending the closure from
    /// `dep` if it's a node we haven't seen yet.
    ///
    /// The closure is extended from `dep` *before* the `class -> dep` edge
    /// is added: `add_edge` inserts `dep` into the graph as a side effect,
    /// so deciding "is `dep` new" after adding the edge would always say no
    /// and `dep`'s own dependencies would never be explored.
    pub fn merge_runtime_dependency(
        &mut self,
        class: &TaskClassId,
        dep: &TaskClassId,
        provider: &dyn DependencyProvider,
    ) -> Result<Vec<TaskClassId>, CircularDependencyError> {
        let added = self.graph.extend_closure(dep, provider);
        self.graph.add_edge(class, dep);
        self.graph.check_acyclic(class)?;
        for c in &added {
            self.states.entry(c.clone()).or_insert(TaskSchedState::Pending);
        }
        Ok(added)
    }

    fn deps_satisfied(&self, class: &str) -> bool {
        self.graph
            .dependencies_of(class)
            .iter()
            .all(|dep| matches!(self.states.get(dep), Some(TaskSchedState::Completed)))
    }

    /// Every `Pending` task whose declared dependencies are all `Completed`
    /// (this includes tasks with no dependencies at all).
    pub fn next_ready_tasks(&self) -> Vec<TaskClassId> {
        self.states
            .iter()
            .filter(|(class, state)| {
                **state == TaskSchedState::Pending && self.deps_satisfied(class)
            })
            .map(|(class, _)| class.clone())
            .collect()
    }

    pub fn mark_enqueued(&mut self, class: &TaskClassId) {
        self.states.insert(class.clone(), TaskSchedState::Enqueued);
    }

    pub fn mark_completed(&mut self, class: &TaskClassId) {
        debug!(task = %class, "scheduler: task completed");
        self.states.insert(class.clone(), TaskSchedState::Completed);
    }

    /// Mark `class` failed and cascade-skip every `Pending` task transitively
    /// depending on it. Returns the set of newly-skipped dependents (not
    /// including `class` itself).
    pub fn mark_failed(&mut self, class: &TaskClassId) -> Vec<TaskClassId> {
        self.states.insert(class.clone(), TaskSchedState::Failed);
        self.cascade_skip_from(class)
    }

    fn cascade_skip_from(&mut self, failed: &TaskClassId) -> Vec<TaskClassId> {
        let mut newly_skipped = Vec::new();
        let mut stack: Vec<TaskClassId> = self.graph.dependents_of(failed).iter().cloned().collect();

        while let Some(class) = stack.pop() {
            if self.states.get(&class).copied() == Some(TaskSchedState::Pending) {
                self.states.insert(class.clone(), TaskSchedState::Skipped);
                info!(task = %class, "scheduler: cascade-skipped due to upstream failure");
                newly_skipped.push(class.clone());
                stack.extend(self.graph.dependents_of(&class).iter().cloned());
            }
        }

        newly_skipped
    }

    /// Whether any task is currently `Enqueued` (dispatched, not yet done).
    pub fn running_tasks(&self) -> bool {
        self.states.values().any(|s| *s == TaskSchedState::Enqueued)
    }

    /// Convert every remaining `Pending` task to `Skipped`. Called once a
    /// phase's ready/in-flight sets are both empty: anything still `Pending`
    /// at that point was never reached, because nothing ever requested it
    /// and it never became ready on its own.
    pub fn mark_unreached_as_skipped(&mut self) -> Vec<TaskClassId> {
        let mut newly = Vec::new();
        for (class, state) in self.states.iter_mut() {
            if *state == TaskSchedState::Pending {
                *state = TaskSchedState::Skipped;
                newly.push(class.clone());
            }
        }
        newly
    }

    /// A read-only snapshot for diagnostics: (class, state, declared deps).
    pub fn describe(&self) -> Vec<(TaskClassId, TaskSchedState, Vec<TaskClassId>)> {
        self.states
            .iter()
            .map(|(class, state)| {
                let deps = self.graph.dependencies_of(class).iter().cloned().collect();
                (class.clone(), *state, deps)
            })
            .collect()
    }

    pub fn task_classes(&self) -> impl Iterator<Item = &TaskClassId> {
        self.states.keys()
    }

    // --- clean phase ---------------------------------------------------
    //
    // Mirrors the run phase but walks the reverse graph: a task is ready to
    // clean once every task that depends on it has finished cleaning (or it
    // has no dependents). "Finished" here means any terminal clean state,
    // not specifically success: clean is best-effort release, so a failed
    // dependent clean must not block its dependencies from also cleaning up.

    /// Seed the clean-phase bookkeeping with exactly the tasks eligible for
    /// cleanup (run-phase `Completed` or `Failed`; `Skipped` tasks never ran
    /// and have nothing to release).
    pub fn seed_clean(&mut self, cleanable: impl IntoIterator<Item = TaskClassId>) {
        for class in cleanable {
            self.clean_states.entry(class).or_insert(TaskSchedState::Pending);
        }
    }

    fn clean_deps_satisfied(&self, class: &str) -> bool {
        self.graph.dependents_of(class).iter().all(|dependent| {
            match self.clean_states.get(dependent) {
                None => true, // dependent was never cleanable (e.g. it was skipped)
                Some(state) => matches!(
                    state,
                    TaskSchedState::Completed | TaskSchedState::Failed | TaskSchedState::Skipped
                ),
            }
        })
    }

    pub fn next_ready_clean_tasks(&self) -> Vec<TaskClassId> {
        self.clean_states
            .iter()
            .filter(|(class, state)| {
                **state == TaskSchedState::Pending && self.clean_deps_satisfied(class)
            })
            .map(|(class, _)| class.clone())
            .collect()
    }

    pub fn mark_clean_enqueued(&mut self, class: &TaskClassId) {
        self.clean_states.insert(class.clone(), TaskSchedState::Enqueued);
    }

    pub fn mark_clean_completed(&mut self, class: &TaskClassId) {
        self.clean_states.insert(class.clone(), TaskSchedState::Completed);
    }

    pub fn mark_clean_failed(&mut self, class: &TaskClassId) {
        self.clean_states.insert(class.clone(), TaskSchedState::Failed);
    }

    pub fn clean_running_tasks(&self) -> bool {
        self.clean_states.values().any(|s| *s == TaskSchedState::Enqueued)
    }

    pub fn clean_state_of(&self, class: &str) -> Option<TaskSchedState> {
        self.clean_states.get(class).copied()
    }
}
