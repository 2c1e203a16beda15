// src/observer.rs

//! Observer fan-out. The teacher notifies interested parties of task state
//! changes over an `mpsc::Sender<RuntimeEvent>`; here, since there can be
//! several independent interested parties (progress UI, metrics, tests) and
//! none of them should be able to wedge a run by blocking, we fan out to a
//! list of trait objects instead, each call isolated with `catch_unwind` the
//! same way a task body's `run` is.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::TaskError;
use crate::types::{Phase, TaskClassId, TaskState};

/// Notified of whole-phase lifecycle events and individual task-class state
/// transitions. Implementations must not block for long: they run inline on
/// the executor's core loop, on whichever thread triggered the event.
pub trait Observer: Send + Sync {
    /// The dependency graph for the current phase has been built and the
    /// first ready tasks are about to be dispatched.
    fn on_ready(&self) {}
    /// The phase has started driving task coroutines.
    fn on_start(&self) {}
    /// The phase has drained: nothing ready, nothing in flight.
    fn on_stop(&self) {}

    /// `class` moved from `previous` to `current` in `phase`. Totally
    /// ordered per task class: every run-phase transition for a class
    /// precedes every clean-phase transition for that same class.
    fn on_task_updated(
        &self,
        _class: &TaskClassId,
        _previous: TaskState,
        _current: TaskState,
        _phase: Phase,
        _timestamp: Instant,
    ) {
    }

    /// `class` is the first member of `group` to start in `phase`.
    fn on_group_started(&self, _class: &TaskClassId, _group: &str, _phase: Phase, _timestamp: Instant) {}
    /// `class` is the last member of `group` to reach a terminal state in
    /// `phase`; `group` has nothing left outstanding.
    fn on_group_completed(&self, _class: &TaskClassId, _group: &str, _phase: Phase, _timestamp: Instant) {}

    /// `class` failed in `phase` with `error`. Fired alongside the
    /// `on_task_updated(_, _, Failed, ...)` call for the same transition;
    /// kept separate since §6's `on_task_updated` signature carries no error
    /// payload but observers still need the failure reason to report it.
    fn on_task_error(&self, _class: &TaskClassId, _error: &TaskError, _phase: Phase) {}
}

#[derive(Default, Clone)]
pub struct ObserverList(Vec<Arc<dyn Observer>>);

impl ObserverList {
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        Self(observers)
    }

    pub fn push(&mut self, observer: Arc<dyn Observer>) {
        self.0.push(observer);
    }

    fn for_each(&self, f: impl Fn(&Arc<dyn Observer>)) {
        for obs in &self.0 {
            let obs = obs.clone();
            let _ = std::panic::catch_unwind(AssertUnwindSafe(|| f(&obs)));
        }
    }

    pub fn ready(&self) {
        self.for_each(|obs| obs.on_ready());
    }

    pub fn start(&self) {
        self.for_each(|obs| obs.on_start());
    }

    pub fn stop(&self) {
        self.for_each(|obs| obs.on_stop());
    }

    pub fn task_updated(
        &self,
        class: &TaskClassId,
        previous: TaskState,
        current: TaskState,
        phase: Phase,
        timestamp: Instant,
    ) {
        self.for_each(|obs| obs.on_task_updated(class, previous, current, phase, timestamp));
    }

    pub fn group_started(&self, class: &TaskClassId, group: &str, phase: Phase, timestamp: Instant) {
        self.for_each(|obs| obs.on_group_started(class, group, phase, timestamp));
    }

    pub fn group_completed(&self, class: &TaskClassId, group: &str, phase: Phase, timestamp: Instant) {
        self.for_each(|obs| obs.on_group_completed(class, group, phase, timestamp));
    }

    pub fn task_error(&self, class: &TaskClassId, error: &TaskError, phase: Phase) {
        self.for_each(|obs| obs.on_task_error(class, error, phase));
    }
}
