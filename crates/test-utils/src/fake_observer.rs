use std::sync::{Arc, Mutex};

use dagwork::errors::TaskError;
use dagwork::observer::Observer;
use dagwork::types::{Phase, TaskClassId, TaskState};

/// What happened to a task, as seen by a [`FakeObserver`]. Carries the
/// phase so a test can tell a run-phase `Completed` apart from a
/// clean-phase one for the same class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Started(TaskClassId, Phase),
    Completed(TaskClassId, Phase),
    Failed(TaskClassId, Phase, String),
    Skipped(TaskClassId, Phase),
    GroupStarted(String, Phase),
    GroupCompleted(String, Phase),
}

/// An observer that records every notification it receives, in arrival
/// order, for assertions. Mirrors the teacher's `FakeExecutor`: record, then
/// let the test inspect the recording afterwards.
#[derive(Default, Clone)]
pub struct FakeObserver {
    events: Arc<Mutex<Vec<ObservedEvent>>>,
    phase_calls: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Every event recorded for `class`, across both phases, in arrival order.
    pub fn events_for(&self, class: &str) -> Vec<ObservedEvent> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                ObservedEvent::Started(c, _)
                | ObservedEvent::Completed(c, _)
                | ObservedEvent::Failed(c, _, _)
                | ObservedEvent::Skipped(c, _) => c.as_ref() == class,
                ObservedEvent::GroupStarted(..) | ObservedEvent::GroupCompleted(..) => false,
            })
            .collect()
    }

    /// Just `class`'s events for one phase, in arrival order.
    pub fn events_for_phase(&self, class: &str, phase: Phase) -> Vec<ObservedEvent> {
        self.events_for(class)
            .into_iter()
            .filter(|e| {
                let event_phase = match e {
                    ObservedEvent::Started(_, p)
                    | ObservedEvent::Completed(_, p)
                    | ObservedEvent::Skipped(_, p)
                    | ObservedEvent::Failed(_, p, _)
                    | ObservedEvent::GroupStarted(_, p)
                    | ObservedEvent::GroupCompleted(_, p) => *p,
                };
                event_phase == phase
            })
            .collect()
    }

    /// The order `on_ready`/`on_start`/`on_stop` were called in, across
    /// every phase this observer has watched.
    pub fn phase_calls(&self) -> Vec<&'static str> {
        self.phase_calls.lock().unwrap().clone()
    }
}

impl Observer for FakeObserver {
    fn on_ready(&self) {
        self.phase_calls.lock().unwrap().push("ready");
    }

    fn on_start(&self) {
        self.phase_calls.lock().unwrap().push("start");
    }

    fn on_stop(&self) {
        self.phase_calls.lock().unwrap().push("stop");
    }

    fn on_task_updated(
        &self,
        class: &TaskClassId,
        _previous: TaskState,
        current: TaskState,
        phase: Phase,
        _timestamp: std::time::Instant,
    ) {
        let event = match current {
            TaskState::Running => ObservedEvent::Started(class.clone(), phase),
            TaskState::Completed => ObservedEvent::Completed(class.clone(), phase),
            TaskState::Skipped => ObservedEvent::Skipped(class.clone(), phase),
            // Failed is recorded by `on_task_error`, which carries the
            // message this signature has no room for.
            TaskState::Failed | TaskState::Pending => return,
        };
        self.events.lock().unwrap().push(event);
    }

    fn on_group_started(&self, _class: &TaskClassId, group: &str, phase: Phase, _timestamp: std::time::Instant) {
        self.events
            .lock()
            .unwrap()
            .push(ObservedEvent::GroupStarted(group.to_string(), phase));
    }

    fn on_group_completed(&self, _class: &TaskClassId, group: &str, phase: Phase, _timestamp: std::time::Instant) {
        self.events
            .lock()
            .unwrap()
            .push(ObservedEvent::GroupCompleted(group.to_string(), phase));
    }

    fn on_task_error(&self, class: &TaskClassId, error: &TaskError, phase: Phase) {
        self.events
            .lock()
            .unwrap()
            .push(ObservedEvent::Failed(class.clone(), phase, error.to_string()));
    }
}
