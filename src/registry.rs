// src/registry.rs

//! `TaskWrapper` and `Registry`: per-task state and the single choke-point
//! through which a task class is looked up and, the first time it wins the
//! race to run, instantiated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::errors::TaskError;
use crate::task_api::{TaskDefinition, TaskInstance};
use crate::types::{ExportValue, TaskClassId, TaskState, Timing};

struct PhaseRecord {
    state: TaskState,
    timing: Timing,
    exports: HashMap<String, ExportValue>,
    error: Option<TaskError>,
}

impl PhaseRecord {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
            timing: Timing::default(),
            exports: HashMap::new(),
            error: None,
        }
    }
}

/// Per-task-class record: run-phase state, clean-phase state, and the lazily
/// created instance shared across both.
pub struct TaskWrapper {
    class: TaskClassId,
    run: Mutex<PhaseRecord>,
    clean: Mutex<PhaseRecord>,
    instance: Mutex<Option<Box<dyn TaskInstance>>>,
}

impl TaskWrapper {
    fn new(class: TaskClassId) -> Self {
        Self {
            class,
            run: Mutex::new(PhaseRecord::new()),
            clean: Mutex::new(PhaseRecord::new()),
            instance: Mutex::new(None),
        }
    }

    pub fn class(&self) -> &TaskClassId {
        &self.class
    }

    /// Attempt to transition `Pending -> Running` for the run phase. Returns
    /// `true` exactly once across the lifetime of this wrapper: the winner
    /// is solely responsible for actually invoking `run`.
    pub fn mark_running(&self) -> bool {
        let mut rec = self.run.lock().unwrap();
        if rec.state == TaskState::Pending {
            rec.state = TaskState::Running;
            rec.timing.started_at = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn mark_completed(&self, exports: HashMap<String, ExportValue>) {
        let mut rec = self.run.lock().unwrap();
        rec.state = TaskState::Completed;
        rec.exports = exports;
        rec.timing.ended_at = Some(Instant::now());
    }

    pub fn mark_failed(&self, error: TaskError) {
        let mut rec = self.run.lock().unwrap();
        rec.state = TaskState::Failed;
        rec.error = Some(error);
        rec.timing.ended_at = Some(Instant::now());
    }

    pub fn mark_skipped(&self) -> bool {
        let mut rec = self.run.lock().unwrap();
        if rec.state == TaskState::Pending {
            rec.state = TaskState::Skipped;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> TaskState {
        self.run.lock().unwrap().state
    }

    pub fn timing(&self) -> Timing {
        self.run.lock().unwrap().timing
    }

    pub fn error(&self) -> Option<TaskError> {
        self.run.lock().unwrap().error.clone()
    }

    pub fn get_export(&self, name: &str) -> Result<ExportValue, TaskError> {
        let rec = self.run.lock().unwrap();
        match rec.state {
            TaskState::Completed => rec
                .exports
                .get(name)
                .cloned()
                .ok_or_else(|| TaskError::NoSuchExport(self.class.clone(), name.to_string())),
            TaskState::Failed => Err(rec.error.clone().expect("failed state always carries an error")),
            TaskState::Skipped => Err(TaskError::Skipped(self.class.clone())),
            TaskState::Pending | TaskState::Running => {
                Err(TaskError::NotReady(self.class.clone()))
            }
        }
    }

    // --- clean phase mirrors the run phase exactly -------------------------

    pub fn mark_clean_running(&self) -> bool {
        let mut rec = self.clean.lock().unwrap();
        if rec.state == TaskState::Pending {
            rec.state = TaskState::Running;
            rec.timing.started_at = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn mark_clean_completed(&self) {
        let mut rec = self.clean.lock().unwrap();
        rec.state = TaskState::Completed;
        rec.timing.ended_at = Some(Instant::now());
    }

    pub fn mark_clean_failed(&self, error: TaskError) {
        let mut rec = self.clean.lock().unwrap();
        rec.state = TaskState::Failed;
        rec.error = Some(error);
        rec.timing.ended_at = Some(Instant::now());
    }

    pub fn clean_state(&self) -> TaskState {
        self.clean.lock().unwrap().state
    }

    /// Hand exclusive ownership of this task's instance to the caller, which
    /// is solely responsible for it until it calls [`TaskWrapper::return_instance`].
    /// Ownership (rather than a guard held across `.await`) is deliberate: the
    /// winning coroutine awaits `TaskInstance::run` for an unbounded time, and
    /// nothing else ever touches the instance concurrently, so there is no
    /// reason to hold a lock for that whole span.
    pub(crate) fn take_instance(&self) -> Box<dyn TaskInstance> {
        self.instance
            .lock()
            .unwrap()
            .take()
            .expect("task instance requested before it was created")
    }

    pub(crate) fn return_instance(&self, instance: Box<dyn TaskInstance>) {
        *self.instance.lock().unwrap() = Some(instance);
    }
}

/// The single choke-point for task-class lookup and lazy instantiation.
pub struct Registry {
    definitions: HashMap<TaskClassId, Arc<dyn TaskDefinition>>,
    wrappers: Mutex<HashMap<TaskClassId, Arc<TaskWrapper>>>,
}

/// Outcome of attempting to start a task class.
pub enum StartOutcome {
    /// This caller won the race; it now owns the lazily-created instance and
    /// is responsible for running it to completion (and returning it via
    /// [`TaskWrapper::return_instance`] afterwards).
    Won {
        wrapper: Arc<TaskWrapper>,
        instance: Box<dyn TaskInstance>,
    },
    /// Someone else already won; this caller should not invoke `run` again.
    Lost(Arc<TaskWrapper>),
}

impl Registry {
    pub fn new(definitions: HashMap<TaskClassId, Arc<dyn TaskDefinition>>) -> Self {
        Self {
            definitions,
            wrappers: Mutex::new(HashMap::new()),
        }
    }

    pub fn definition_of(&self, class: &str) -> Option<Arc<dyn TaskDefinition>> {
        self.definitions.get(class).cloned()
    }

    /// Idempotently create (or fetch) the wrapper for `class`. Registration
    /// never constructs the user's task instance; that happens lazily, only
    /// for the caller that wins `mark_running`.
    pub fn create_wrapper(&self, class: &TaskClassId) -> Arc<TaskWrapper> {
        let mut guard = self.wrappers.lock().unwrap();
        guard
            .entry(class.clone())
            .or_insert_with(|| Arc::new(TaskWrapper::new(class.clone())))
            .clone()
    }

    pub fn get_task(&self, class: &str) -> Option<Arc<TaskWrapper>> {
        self.wrappers.lock().unwrap().get(class).cloned()
    }

    pub fn all(&self) -> Vec<Arc<TaskWrapper>> {
        self.wrappers.lock().unwrap().values().cloned().collect()
    }

    /// Attempt to start `class`'s run phase. On the winning call, lazily
    /// constructs the task instance from its [`TaskDefinition`].
    pub fn start(&self, class: &TaskClassId) -> Result<StartOutcome, TaskError> {
        let wrapper = self.create_wrapper(class);
        if wrapper.mark_running() {
            let def = self
                .definition_of(class)
                .ok_or_else(|| TaskError::NotRegistered(class.clone()))?;
            let instance = def.create_instance();
            Ok(StartOutcome::Won { wrapper, instance })
        } else {
            Ok(StartOutcome::Lost(wrapper))
        }
    }

    /// Attempt to start `class`'s clean phase. The instance must already
    /// exist (created during the run phase); clean never instantiates fresh.
    pub fn start_clean(&self, class: &str) -> Option<StartOutcome> {
        let wrapper = self.get_task(class)?;
        if wrapper.mark_clean_running() {
            let instance = wrapper.take_instance();
            Some(StartOutcome::Won { wrapper, instance })
        } else {
            Some(StartOutcome::Lost(wrapper))
        }
    }
}
