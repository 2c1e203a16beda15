// src/task_api.rs

//! The task-runtime external interface: what the embedding application
//! implements to describe a task class and a single run of it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::errors::TaskError;
use crate::facade::ExecutionFacade;
use crate::types::{ExportValue, TaskClassId};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single task-class's behaviour, supplied by the embedding application.
/// One `TaskDefinition` is shared by every run of its class; `create_instance`
/// is the factory for the per-run state.
pub trait TaskDefinition: Send + Sync {
    /// Names this task-class announces it will export on success. Reading an
    /// export not listed here is a programmer error surfaced as
    /// [`TaskError::NoSuchExport`].
    fn exports(&self) -> &[String];

    /// The progress-reporting group this task-class belongs to, for the
    /// `on_group_started`/`on_group_completed` observer notifications.
    /// Defaults to no group, in which case the engine reports the task's
    /// own class name as its group of one.
    fn group(&self) -> Option<&str> {
        None
    }

    /// Create a fresh task instance. Called lazily, at most once per task
    /// class per phase, right after this task wins the race to run.
    fn create_instance(&self) -> Box<dyn TaskInstance>;
}

/// A single run (or clean) of a task-class.
pub trait TaskInstance: Send {
    fn run<'a>(&'a mut self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>>;

    /// Best-effort resource release for the clean phase. Default: no-op.
    fn clean<'a>(&'a mut self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        let _ = ctx;
        Box::pin(async { Ok(()) })
    }
}

/// Handed to a task's `run`/`clean` body. This is the coroutine's only
/// window into the rest of the engine: reading another task's export,
/// declaring a runtime-discovered dependency, and publishing this task's
/// own exports all go through here.
pub struct TaskContext {
    class: TaskClassId,
    facade: Arc<ExecutionFacade>,
    exports: Mutex<HashMap<String, ExportValue>>,
    runtime_deps: Mutex<HashSet<TaskClassId>>,
}

impl TaskContext {
    pub(crate) fn new(class: TaskClassId, facade: Arc<ExecutionFacade>) -> Self {
        Self {
            class,
            facade,
            exports: Mutex::new(HashMap::new()),
            runtime_deps: Mutex::new(HashSet::new()),
        }
    }

    pub fn class(&self) -> &TaskClassId {
        &self.class
    }

    /// Suspend the calling coroutine until `dep`'s `export_name` becomes
    /// available, or fail with whatever error `dep` (or one of its own
    /// dependencies) propagated. Implicitly registers `dep` as a runtime
    /// dependency of this task, so the dependency graph always contains an
    /// edge before the wait is issued.
    pub async fn request_export(
        &self,
        dep: &TaskClassId,
        export_name: &str,
    ) -> Result<ExportValue, TaskError> {
        self.register_runtime_dependency(dep.clone());
        self.facade.request_export(dep, export_name).await
    }

    /// Record a dependency this task discovered only once it started
    /// running, rather than one declared up front in the
    /// [`crate::provider::DependencyProvider`].
    pub fn register_runtime_dependency(&self, dep: TaskClassId) {
        if self.runtime_deps.lock().unwrap().insert(dep.clone()) {
            self.facade.register_runtime_dependency(self.class.clone(), dep);
        }
    }

    /// Publish one of this task's exported values.
    pub fn export(&self, name: impl Into<String>, value: ExportValue) {
        self.exports.lock().unwrap().insert(name.into(), value);
    }

    pub(crate) fn take_exports(&self) -> HashMap<String, ExportValue> {
        std::mem::take(&mut self.exports.lock().unwrap())
    }
}
