// src/facade.rs

//! `ExecutionFacade`: the per-run façade handed to task bodies (indirectly,
//! through `TaskContext`) and discoverable from inside a running task via
//! [`ExecutionFacade::current`]. Bundles together the dependency broker, the
//! observer fan-out, and the channel used to ask the executor's core loop to
//! dispatch a dependency on demand.
//!
//! The "current facade" accessor is a `tokio::task_local!`, not a plain
//! `std::thread_local!`: a suspended task coroutine can resume on a
//! different worker thread than the one that started it, and only a
//! task-local survives that migration correctly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::{AggregateError, TaskError, TaskInterruptedException};
use crate::observer::ObserverList;
use crate::provider::DependencyProvider;
use crate::registry::Registry;
use crate::shared_state::{ResumeMessage, SharedState, Verdict};
use crate::task_api::TaskDefinition;
use crate::types::{EngineConfig, ExportValue, TaskClassId};

/// State shared by every phase (and every nested sub-run) of one engine:
/// the registry, the dependency broker, and the observer list all outlive
/// any single run/clean pass.
pub struct EngineCore {
    pub registry: Arc<Registry>,
    pub shared: Arc<SharedState>,
    pub observers: ObserverList,
    pub config: EngineConfig,
}

impl EngineCore {
    pub fn new(
        definitions: HashMap<TaskClassId, Arc<dyn TaskDefinition>>,
        observers: ObserverList,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(Registry::new(definitions)),
            shared: Arc::new(SharedState::new()),
            observers,
            config,
        })
    }
}

pub(crate) enum EngineEvent {
    TaskCompleted {
        class: TaskClassId,
    },
    TaskFailed {
        class: TaskClassId,
        error: TaskError,
    },
    StartRequested {
        class: TaskClassId,
    },
    RuntimeDependency {
        class: TaskClassId,
        dep: TaskClassId,
    },
}

tokio::task_local! {
    static CURRENT_FACADE: Arc<ExecutionFacade>;
}

pub struct ExecutionFacade {
    pub(crate) core: Arc<EngineCore>,
    pub(crate) event_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
    pub(crate) provider: Arc<dyn DependencyProvider>,
}

impl ExecutionFacade {
    pub(crate) fn new(
        core: Arc<EngineCore>,
        event_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
        provider: Arc<dyn DependencyProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core,
            event_tx,
            provider,
        })
    }

    /// The facade for the task coroutine currently executing on this async
    /// task, if any. Lets a task body reach the engine without the caller
    /// having to thread a reference through every intervening function.
    pub fn current() -> Option<Arc<ExecutionFacade>> {
        CURRENT_FACADE.try_with(|f| f.clone()).ok()
    }

    pub(crate) async fn scoped<F, T>(self: &Arc<Self>, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT_FACADE.scope(self.clone(), fut).await
    }

    pub async fn request_export(
        &self,
        dep: &TaskClassId,
        export_name: &str,
    ) -> Result<ExportValue, TaskError> {
        match self.core.shared.request_dependency(dep, export_name) {
            Verdict::Ready(result) => result,
            Verdict::Wait(rx) => Self::await_resume(rx, dep).await,
            Verdict::Start(rx) => {
                let _ = self.event_tx.send(EngineEvent::StartRequested {
                    class: dep.clone(),
                });
                Self::await_resume(rx, dep).await
            }
        }
    }

    async fn await_resume(
        rx: oneshot::Receiver<ResumeMessage>,
        dep: &TaskClassId,
    ) -> Result<ExportValue, TaskError> {
        match rx.await {
            Ok(ResumeMessage::Value(v)) => Ok(v),
            Ok(ResumeMessage::Error(e)) => Err(e),
            Err(_) => Err(TaskError::Interrupted(TaskInterruptedException(dep.clone()))),
        }
    }

    pub fn register_runtime_dependency(&self, class: TaskClassId, dep: TaskClassId) {
        let _ = self
            .event_tx
            .send(EngineEvent::RuntimeDependency { class, dep });
    }

    /// Re-enter the engine from inside a running task body, executing a
    /// fresh run-phase for `root` against the same registry/broker and
    /// awaiting its completion before returning.
    pub async fn trigger(&self, root: TaskClassId) -> Result<(), AggregateError> {
        crate::executor::Executor::from_core(self.core.clone(), self.provider.clone())
            .execute(root)
            .await
    }
}
