// src/executor.rs

//! `Executor`: drives one task-class tree through the run phase, and
//! optionally through a reverse-order clean phase afterwards.
//!
//! The run phase owns a [`Scheduler`] for the lifetime of the executor (run
//! and clean share it, since clean's reverse walk needs to know the run
//! phase's final states) and reacts to events sent by task coroutines as
//! they complete, fail, or discover a dependency it didn't already know
//! about. The scheduler itself is touched only from this loop, so the lock
//! around it is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::{Scheduler, TaskSchedState};
use crate::errors::{AggregateError, TaskBuildError, TaskError, TaskInterruptedException};
use crate::exec::WorkerPool;
use crate::facade::{EngineCore, EngineEvent, ExecutionFacade};
use crate::observer::ObserverList;
use crate::provider::DependencyProvider;
use crate::registry::StartOutcome;
use crate::task_api::{TaskContext, TaskDefinition};
use crate::types::{EngineConfig, Phase, TaskClassId, TaskState};

/// Per-phase bookkeeping for the `on_group_started`/`on_group_completed`
/// observer notifications (§6). Membership is built lazily as tasks start,
/// rather than enumerated up front, so it stays correct even as
/// `merge_runtime_dependency` grows the graph mid-phase: a group is
/// "complete" once every member that actually started has reached a
/// terminal state, not once every member the graph could ever contain has.
#[derive(Default)]
struct GroupTracker {
    group_of: Mutex<HashMap<TaskClassId, String>>,
    remaining: Mutex<HashMap<String, HashSet<TaskClassId>>>,
    started: Mutex<HashSet<String>>,
}

impl GroupTracker {
    fn new() -> Self {
        Self::default()
    }

    fn ensure_member(&self, class: &TaskClassId, group: String) {
        self.group_of
            .lock()
            .unwrap()
            .entry(class.clone())
            .or_insert_with(|| group.clone());
        self.remaining
            .lock()
            .unwrap()
            .entry(group)
            .or_default()
            .insert(class.clone());
    }

    fn group_of(&self, class: &TaskClassId) -> Option<String> {
        self.group_of.lock().unwrap().get(class).cloned()
    }

    /// `true` the first time any member of `class`'s group starts.
    fn mark_started(&self, class: &TaskClassId) -> bool {
        match self.group_of(class) {
            Some(group) => self.started.lock().unwrap().insert(group),
            None => false,
        }
    }

    /// `Some(group)` once `class` is the last outstanding member of its
    /// group to reach a terminal state.
    fn mark_finished(&self, class: &TaskClassId) -> Option<String> {
        let group = self.group_of(class)?;
        let mut remaining = self.remaining.lock().unwrap();
        let set = remaining.get_mut(&group)?;
        set.remove(class);
        if set.is_empty() {
            Some(group)
        } else {
            None
        }
    }
}

/// Drives a single task-class tree: one [`Executor`] corresponds to one
/// root, one [`Scheduler`], and (if `execute_clean` is called afterwards)
/// one clean pass over the same graph.
pub struct Executor {
    core: Arc<EngineCore>,
    provider: Arc<dyn DependencyProvider>,
    scheduler: Mutex<Scheduler>,
    pool: WorkerPool,
    run_groups: GroupTracker,
    clean_groups: GroupTracker,
}

impl Executor {
    pub fn new(
        definitions: HashMap<TaskClassId, Arc<dyn TaskDefinition>>,
        provider: Arc<dyn DependencyProvider>,
        observers: ObserverList,
        config: EngineConfig,
    ) -> Self {
        Self::from_core(EngineCore::new(definitions, observers, config), provider)
    }

    pub(crate) fn from_core(core: Arc<EngineCore>, provider: Arc<dyn DependencyProvider>) -> Self {
        let pool = WorkerPool::new(core.config.worker_count);
        Self {
            core,
            provider,
            scheduler: Mutex::new(Scheduler::new()),
            pool,
            run_groups: GroupTracker::new(),
            clean_groups: GroupTracker::new(),
        }
    }

    /// A read-only snapshot of the run-phase scheduler state, for
    /// diagnostics.
    pub fn describe(&self) -> Vec<(TaskClassId, TaskSchedState, Vec<TaskClassId>)> {
        self.scheduler.lock().unwrap().describe()
    }

    /// Read one of `class`'s published exports. Only meaningful once the
    /// phase driving `class` has finished.
    pub fn export_of(&self, class: &str, name: &str) -> Result<crate::types::ExportValue, TaskError> {
        self.core
            .registry
            .get_task(class)
            .ok_or_else(|| TaskError::NotRegistered(TaskClassId::from(class)))?
            .get_export(name)
    }

    /// The run-phase state of `class`, if it has been touched by this
    /// executor's scheduler.
    pub fn state_of(&self, class: &str) -> Option<TaskSchedState> {
        self.scheduler.lock().unwrap().state_of(class)
    }

    /// The progress-group a task-class reports under: its `TaskDefinition`'s
    /// declared group, or its own class name if it doesn't declare one.
    fn group_name_of(&self, class: &TaskClassId) -> String {
        self.core
            .registry
            .definition_of(class)
            .and_then(|def| def.group().map(str::to_string))
            .unwrap_or_else(|| class.to_string())
    }

    /// Notify observers of a `Pending -> Running` transition and, if this
    /// is the first member of `class`'s group to start, of the group
    /// starting too.
    fn notify_started(&self, class: &TaskClassId, phase: Phase, groups: &GroupTracker) {
        let group = self.group_name_of(class);
        groups.ensure_member(class, group.clone());
        let now = Instant::now();
        self.core
            .observers
            .task_updated(class, TaskState::Pending, TaskState::Running, phase, now);
        if groups.mark_started(class) {
            self.core.observers.group_started(class, &group, phase, now);
        }
    }

    /// Notify observers of a transition into a terminal state and, if
    /// `class` was the last outstanding member of its group, of the group
    /// completing too.
    fn notify_terminal(
        &self,
        class: &TaskClassId,
        previous: TaskState,
        current: TaskState,
        phase: Phase,
        groups: &GroupTracker,
    ) {
        let now = Instant::now();
        self.core.observers.task_updated(class, previous, current, phase, now);
        if let Some(group) = groups.mark_finished(class) {
            self.core.observers.group_completed(class, &group, phase, now);
        }
    }

    /// Run `root`'s transitive dependency tree to completion.
    ///
    /// Returns `Err(AggregateError)` listing every task that failed, in the
    /// order its wrapper transitioned to `Failed`, once the phase has
    /// drained (nothing ready, nothing in flight).
    pub async fn execute(&self, root: TaskClassId) -> Result<(), AggregateError> {
        {
            let mut scheduler = self.scheduler.lock().unwrap();
            scheduler
                .build_dependency_graph(&root, self.provider.as_ref())
                .map_err(|e| AggregateError {
                    errors: vec![(root.clone(), TaskError::Circular(e))],
                })?;
        }
        self.core.observers.ready();
        self.core.observers.start();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let facade = ExecutionFacade::new(self.core.clone(), event_tx, self.provider.clone());
        let mut failures: Vec<(TaskClassId, TaskError)> = Vec::new();

        self.dispatch_ready(&facade);

        loop {
            if !self.scheduler.lock().unwrap().running_tasks() {
                break;
            }
            let Some(event) = event_rx.recv().await else {
                break;
            };
            match event {
                EngineEvent::TaskCompleted { class } => {
                    info!(task = %class, "executor: task completed");
                    self.scheduler.lock().unwrap().mark_completed(&class);
                    self.notify_terminal(
                        &class,
                        TaskState::Running,
                        TaskState::Completed,
                        Phase::Run,
                        &self.run_groups,
                    );
                    self.dispatch_ready(&facade);
                }
                EngineEvent::TaskFailed { class, error } => {
                    warn!(task = %class, %error, "executor: task failed");
                    self.notify_terminal(
                        &class,
                        TaskState::Running,
                        TaskState::Failed,
                        Phase::Run,
                        &self.run_groups,
                    );
                    self.core.observers.task_error(&class, &error, Phase::Run);
                    let skipped = self.scheduler.lock().unwrap().mark_failed(&class);
                    failures.push((class, error));
                    for skipped_class in &skipped {
                        self.core.shared.mark_skipped(skipped_class);
                        self.notify_terminal(
                            skipped_class,
                            TaskState::Pending,
                            TaskState::Skipped,
                            Phase::Run,
                            &self.run_groups,
                        );
                    }
                    self.dispatch_ready(&facade);
                }
                EngineEvent::StartRequested { class } => {
                    let is_pending = matches!(
                        self.scheduler.lock().unwrap().state_of(&class),
                        Some(TaskSchedState::Pending)
                    );
                    if is_pending {
                        self.start_one(&facade, class);
                    }
                }
                EngineEvent::RuntimeDependency { class, dep } => {
                    let merged = self.scheduler.lock().unwrap().merge_runtime_dependency(
                        &class,
                        &dep,
                        self.provider.as_ref(),
                    );
                    match merged {
                        Ok(_) => self.dispatch_ready(&facade),
                        Err(e) => failures.push((class, TaskError::Circular(e))),
                    }
                }
            }
        }

        let unreached = self.scheduler.lock().unwrap().mark_unreached_as_skipped();
        for class in &unreached {
            self.core.shared.mark_skipped(class);
            self.notify_terminal(
                class,
                TaskState::Pending,
                TaskState::Skipped,
                Phase::Run,
                &self.run_groups,
            );
        }
        self.core.observers.stop();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { errors: failures })
        }
    }

    /// Best-effort reverse-order resource release. Tasks that completed or
    /// failed during the run phase are cleaned bottom-up (a task cleans only
    /// once everything that depended on it has finished cleaning); tasks
    /// that were skipped never ran and have nothing to release. A clean
    /// failure is observer-notified but never halts the rest of the pass,
    /// and never raises: there is no `AggregateError` for this phase.
    pub async fn execute_clean(&self, _root: TaskClassId) {
        let cleanable: Vec<TaskClassId> = {
            let scheduler = self.scheduler.lock().unwrap();
            self.core
                .registry
                .all()
                .into_iter()
                .filter(|w| scheduler.graph().contains(w.class()))
                .filter(|w| matches!(w.state(), TaskState::Completed | TaskState::Failed))
                .map(|w| w.class().clone())
                .collect()
        };
        self.scheduler.lock().unwrap().seed_clean(cleanable);
        self.core.observers.ready();
        self.core.observers.start();

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
        // Reused only so a clean body can still read an already-published
        // export via `request_export`; clean never triggers a fresh start.
        let facade = ExecutionFacade::new(self.core.clone(), event_tx, self.provider.clone());

        self.dispatch_clean_ready(&facade);

        loop {
            if !self.scheduler.lock().unwrap().clean_running_tasks() {
                break;
            }
            let Some(event) = event_rx.recv().await else {
                break;
            };
            match event {
                EngineEvent::TaskCompleted { class } => {
                    self.scheduler.lock().unwrap().mark_clean_completed(&class);
                    self.notify_terminal(
                        &class,
                        TaskState::Running,
                        TaskState::Completed,
                        Phase::Clean,
                        &self.clean_groups,
                    );
                    self.dispatch_clean_ready(&facade);
                }
                EngineEvent::TaskFailed { class, error } => {
                    warn!(task = %class, %error, "executor: clean failed");
                    self.scheduler.lock().unwrap().mark_clean_failed(&class);
                    self.notify_terminal(
                        &class,
                        TaskState::Running,
                        TaskState::Failed,
                        Phase::Clean,
                        &self.clean_groups,
                    );
                    self.core.observers.task_error(&class, &error, Phase::Clean);
                    self.dispatch_clean_ready(&facade);
                }
                // Clean never issues on-demand starts or discovers new
                // edges; the graph was already closed during the run phase.
                EngineEvent::StartRequested { .. } | EngineEvent::RuntimeDependency { .. } => {}
            }
        }
        self.core.observers.stop();
    }

    fn dispatch_ready(&self, facade: &Arc<ExecutionFacade>) {
        let ready = {
            let mut scheduler = self.scheduler.lock().unwrap();
            let ready = scheduler.next_ready_tasks();
            for class in &ready {
                scheduler.mark_enqueued(class);
            }
            ready
        };
        for class in ready {
            self.spawn_run(facade, class);
        }
    }

    fn start_one(&self, facade: &Arc<ExecutionFacade>, class: TaskClassId) {
        self.scheduler.lock().unwrap().mark_enqueued(&class);
        self.spawn_run(facade, class);
    }

    fn spawn_run(&self, facade: &Arc<ExecutionFacade>, class: TaskClassId) {
        self.core.shared.mark_started(&class);
        self.notify_started(&class, Phase::Run, &self.run_groups);

        let core = self.core.clone();
        let facade = facade.clone();
        self.pool.dispatch(async move {
            let outcome = match core.registry.start(&class) {
                Ok(outcome) => outcome,
                Err(err) => {
                    core.shared.mark_failed(&class, err.clone());
                    let _ = facade
                        .event_tx
                        .send(EngineEvent::TaskFailed { class, error: err });
                    return;
                }
            };
            let (wrapper, instance) = match outcome {
                StartOutcome::Won { wrapper, instance } => (wrapper, instance),
                // The scheduler guarantees at most one dispatch per class;
                // this only fires if a caller mis-threads the protocol.
                StartOutcome::Lost(_) => return,
            };

            let ctx = TaskContext::new(class.clone(), facade.clone());
            let run_class = class.clone();
            let joined = tokio::spawn(facade.scoped(async move {
                let mut instance = instance;
                let result = instance.run(&ctx).await;
                (instance, ctx, result)
            }))
            .await;

            let (class, exports_or_err) = match joined {
                Ok((instance, ctx, Ok(()))) => {
                    wrapper.return_instance(instance);
                    (run_class, Ok(ctx.take_exports()))
                }
                Ok((instance, _ctx, Err(err))) => {
                    wrapper.return_instance(instance);
                    (run_class, Err(err))
                }
                Err(join_err) => {
                    let err = if join_err.is_panic() {
                        TaskError::Build(TaskBuildError::from_panic(
                            run_class.clone(),
                            join_err.into_panic(),
                        ))
                    } else {
                        TaskError::Interrupted(TaskInterruptedException(run_class.clone()))
                    };
                    (run_class, Err(err))
                }
            };

            match exports_or_err {
                Ok(exports) => {
                    wrapper.mark_completed(exports.clone());
                    core.shared.mark_completed(&class, exports);
                    let _ = facade.event_tx.send(EngineEvent::TaskCompleted { class });
                }
                Err(err) => {
                    wrapper.mark_failed(err.clone());
                    core.shared.mark_failed(&class, err.clone());
                    let _ = facade
                        .event_tx
                        .send(EngineEvent::TaskFailed { class, error: err });
                }
            }
        });
    }

    fn dispatch_clean_ready(&self, facade: &Arc<ExecutionFacade>) {
        let ready = {
            let mut scheduler = self.scheduler.lock().unwrap();
            let ready = scheduler.next_ready_clean_tasks();
            for class in &ready {
                scheduler.mark_clean_enqueued(class);
            }
            ready
        };
        for class in ready {
            self.spawn_clean(facade, class);
        }
    }

    fn spawn_clean(&self, facade: &Arc<ExecutionFacade>, class: TaskClassId) {
        self.notify_started(&class, Phase::Clean, &self.clean_groups);

        let core = self.core.clone();
        let facade = facade.clone();
        self.pool.dispatch(async move {
            let Some(outcome) = core.registry.start_clean(&class) else {
                return;
            };
            let (wrapper, instance) = match outcome {
                StartOutcome::Won { wrapper, instance } => (wrapper, instance),
                StartOutcome::Lost(_) => return,
            };

            let ctx = TaskContext::new(class.clone(), facade.clone());
            let run_class = class.clone();
            let joined = tokio::spawn(facade.scoped(async move {
                let mut instance = instance;
                let result = instance.clean(&ctx).await;
                (instance, result)
            }))
            .await;

            let result = match joined {
                Ok((instance, result)) => {
                    wrapper.return_instance(instance);
                    result
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        Err(TaskError::Build(TaskBuildError::from_panic(
                            run_class.clone(),
                            join_err.into_panic(),
                        )))
                    } else {
                        Err(TaskError::Interrupted(TaskInterruptedException(
                            run_class.clone(),
                        )))
                    }
                }
            };

            match result {
                Ok(()) => {
                    wrapper.mark_clean_completed();
                    let _ = facade
                        .event_tx
                        .send(EngineEvent::TaskCompleted { class: run_class });
                }
                Err(err) => {
                    wrapper.mark_clean_failed(err.clone());
                    let _ = facade.event_tx.send(EngineEvent::TaskFailed {
                        class: run_class,
                        error: err,
                    });
                }
            }
        });
    }
}
