// src/shared_state.rs

//! `SharedState`: the dependency broker. A coroutine that wants another
//! task's exported value calls `request_dependency`; depending on that
//! task's broker-visible state it either gets the value back immediately,
//! is told to park because someone else already triggered a start, or is
//! told it's the first to ask and must itself kick off the dependency.
//!
//! A single mutex guards all broker bookkeeping; it is never held while a
//! resume channel is sent on, so a slow or panicking waiter can't wedge the
//! broker for everyone else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

use crate::errors::TaskError;
use crate::types::{ExportValue, TaskClassId};

#[derive(Clone)]
enum BrokerState {
    Pending,
    Running,
    Completed(Arc<HashMap<String, ExportValue>>),
    Failed(TaskError),
}

struct Waiter {
    export_name: String,
    resume: oneshot::Sender<ResumeMessage>,
}

pub enum ResumeMessage {
    Value(ExportValue),
    Error(TaskError),
}

/// What a `request_dependency` caller should do next.
pub enum Verdict {
    /// The dependency is already terminal; resolved without suspending.
    Ready(Result<ExportValue, TaskError>),
    /// Someone else already triggered this dependency; park and wait.
    Wait(oneshot::Receiver<ResumeMessage>),
    /// Nobody has triggered this dependency yet; the caller must ask the
    /// worker pool to dispatch it, then park and wait on the same channel.
    Start(oneshot::Receiver<ResumeMessage>),
}

#[derive(Default)]
struct Inner {
    state: HashMap<TaskClassId, BrokerState>,
    waiters: HashMap<TaskClassId, Vec<Waiter>>,
}

#[derive(Default)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to read `dep`'s `export_name`. See [`Verdict`] for the three
    /// possible outcomes.
    pub fn request_dependency(&self, dep: &TaskClassId, export_name: &str) -> Verdict {
        let mut guard = self.inner.lock().unwrap();
        match guard.state.get(dep) {
            Some(BrokerState::Completed(values)) => {
                let result = values
                    .get(export_name)
                    .cloned()
                    .ok_or_else(|| TaskError::NoSuchExport(dep.clone(), export_name.to_string()));
                Verdict::Ready(result)
            }
            Some(BrokerState::Failed(err)) => Verdict::Ready(Err(err.clone())),
            Some(BrokerState::Pending) | Some(BrokerState::Running) => {
                let (tx, rx) = oneshot::channel();
                guard.waiters.entry(dep.clone()).or_default().push(Waiter {
                    export_name: export_name.to_string(),
                    resume: tx,
                });
                Verdict::Wait(rx)
            }
            None => {
                let (tx, rx) = oneshot::channel();
                guard.waiters.entry(dep.clone()).or_default().push(Waiter {
                    export_name: export_name.to_string(),
                    resume: tx,
                });
                guard.state.insert(dep.clone(), BrokerState::Pending);
                Verdict::Start(rx)
            }
        }
    }

    /// Called once a task that won the dispatch race actually begins
    /// running, whether it was dispatched proactively by the scheduler or
    /// on-demand via a `Start` verdict. Idempotent with respect to the
    /// `Start`/`Wait` arbitration: after this call, every subsequent
    /// `request_dependency` for `class` sees `Wait`.
    pub fn mark_started(&self, class: &TaskClassId) {
        self.inner
            .lock()
            .unwrap()
            .state
            .insert(class.clone(), BrokerState::Running);
    }

    pub fn mark_completed(&self, class: &TaskClassId, exports: HashMap<String, ExportValue>) {
        let exports = Arc::new(exports);
        let waiters = {
            let mut guard = self.inner.lock().unwrap();
            guard.state.insert(class.clone(), BrokerState::Completed(exports.clone()));
            guard.waiters.remove(class).unwrap_or_default()
        };
        debug!(task = %class, waiters = waiters.len(), "shared_state: resolving waiters on completion");
        for waiter in waiters {
            let msg = match exports.get(&waiter.export_name) {
                Some(v) => ResumeMessage::Value(v.clone()),
                None => ResumeMessage::Error(TaskError::NoSuchExport(
                    class.clone(),
                    waiter.export_name.clone(),
                )),
            };
            let _ = waiter.resume.send(msg);
        }
    }

    pub fn mark_failed(&self, class: &TaskClassId, error: TaskError) {
        self.resolve_with_error(class, BrokerState::Failed(error.clone()), error);
    }

    pub fn mark_skipped(&self, class: &TaskClassId) {
        let error = TaskError::Skipped(class.clone());
        self.resolve_with_error(class, BrokerState::Failed(error.clone()), error);
    }

    fn resolve_with_error(&self, class: &TaskClassId, state: BrokerState, error: TaskError) {
        let waiters = {
            let mut guard = self.inner.lock().unwrap();
            guard.state.insert(class.clone(), state);
            guard.waiters.remove(class).unwrap_or_default()
        };
        debug!(task = %class, waiters = waiters.len(), error = %error, "shared_state: resolving waiters with error");
        for waiter in waiters {
            let _ = waiter.resume.send(ResumeMessage::Error(error.clone()));
        }
    }
}
