// src/errors.rs

//! Crate-wide error types.

use thiserror::Error;

use crate::types::TaskClassId;

/// A `run`/`clean` body returned an error, or panicked while running.
#[derive(Debug, Clone, Error)]
#[error("task '{class}' failed: {message}")]
pub struct TaskBuildError {
    pub class: TaskClassId,
    pub message: String,
}

impl TaskBuildError {
    pub fn from_display(class: TaskClassId, err: impl std::fmt::Display) -> Self {
        Self {
            class,
            message: err.to_string(),
        }
    }

    pub fn from_panic(class: TaskClassId, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        Self { class, message }
    }
}

/// A dependency cycle was found while closing the dependency graph.
#[derive(Debug, Clone, Error)]
#[error("circular dependency detected while building the graph for '{root}'")]
pub struct CircularDependencyError {
    pub root: TaskClassId,
}

/// Raised against a task (and anyone waiting on its exports) when the host
/// drops or cancels the driving [`crate::executor::Executor`] future.
#[derive(Debug, Clone, Error)]
#[error("task '{0}' was interrupted before it could complete")]
pub struct TaskInterruptedException(pub TaskClassId);

/// The union of everything that can go wrong with a single task class.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error(transparent)]
    Build(#[from] TaskBuildError),
    #[error(transparent)]
    Circular(#[from] CircularDependencyError),
    #[error(transparent)]
    Interrupted(#[from] TaskInterruptedException),
    #[error("task '{0}' was skipped because a dependency failed or was skipped")]
    Skipped(TaskClassId),
    #[error("task '{0}' does not export '{1}'")]
    NoSuchExport(TaskClassId, String),
    #[error("task '{0}' is not registered with this engine")]
    NotRegistered(TaskClassId),
    #[error("task '{0}' has not completed yet")]
    NotReady(TaskClassId),
}

impl TaskError {
    pub fn class(&self) -> Option<&TaskClassId> {
        match self {
            TaskError::Build(e) => Some(&e.class),
            TaskError::Circular(e) => Some(&e.root),
            TaskError::Interrupted(e) => Some(&e.0),
            TaskError::Skipped(c) | TaskError::NotRegistered(c) | TaskError::NotReady(c) => Some(c),
            TaskError::NoSuchExport(c, _) => Some(c),
        }
    }
}

/// Raised by [`crate::executor::Executor::execute`] (and `execute_clean`)
/// when one or more tasks failed during the phase.
#[derive(Debug, Clone)]
pub struct AggregateError {
    pub errors: Vec<(TaskClassId, TaskError)>,
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} task(s) failed", self.errors.len())?;
        for (class, err) in &self.errors {
            write!(f, "\n  - {class}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

pub type Result<T> = std::result::Result<T, TaskError>;
