//! Core value types shared across the crate.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies a task class. Cheap to clone: every waiter registration,
/// every graph edge, and every broadcast to a dependency's waiters clones
/// one of these.
pub type TaskClassId = Arc<str>;

/// A value a task exports for its dependents to read. `serde_json::Value`
/// keeps this free-form without inventing a bespoke payload type; wrapped in
/// `Arc` so handing the same export to many waiters is a pointer copy.
pub type ExportValue = Arc<serde_json::Value>;

/// Builds an [`ExportValue`] from anything serializable.
pub fn export_value<T: serde::Serialize>(value: &T) -> Result<ExportValue, serde_json::Error> {
    Ok(Arc::new(serde_json::to_value(value)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Which of the two independent lifecycles (§4.1's `state` vs. `clean_state`)
/// a notification is about. Observers need this to tell a run-phase
/// `Completed` apart from a clean-phase one for the same task class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Run,
    Clean,
}

/// Wall-clock bookkeeping for a single phase (run or clean) of one task.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timing {
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
}

impl Timing {
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }
}

/// Programmatic configuration for an [`crate::executor::Executor`]. The
/// in-process analogue of the teacher's CLI/TOML configuration layer: no
/// file format survives, just the handful of knobs a caller actually needs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on concurrently-running task coroutines.
    pub worker_count: usize,
    /// Bound on the internal event channel between task coroutines and the
    /// executor's core loop.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            event_channel_capacity: 1024,
        }
    }
}
