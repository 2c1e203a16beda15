// src/exec/worker_pool.rs

//! `WorkerPool`: bounds the number of task coroutines polled concurrently.
//!
//! The teacher's executor spawns one OS process per task and lets the OS
//! scheduler and process limits provide backpressure; here the unit of work
//! is an in-process coroutine, so the pool gates concurrency itself with a
//! semaphore sized to `EngineConfig::worker_count`. Permits are granted
//! FIFO, matching the "FIFO ready-queue" framing: a coroutine that becomes
//! ready while the pool is saturated waits in arrival order for a slot.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }

    /// Spawn `fut` onto the ambient runtime, gated by this pool's capacity.
    /// The permit is held for the lifetime of the spawned task, so at most
    /// `worker_count` of these run at once.
    pub fn dispatch<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker pool semaphore is never closed");
            fut.await;
        })
    }
}
