// src/exec/mod.rs

//! Bounded concurrent execution of task coroutines.
//!
//! A task coroutine is just an `async fn` driven by whatever runtime the
//! embedding application already has; `WorkerPool` bounds how many of them
//! may be polled concurrently via a semaphore rather than owning a runtime
//! of its own (a library shouldn't assume it's allowed to spin up its own
//! OS threads underneath a host that already has one).

pub mod worker_pool;

pub use worker_pool::WorkerPool;
