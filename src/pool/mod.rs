// src/pool/mod.rs

//! Bounded worker pool used to run task prerequisites in parallel.
//!
//! - [`worker_pool`] owns the shared job queue, the worker threads and the
//!   slot accounting that keeps at most `maximum_size` jobs executing.
//! - [`tracker`] is the per-batch completion barrier behind
//!   [`WorkerPool::run`].
//! - [`promise`] is the single-job front-end ([`WorkerPool::submit`]).
//! - [`marker`] tags the pool's own threads so a nested `run` can tell that
//!   it is being called from inside a job.
//!
//! A caller that is itself one of the pool's workers never sits on a slot
//! while it waits: it gives the slot back, runs queued jobs of its own batch
//! whenever a slot is free, and takes a slot again before returning to the
//! job that called it.

pub mod error;
pub mod marker;
pub mod promise;
pub mod tracker;
pub mod worker_pool;

pub use error::{JobFailure, PoolError};
pub use promise::Promise;
pub use worker_pool::WorkerPool;

/// A unit of work accepted by the pool.
///
/// Jobs own everything they touch (`'static`); a job that needs the pool
/// again captures an `Arc<WorkerPool>`.
pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Box a closure as a [`Job`].
pub fn job<F>(f: F) -> Job
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    Box::new(f)
}
