// src/pool/promise.rs

//! Single-job front-end: schedule one job now, collect its result later.

use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use super::error::{JobFailure, PoolError};
use super::worker_pool::Shared;

type Thunk<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

enum PromiseState<T> {
    Pending(Thunk<T>),
    Running,
    Settled(Result<T, JobFailure>),
}

struct PromiseCell<T> {
    state: Mutex<PromiseState<T>>,
    settled: Condvar,
}

impl<T> PromiseCell<T> {
    fn lock(&self) -> MutexGuard<'_, PromiseState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the job if nobody has started it yet. Returns whether this call
    /// ran it.
    fn drive(&self) -> bool {
        let thunk = {
            let mut state = self.lock();
            match mem::replace(&mut *state, PromiseState::Running) {
                PromiseState::Pending(thunk) => thunk,
                other => {
                    *state = other;
                    return false;
                }
            }
        };

        let result = match panic::catch_unwind(AssertUnwindSafe(thunk)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(JobFailure::new(error)),
            Err(payload) => Err(JobFailure::from_panic(payload)),
        };

        *self.lock() = PromiseState::Settled(result);
        self.settled.notify_all();
        true
    }
}

/// Handle to a job scheduled with [`WorkerPool::submit`](super::WorkerPool::submit).
///
/// The job runs at most once. Every `resolve` (from any clone of the handle)
/// observes the same value or the same failure.
pub struct Promise<T> {
    cell: Arc<PromiseCell<T>>,
    pool: Arc<Shared>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.cell.lock() {
            PromiseState::Pending(_) => "pending",
            PromiseState::Running => "running",
            PromiseState::Settled(Ok(_)) => "succeeded",
            PromiseState::Settled(Err(_)) => "failed",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    pub(crate) fn schedule<F>(pool: Arc<Shared>, f: F) -> Result<Self, PoolError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let cell = Arc::new(PromiseCell {
            state: Mutex::new(PromiseState::Pending(Box::new(f))),
            settled: Condvar::new(),
        });

        let queued = Arc::clone(&cell);
        pool.enqueue_detached(Box::new(move || {
            queued.drive();
            Ok(())
        }))?;

        Ok(Self { cell, pool })
    }

    pub fn is_settled(&self) -> bool {
        matches!(&*self.cell.lock(), PromiseState::Settled(_))
    }

    /// Block until the job has run and return its result.
    ///
    /// A pool worker that finds the job still queued runs it in place; one
    /// that finds it running elsewhere gives its slot back while it waits.
    #[track_caller]
    pub fn resolve(&self) -> Result<T, PoolError> {
        let location = Location::caller();
        let reentrant = self.pool.is_current_worker();

        if reentrant {
            self.cell.drive();
        }

        let settled = if reentrant && !self.is_settled() {
            self.pool.vacate_slot();
            let settled = self.wait_settled();
            self.pool.reoccupy_slot();
            settled
        } else {
            self.wait_settled()
        };

        settled.map_err(|failure| PoolError::PromiseFailed {
            location,
            source: failure,
        })
    }

    /// Block until the job has settled and return a copy of its result.
    fn wait_settled(&self) -> Result<T, JobFailure> {
        let mut state = self.cell.lock();
        loop {
            if let PromiseState::Settled(result) = &*state {
                return result.clone();
            }
            state = self
                .cell
                .settled
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
