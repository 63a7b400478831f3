// src/pool/tracker.rs

//! Per-batch completion barrier.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::error::JobFailure;

#[derive(Debug)]
struct TrackerState {
    /// Jobs of the batch that have not finished yet.
    remaining: usize,
    /// First failure by completion order.
    failure: Option<JobFailure>,
    /// Failures that lost the race against `failure`.
    discarded: usize,
}

/// Outstanding-count, first failure and wake condition for one `run` call.
///
/// Queue entries hold an `Arc` to the tracker of their batch and drop it as
/// soon as the job has been accounted for.
#[derive(Debug)]
pub(crate) struct CompletionTracker {
    state: Mutex<TrackerState>,
    done: Condvar,
}

impl CompletionTracker {
    pub(crate) fn new(jobs: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                remaining: jobs,
                failure: None,
                discarded: 0,
            }),
            done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that one job of the batch finished with `outcome`.
    pub(crate) fn complete(&self, outcome: Result<(), JobFailure>) {
        let mut state = self.lock();
        debug_assert!(state.remaining > 0, "batch completed more jobs than it holds");
        state.remaining = state.remaining.saturating_sub(1);

        if let Err(failure) = outcome {
            if state.failure.is_none() {
                state.failure = Some(failure);
            } else {
                state.discarded += 1;
                debug!(error = %failure, "discarding later failure of the same batch");
            }
        }

        if state.remaining == 0 {
            self.done.notify_all();
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.lock().remaining == 0
    }

    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.lock().remaining
    }

    /// Block until every job of the batch has finished.
    pub(crate) fn wait(&self) {
        let mut state = self.lock();
        while state.remaining > 0 {
            state = self.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the kept failure; `None` if every job succeeded.
    pub(crate) fn take_failure(&self) -> Option<JobFailure> {
        let mut state = self.lock();
        if state.discarded > 0 {
            debug!(discarded = state.discarded, "batch had additional failures");
        }
        state.failure.take()
    }
}
