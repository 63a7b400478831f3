// src/pool/marker.rs

//! Thread-local tag naming the pool a thread works for.
//!
//! Worker threads set the tag once at startup and keep it for their whole
//! life, so any `run`/`resolve` issued from inside a job can tell that the
//! calling context already owns one of that pool's slots.

use std::cell::Cell;

thread_local! {
    /// Id of the pool this thread works for; `0` for non-worker threads.
    static CURRENT_POOL: Cell<u64> = const { Cell::new(0) };
}

/// Restores the previous tag when dropped.
#[derive(Debug)]
pub(crate) struct WorkerMark {
    previous: u64,
}

/// Tag the current thread as a worker of pool `pool_id`.
pub(crate) fn enter(pool_id: u64) -> WorkerMark {
    let previous = CURRENT_POOL.with(|current| current.replace(pool_id));
    WorkerMark { previous }
}

/// Whether the current thread is a worker of pool `pool_id`.
pub(crate) fn is_worker_of(pool_id: u64) -> bool {
    CURRENT_POOL.with(|current| current.get() == pool_id)
}

impl Drop for WorkerMark {
    fn drop(&mut self) {
        CURRENT_POOL.with(|current| current.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_scoped_to_the_guard() {
        assert!(!is_worker_of(7));
        {
            let _outer = enter(7);
            assert!(is_worker_of(7));
            {
                let _inner = enter(9);
                assert!(is_worker_of(9));
                assert!(!is_worker_of(7));
            }
            assert!(is_worker_of(7));
        }
        assert!(!is_worker_of(7));
    }
}
