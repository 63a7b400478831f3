// src/pool/worker_pool.rs

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, trace, warn};

use super::error::{JobFailure, PoolError};
use super::marker;
use super::promise::Promise;
use super::tracker::CompletionTracker;
use super::Job;

/// Bound used when no maximum is configured. Large enough to never be hit,
/// small enough that slot arithmetic cannot overflow.
pub const UNBOUNDED: usize = usize::MAX >> 2;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A queued job plus the batch it belongs to.
///
/// Promise jobs have no tracker: their outcome lives in the promise itself.
pub(crate) struct Entry {
    job: Job,
    tracker: Option<Arc<CompletionTracker>>,
}

impl Entry {
    fn belongs_to(&self, tracker: &Arc<CompletionTracker>) -> bool {
        self.tracker
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, tracker))
    }
}

/// Queue and slot accounting, guarded by `Shared::state`.
///
/// A *slot* is the right to execute job code. `busy` counts contexts that
/// hold one: worker threads inside a job, and reentrant callers helping with
/// their own batch. `busy <= maximum_size` always holds outside `join`.
struct PoolState {
    queue: VecDeque<Entry>,
    /// Live worker threads, whatever they are doing.
    workers: usize,
    busy: usize,
    /// Jobs blocked in a nested `run`/`resolve` that gave their slot back.
    waiters: usize,
    maximum_size: usize,
    spawned_total: u64,
}

impl PoolState {
    /// Drop the queued entries of one batch. Returns how many were removed.
    fn withdraw(&mut self, tracker: &Arc<CompletionTracker>) -> usize {
        let before = self.queue.len();
        self.queue.retain(|entry| !entry.belongs_to(tracker));
        before - self.queue.len()
    }
}

pub(crate) struct Shared {
    id: u64,
    state: Mutex<PoolState>,
    /// Signalled whenever work is queued, a slot frees up, a batch job
    /// finishes or a worker exits.
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, PoolState>) -> MutexGuard<'a, PoolState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one claimed entry. The caller holds a slot; no lock is held here.
    fn execute(&self, entry: Entry) {
        let Entry { job, tracker } = entry;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(JobFailure::new(error)),
            Err(payload) => Err(JobFailure::from_panic(payload)),
        };

        match tracker {
            Some(tracker) => tracker.complete(outcome),
            None => {
                if let Err(failure) = outcome {
                    warn!(pool = self.id, error = %failure, "detached job failed");
                }
            }
        }
    }

    /// Give the calling job's slot back before it blocks.
    pub(crate) fn vacate_slot(&self) {
        let mut state = self.lock();
        debug_assert!(state.busy > 0, "vacating a slot that is not held");
        state.busy = state.busy.saturating_sub(1);
        state.waiters += 1;
        self.changed.notify_all();
    }

    /// Take a slot again after a nested wait, blocking while the pool is full.
    pub(crate) fn reoccupy_slot(&self) {
        let mut state = self.lock();
        while state.busy >= state.maximum_size {
            state = self.wait(state);
        }
        state.busy += 1;
        state.waiters -= 1;
    }

    /// Start enough workers to serve the queue, never more than `maximum_size`.
    fn spawn_workers(self: &Arc<Self>, state: &mut PoolState) -> Result<usize, PoolError> {
        let demand = state.busy + state.queue.len();
        let target = state.maximum_size.min(demand);
        let wanted = target.saturating_sub(state.workers);

        let mut started = 0;
        for _ in 0..wanted {
            let shared = Arc::clone(self);
            let name = format!("parabuild-worker-{}-{}", self.id, state.spawned_total);
            match thread::Builder::new()
                .name(name)
                .spawn(move || shared.worker_loop())
            {
                Ok(_detached) => {
                    state.workers += 1;
                    state.spawned_total += 1;
                    started += 1;
                }
                Err(err) if state.workers > 0 => {
                    warn!(pool = self.id, error = %err, "could not start additional worker");
                    break;
                }
                Err(err) => return Err(PoolError::Spawn(err)),
            }
        }

        if started > 0 {
            debug!(pool = self.id, started, workers = state.workers, "started workers");
        }
        Ok(started)
    }

    fn worker_loop(self: Arc<Self>) {
        let _mark = marker::enter(self.id);
        trace!(pool = self.id, "worker started");

        let mut state = self.lock();
        loop {
            if state.workers > state.maximum_size {
                break;
            }
            if state.busy < state.maximum_size {
                if let Some(entry) = state.queue.pop_front() {
                    state.busy += 1;
                    drop(state);

                    self.execute(entry);

                    state = self.lock();
                    state.busy -= 1;
                    self.changed.notify_all();
                    continue;
                }
            }
            state = self.wait(state);
        }

        state.workers -= 1;
        self.changed.notify_all();
        trace!(pool = self.id, "worker exiting");
    }

    /// Reentrant wait: run queued jobs of `tracker`'s batch whenever a slot is
    /// free, otherwise sleep until something changes.
    ///
    /// Only jobs of the caller's own batch are taken: they are exactly the
    /// work the caller would otherwise block on.
    fn help_until_done(&self, tracker: &Arc<CompletionTracker>) {
        let mut state = self.lock();
        while !tracker.is_done() {
            if state.busy < state.maximum_size {
                let own = state.queue.iter().position(|entry| entry.belongs_to(tracker));
                if let Some(entry) = own.and_then(|index| state.queue.remove(index)) {
                    state.busy += 1;
                    drop(state);

                    self.execute(entry);

                    state = self.lock();
                    state.busy -= 1;
                    self.changed.notify_all();
                    continue;
                }
            }
            state = self.wait(state);
        }
    }

    pub(crate) fn is_current_worker(&self) -> bool {
        marker::is_worker_of(self.id)
    }

    pub(crate) fn enqueue_detached(self: &Arc<Self>, job: Job) -> Result<(), PoolError> {
        let mut state = self.lock();
        state.queue.push_back(Entry { job, tracker: None });
        let spawned = self.spawn_workers(&mut state);
        self.changed.notify_all();
        match spawned {
            Err(err) if !self.is_current_worker() => Err(err),
            _ => Ok(()),
        }
    }
}

/// Bounded pool of worker threads running batches of [`Job`]s.
///
/// Workers are started lazily, up to `maximum_size`, and stay around until
/// the pool is joined or dropped. Share the pool with jobs through an `Arc`.
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("WorkerPool")
            .field("id", &self.shared.id)
            .field("maximum_size", &state.maximum_size)
            .field("workers", &state.workers)
            .field("busy", &state.busy)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool running at most `maximum_size` jobs at once.
    ///
    /// `None` or `Some(0)` means effectively unbounded.
    pub fn new(maximum_size: Option<usize>) -> Self {
        let maximum_size = Self::normalize_size(maximum_size);
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(pool = id, maximum_size, "creating worker pool");

        Self {
            shared: Arc::new(Shared {
                id,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    workers: 0,
                    busy: 0,
                    waiters: 0,
                    maximum_size,
                    spawned_total: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// The bound a pool created with `maximum_size` ends up with.
    pub fn normalize_size(maximum_size: Option<usize>) -> usize {
        match maximum_size {
            Some(n) if n > 0 => n.min(UNBOUNDED),
            _ => UNBOUNDED,
        }
    }

    pub fn maximum_size(&self) -> usize {
        self.shared.lock().maximum_size
    }

    /// Live worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.lock().workers
    }

    /// Contexts currently executing job code.
    pub fn busy_count(&self) -> usize {
        self.shared.lock().busy
    }

    pub fn queued_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Run `batch` to completion, blocking the caller.
    ///
    /// Every job of the batch runs exactly once, in no particular order. If
    /// any of them failed, the first failure (by completion order) is
    /// returned after the whole batch has drained, together with the call
    /// site of this `run`.
    ///
    /// Called from inside one of this pool's jobs, the caller hands its slot
    /// back while it waits and runs jobs of the batch itself, so nested
    /// fan-out cannot exhaust the pool.
    #[track_caller]
    pub fn run(&self, batch: Vec<Job>) -> Result<(), PoolError> {
        let location = Location::caller();
        if batch.is_empty() {
            return Ok(());
        }

        let batch_size = batch.len();
        let reentrant = self.shared.is_current_worker();
        let tracker = Arc::new(CompletionTracker::new(batch_size));
        debug!(
            pool = self.shared.id,
            batch_size,
            reentrant,
            %location,
            "submitting batch"
        );

        {
            let mut state = self.shared.lock();
            state
                .queue
                .extend(batch.into_iter().map(|job| Entry {
                    job,
                    tracker: Some(Arc::clone(&tracker)),
                }));
            if reentrant {
                debug_assert!(state.busy > 0, "reentrant caller without a slot");
                state.busy = state.busy.saturating_sub(1);
                state.waiters += 1;
            }
            let spawned = self.shared.spawn_workers(&mut state);

            // A reentrant caller can always finish its batch alone.
            if let Err(err) = spawned {
                if !reentrant {
                    let withdrawn = state.withdraw(&tracker);
                    debug!(pool = self.shared.id, withdrawn, "no worker to run the batch");
                    return Err(err);
                }
                warn!(pool = self.shared.id, error = %err, "continuing without new workers");
            }
            self.shared.changed.notify_all();
            drop(state);
        }

        if reentrant {
            self.shared.help_until_done(&tracker);
            self.shared.reoccupy_slot();
        } else {
            tracker.wait();
        }

        match tracker.take_failure() {
            Some(source) => {
                debug!(pool = self.shared.id, %location, error = %source, "batch failed");
                Err(PoolError::JobFailed { location, source })
            }
            None => {
                trace!(pool = self.shared.id, batch_size, "batch finished");
                Ok(())
            }
        }
    }

    /// Run a single job to completion. Shorthand for a one-job batch.
    #[track_caller]
    pub fn run_one<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.run(vec![Box::new(f)])
    }

    /// Schedule `f` right away and return a handle to its result.
    pub fn submit<T, F>(&self, f: F) -> Result<Promise<T>, PoolError>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Promise::schedule(Arc::clone(&self.shared), f)
    }

    /// Run `wait`, a blocking call that needs no slot, such as taking a lock
    /// another job holds. From inside one of this pool's jobs the slot is
    /// handed back for the duration, like a nested `run` does.
    pub fn blocking<R>(&self, wait: impl FnOnce() -> R) -> R {
        if !self.shared.is_current_worker() {
            return wait();
        }
        self.shared.vacate_slot();
        let result = wait();
        self.shared.reoccupy_slot();
        result
    }

    /// Wait until the whole pool is idle, then stop every worker.
    ///
    /// This temporarily lowers the capacity to zero so workers exit, and
    /// restores it afterwards; the pool stays usable. Only the owner of the
    /// pool may call this, never a job running on it.
    pub fn join(&self) -> Result<(), PoolError> {
        if self.shared.is_current_worker() {
            return Err(PoolError::JoinFromWorker);
        }

        let mut state = self.shared.lock();
        while !state.queue.is_empty() || state.busy > 0 || state.waiters > 0 {
            state = self.shared.wait(state);
        }

        let saved = state.maximum_size;
        state.maximum_size = 0;
        self.shared.changed.notify_all();
        while state.workers > 0 {
            state = self.shared.wait(state);
        }
        state.maximum_size = saved;
        debug!(pool = self.shared.id, maximum_size = saved, "pool drained");

        // Work submitted by other threads while draining.
        if !state.queue.is_empty() {
            self.shared.spawn_workers(&mut state)?;
            self.shared.changed.notify_all();
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Idle workers exit on their own; joining here could block a job that
        // happens to drop the last handle.
        let mut state = self.shared.lock();
        state.maximum_size = 0;
        self.shared.changed.notify_all();
        if !state.queue.is_empty() {
            warn!(
                pool = self.shared.id,
                queued = state.queue.len(),
                "dropping pool with unclaimed jobs"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn zero_and_none_mean_unbounded() {
        assert_eq!(WorkerPool::new(None).maximum_size(), UNBOUNDED);
        assert_eq!(WorkerPool::new(Some(0)).maximum_size(), UNBOUNDED);
        assert_eq!(WorkerPool::new(Some(3)).maximum_size(), 3);
    }

    #[test]
    fn withdraw_removes_only_the_given_batch() {
        let pool = WorkerPool::new(Some(1));
        let mine = Arc::new(CompletionTracker::new(2));
        let other = Arc::new(CompletionTracker::new(1));
        {
            let mut state = pool.shared.lock();
            for tracker in [&mine, &other, &mine] {
                state.queue.push_back(Entry {
                    job: crate::pool::job(|| Ok(())),
                    tracker: Some(Arc::clone(tracker)),
                });
            }
            state.queue.push_back(Entry {
                job: crate::pool::job(|| Ok(())),
                tracker: None,
            });

            assert_eq!(state.withdraw(&mine), 2);
            assert_eq!(state.queue.len(), 2);
            assert!(state.queue.iter().all(|entry| !entry.belongs_to(&mine)));
            assert!(state.queue[0].belongs_to(&other));
            state.queue.clear();
        }
        assert_eq!(pool.queued_count(), 0);
    }

    #[test]
    fn empty_batch_starts_no_workers() {
        let pool = WorkerPool::new(Some(2));
        pool.run(Vec::new()).unwrap();
        assert_eq!(pool.worker_count(), 0);
    }

    #[test]
    fn workers_never_exceed_maximum() {
        let pool = WorkerPool::new(Some(3));
        let counter = Arc::new(AtomicUsize::new(0));
        let jobs = (0..20)
            .map(|_| {
                let counter = Arc::clone(&counter);
                crate::pool::job(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        pool.run(jobs).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert!(pool.worker_count() <= 3);
        pool.join().unwrap();
        assert_eq!(pool.busy_count(), 0);
    }

    #[test]
    fn join_stops_workers_and_pool_stays_usable() {
        let pool = WorkerPool::new(Some(2));
        pool.run_one(|| Ok(())).unwrap();
        pool.join().unwrap();
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(pool.maximum_size(), 2);

        pool.run_one(|| Ok(())).unwrap();
        assert!(pool.worker_count() >= 1);
    }
}
