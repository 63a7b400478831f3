// tests/promise.rs

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parabuild::pool::{job, Job, PoolError, WorkerPool};
use parabuild_test_utils::probe::{ConcurrencyProbe, RunLog};
use parabuild_test_utils::{init_tracing, within_deadline};

#[test]
fn resolving_many_times_runs_the_job_once() {
    init_tracing();
    within_deadline(|| {
        let pool = WorkerPool::new(Some(2));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_job = Arc::clone(&runs);

        let promise = pool
            .submit(move || {
                runs_in_job.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .unwrap();

        for _ in 0..5 {
            assert_eq!(promise.resolve().unwrap(), 42);
        }
        assert!(promise.is_settled());

        pool.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn failure_is_cached() {
    init_tracing();
    within_deadline(|| {
        let pool = WorkerPool::new(Some(1));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_job = Arc::clone(&runs);

        let promise = pool
            .submit(move || -> anyhow::Result<u32> {
                runs_in_job.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("no value")
            })
            .unwrap();

        let first = promise.resolve().unwrap_err();
        let second = promise.resolve().unwrap_err();
        assert!(matches!(first, PoolError::PromiseFailed { .. }));
        assert_eq!(first.failure().unwrap().to_string(), "no value");
        assert_eq!(second.failure().unwrap().to_string(), "no value");

        pool.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn concurrent_resolvers_share_one_execution() {
    init_tracing();
    within_deadline(|| {
        let pool = WorkerPool::new(Some(2));
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_in_job = Arc::clone(&runs);

        let promise = pool
            .submit(move || {
                thread::sleep(Duration::from_millis(20));
                runs_in_job.fetch_add(1, Ordering::SeqCst);
                Ok("done".to_string())
            })
            .unwrap();

        let resolvers: Vec<_> = (0..4)
            .map(|_| {
                let promise = promise.clone();
                thread::spawn(move || promise.resolve().unwrap())
            })
            .collect();

        for resolver in resolvers {
            assert_eq!(resolver.join().unwrap(), "done");
        }
        pool.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn resolve_inside_a_job_on_a_single_slot() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(1)));
        let inner_pool = Arc::clone(&pool);

        let outer = pool
            .submit(move || {
                let inner = inner_pool.submit(|| Ok(20))?;
                Ok(inner.resolve()? + 1)
            })
            .unwrap();

        assert_eq!(outer.resolve().unwrap(), 21);
    });
}

#[test]
fn worker_waiting_on_a_running_promise_gives_up_its_slot() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(2)));
        let probe = ConcurrencyProbe::new();
        let log = RunLog::new();
        let started = Arc::new(AtomicBool::new(false));

        let promise = {
            let inner_pool = Arc::clone(&pool);
            let probe = probe.clone();
            let log = log.clone();
            let started = Arc::clone(&started);
            pool.submit(move || {
                let _running = probe.enter();
                started.store(true, Ordering::SeqCst);
                // Settle only once the waiting worker has handed its slot back.
                while log.position("waiting").is_none() || inner_pool.busy_count() != 1 {
                    thread::sleep(Duration::from_millis(1));
                }
                log.push("settled");
                Ok(7)
            })
            .unwrap()
        };
        while !started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        let jobs: Vec<Job> = (0..4)
            .map(|_| {
                let promise = promise.clone();
                let probe = probe.clone();
                let log = log.clone();
                job(move || {
                    {
                        let _running = probe.enter();
                        log.push("waiting");
                    }
                    let value = promise.resolve()?;
                    log.push(format!("got {value}"));
                    Ok(())
                })
            })
            .collect();
        pool.run(jobs).unwrap();

        assert_eq!(log.position("waiting"), Some(0));
        assert!(log.position("settled").is_some());
        assert_eq!(log.count("settled"), 1);
        assert_eq!(log.count("got 7"), 4);
        assert!(probe.peak() <= 2, "peak was {}", probe.peak());

        pool.join().unwrap();
        assert_eq!(pool.busy_count(), 0);
    });
}
