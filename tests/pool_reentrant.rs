// tests/pool_reentrant.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parabuild::pool::{job, Job, PoolError, WorkerPool};
use parabuild_test_utils::probe::{ConcurrencyProbe, RunLog};
use parabuild_test_utils::{init_tracing, within_deadline};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Boom")]
struct Boom;

#[test]
fn nested_batch_on_a_single_slot_completes() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(1)));
        let log = RunLog::new();

        let inner_pool = Arc::clone(&pool);
        let inner_log = log.clone();
        pool.run_one(move || {
            inner_log.push("J1");
            let l2 = inner_log.clone();
            let l3 = inner_log.clone();
            inner_pool.run(vec![
                job(move || {
                    l2.push("J2");
                    Ok(())
                }),
                job(move || {
                    l3.push("J3");
                    Ok(())
                }),
            ])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(log.count("J1"), 1);
        assert_eq!(log.count("J2"), 1);
        assert_eq!(log.count("J3"), 1);
        pool.join().unwrap();
        assert_eq!(pool.busy_count(), 0);
    });
}

/// Fan out `width` children per level down to `depth`, counting every node.
fn fan_out(pool: Arc<WorkerPool>, depth: usize, width: usize, nodes: Arc<AtomicUsize>) -> Job {
    job(move || {
        nodes.fetch_add(1, Ordering::SeqCst);
        if depth == 0 {
            return Ok(());
        }
        let children: Vec<Job> = (0..width)
            .map(|_| fan_out(Arc::clone(&pool), depth - 1, width, Arc::clone(&nodes)))
            .collect();
        pool.run(children)?;
        Ok(())
    })
}

#[test]
fn deep_recursion_on_ten_slots() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(10)));
        let nodes = Arc::new(AtomicUsize::new(0));

        let roots: Vec<Job> = (0..10)
            .map(|_| fan_out(Arc::clone(&pool), 5, 3, Arc::clone(&nodes)))
            .collect();
        pool.run(roots).unwrap();

        // Each root tree has (3^6 - 1) / 2 nodes.
        assert_eq!(nodes.load(Ordering::SeqCst), 10 * 364);
        assert!(pool.worker_count() <= 10);
    });
}

#[test]
fn recursion_completes_for_small_bounds() {
    init_tracing();
    within_deadline(|| {
        for maximum_size in 1..=4 {
            let pool = Arc::new(WorkerPool::new(Some(maximum_size)));
            let nodes = Arc::new(AtomicUsize::new(0));
            let roots: Vec<Job> = (0..3)
                .map(|_| fan_out(Arc::clone(&pool), 3, 2, Arc::clone(&nodes)))
                .collect();

            pool.run(roots).unwrap();
            assert_eq!(nodes.load(Ordering::SeqCst), 3 * 15, "maximum_size {maximum_size}");
            pool.join().unwrap();
        }
    });
}

#[test]
fn nested_fan_out_respects_the_bound() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(2)));
        let probe = ConcurrencyProbe::new();

        let outer: Vec<Job> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let probe = probe.clone();
                job(move || {
                    {
                        let _running = probe.enter();
                        thread::sleep(Duration::from_millis(2));
                    }
                    let leaves: Vec<Job> = (0..4)
                        .map(|_| {
                            let probe = probe.clone();
                            job(move || {
                                let _running = probe.enter();
                                thread::sleep(Duration::from_millis(2));
                                Ok(())
                            })
                        })
                        .collect();
                    pool.run(leaves)?;
                    Ok(())
                })
            })
            .collect();

        pool.run(outer).unwrap();
        assert_eq!(probe.entered(), 4 + 16);
        assert!(probe.peak() <= 2, "peak was {}", probe.peak());
    });
}

#[test]
fn nested_failure_keeps_its_cause() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(2)));
        let inner_pool = Arc::clone(&pool);

        let err = pool
            .run_one(move || {
                let deepest = Arc::clone(&inner_pool);
                inner_pool.run_one(move || {
                    deepest.run_one(|| Err(Boom.into()))?;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap_err();

        let failure = err.failure().expect("job failure attached");
        assert!(failure.downcast_ref::<Boom>().is_some());
        assert!(failure.downcast_ref::<PoolError>().is_some());
    });
}

#[test]
fn sibling_batches_on_one_slot() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(1)));
        let log = RunLog::new();

        let outer: Vec<Job> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let pool = Arc::clone(&pool);
                let log = log.clone();
                job(move || {
                    let children: Vec<Job> = (0..2)
                        .map(|i| {
                            let log = log.clone();
                            job(move || {
                                log.push(format!("{name}{i}"));
                                Ok(())
                            })
                        })
                        .collect();
                    pool.run(children)?;
                    // Children always finish before their parent continues.
                    log.push(name);
                    Ok(())
                })
            })
            .collect();

        pool.run(outer).unwrap();
        assert_eq!(log.len(), 9);
        for name in ["a", "b", "c"] {
            let parent = log.position(name).unwrap();
            assert!(log.position(&format!("{name}0")).unwrap() < parent);
            assert!(log.position(&format!("{name}1")).unwrap() < parent);
        }
    });
}

#[test]
fn join_from_a_worker_is_rejected() {
    init_tracing();
    within_deadline(|| {
        let pool = Arc::new(WorkerPool::new(Some(2)));
        let inner_pool = Arc::clone(&pool);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_job = Arc::clone(&seen);

        pool.run_one(move || {
            if matches!(inner_pool.join(), Err(PoolError::JoinFromWorker)) {
                seen_in_job.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        pool.join().unwrap();
        assert_eq!(pool.worker_count(), 0);
    });
}
