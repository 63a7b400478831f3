// src/dag/invoker.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info, trace};

use crate::dag::chain::InvocationChain;
use crate::dag::graph::TaskGraph;
use crate::dag::task::{Invocation, Task, TaskContext};
use crate::dag::TaskName;
use crate::errors::{error_chain, ParabuildError, Result};
use crate::pool::{job, Job, WorkerPool};

/// Invokes tasks of a [`TaskGraph`], running the prerequisites of parallel
/// tasks as batches on a shared [`WorkerPool`].
///
/// Each task runs at most once per graph. Prerequisites always finish before
/// the task's own actions start.
#[derive(Debug, Clone)]
pub struct Invoker {
    graph: Arc<TaskGraph>,
    pool: Arc<WorkerPool>,
}

impl Invoker {
    pub fn new(graph: Arc<TaskGraph>, pool: Arc<WorkerPool>) -> Self {
        Self { graph, pool }
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Invoke `name` and, first, everything it depends on.
    pub fn invoke(&self, name: &str) -> Result<()> {
        self.invoke_with_chain(name, &InvocationChain::new())
    }

    fn invoke_with_chain(&self, name: &str, chain: &InvocationChain) -> Result<()> {
        let task = self.graph.lookup(name)?;
        let chain = chain.append(name)?;

        let _invoking = match task.try_lock_invocation() {
            Some(guard) => guard,
            None => {
                trace!(task = %name, "waiting for concurrent invocation");
                self.pool.blocking(|| task.lock_invocation())
            }
        };

        match task.outcome() {
            Invocation::Succeeded => {
                trace!(task = %name, "already invoked");
                return Ok(());
            }
            Invocation::Failed(message) => {
                return Err(ParabuildError::PrerequisiteFailed {
                    task: name.to_string(),
                    message,
                });
            }
            Invocation::NotInvoked => {}
        }

        debug!(task = %name, chain = %chain, "invoking task");
        let outcome = self
            .invoke_prerequisites(&task, &chain)
            .and_then(|()| self.execute(&task));

        task.record_outcome(match &outcome {
            Ok(()) => Invocation::Succeeded,
            Err(err) => Invocation::Failed(error_chain(err)),
        });
        outcome
    }

    /// Run prerequisites until no new ones show up. Actions may add
    /// prerequisites while they run, so the list is re-read after each round.
    fn invoke_prerequisites(&self, task: &Task, chain: &InvocationChain) -> Result<()> {
        let mut seen: HashSet<TaskName> = HashSet::new();

        loop {
            let pending: Vec<TaskName> = task
                .prerequisites()
                .into_iter()
                .filter(|name| seen.insert(name.clone()))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }

            if task.is_parallel() {
                self.invoke_parallel(task.name(), pending, chain)?;
            } else {
                for name in &pending {
                    self.invoke_with_chain(name, chain)?;
                }
            }
        }
    }

    fn invoke_parallel(
        &self,
        parent: &str,
        names: Vec<TaskName>,
        chain: &InvocationChain,
    ) -> Result<()> {
        debug!(task = %parent, prerequisites = ?names, "invoking prerequisites in parallel");

        let jobs: Vec<Job> = names
            .into_iter()
            .map(|name| {
                let invoker = self.clone();
                let chain = chain.clone();
                let parent = parent.to_string();
                job(move || {
                    invoker
                        .invoke_with_chain(&name, &chain)
                        .with_context(|| format!("prerequisite '{name}' of '{parent}'"))
                })
            })
            .collect();

        self.pool.run(jobs)?;
        Ok(())
    }

    fn execute(&self, task: &Task) -> Result<()> {
        let actions = task.actions();
        if actions.is_empty() {
            debug!(task = %task.name(), "no actions");
            return Ok(());
        }

        info!(task = %task.name(), "running task");
        let started = Instant::now();
        let ctx = TaskContext::new(task, &self.graph, &self.pool);

        for action in actions {
            action(&ctx).map_err(|source| ParabuildError::TaskFailed {
                task: task.name().to_string(),
                source,
            })?;
        }

        info!(
            task = %task.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::dag::TaskSpec;

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |ctx: &TaskContext<'_>| {
            log.lock().unwrap().push(ctx.name().to_string());
            Ok(())
        }
    }

    #[test]
    fn sequential_prerequisites_run_in_order_before_the_task() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = Arc::new(TaskGraph::new());
        graph.define(TaskSpec::new("all").needs(["a", "b", "c"]).action(recorder(&log)));
        for name in ["a", "b", "c"] {
            graph.define(TaskSpec::new(name).action(recorder(&log)));
        }

        let invoker = Invoker::new(graph, Arc::new(WorkerPool::new(Some(2))));
        invoker.invoke("all").unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "all"]);
    }

    #[test]
    fn tasks_run_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = Arc::new(TaskGraph::new());
        graph.define(TaskSpec::new("top").needs(["x", "x"]).action(recorder(&log)));
        graph.define(TaskSpec::new("x").action(recorder(&log)));

        let invoker = Invoker::new(Arc::clone(&graph), Arc::new(WorkerPool::new(None)));
        assert!(!graph.lookup("x").unwrap().already_invoked());
        invoker.invoke("top").unwrap();
        assert!(graph.lookup("x").unwrap().already_invoked());
        invoker.invoke("top").unwrap();
        invoker.invoke("x").unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["x", "top"]);
    }

    #[test]
    fn unknown_task_is_reported() {
        let invoker = Invoker::new(Arc::new(TaskGraph::new()), Arc::new(WorkerPool::new(None)));
        let err = invoker.invoke("nope").unwrap_err();
        assert!(matches!(err, ParabuildError::TaskNotFound(name) if name == "nope"));
    }

    #[test]
    fn failed_task_fails_later_invokers() {
        let graph = Arc::new(TaskGraph::new());
        graph.define(TaskSpec::new("bad").action(|_| anyhow::bail!("boom")));
        let invoker = Invoker::new(graph, Arc::new(WorkerPool::new(None)));

        let first = invoker.invoke("bad").unwrap_err();
        assert!(matches!(first, ParabuildError::TaskFailed { .. }));

        match invoker.invoke("bad").unwrap_err() {
            ParabuildError::PrerequisiteFailed { task, message } => {
                assert_eq!(task, "bad");
                assert!(message.contains("boom"), "message was {message}");
            }
            other => panic!("expected PrerequisiteFailed, got {other:?}"),
        }
    }
}
