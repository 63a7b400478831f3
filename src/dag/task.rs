// src/dag/task.rs

//! Task definitions and the context handed to task actions.

use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use crate::dag::graph::TaskGraph;
use crate::dag::TaskName;
use crate::pool::WorkerPool;
use crate::types::{ParamValue, TaskParams};

/// Body of a task. Actions of one task run in definition order.
pub type Action = Arc<dyn Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Everything needed to (re)define a task.
///
/// Defining a name that already exists *enhances* it: prerequisites and
/// actions are appended, new parameters are added.
#[derive(Clone)]
pub struct TaskSpec {
    pub(crate) name: TaskName,
    pub(crate) prerequisites: Vec<TaskName>,
    pub(crate) actions: Vec<Action>,
    pub(crate) params: TaskParams,
    pub(crate) parallel: bool,
    pub(crate) description: Option<String>,
}

impl TaskSpec {
    /// A plain task: prerequisites run one after the other.
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
            actions: Vec::new(),
            params: TaskParams::new(),
            parallel: false,
            description: None,
        }
    }

    /// A multitask: prerequisites run concurrently on the worker pool.
    pub fn multi(name: impl Into<TaskName>) -> Self {
        Self::new(name).parallel(true)
    }

    pub fn needs<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn action<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.actions.push(Arc::new(f));
        self
    }

    pub fn param(mut self, key: impl Into<String>, default: ParamValue) -> Self {
        self.params.declare(key, default);
        self
    }

    pub fn params(mut self, params: TaskParams) -> Self {
        self.params.merge_missing(params);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("prerequisites", &self.prerequisites)
            .field("actions", &self.actions.len())
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Mutable part of a task definition.
struct Definition {
    prerequisites: Vec<TaskName>,
    actions: Vec<Action>,
    params: TaskParams,
    description: Option<String>,
}

/// Outcome of invoking a task within one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    NotInvoked,
    Succeeded,
    Failed(String),
}

/// A named unit of the build graph.
pub struct Task {
    name: TaskName,
    parallel: bool,
    definition: RwLock<Definition>,
    /// Held for the whole invocation, so concurrent invokers of the same
    /// task wait for the first one and then observe its outcome.
    invoking: Mutex<()>,
    /// Only locked briefly; readable while the task runs.
    outcome: Mutex<Invocation>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("parallel", &self.parallel)
            .field("prerequisites", &self.prerequisites())
            .finish_non_exhaustive()
    }
}

impl Task {
    pub(crate) fn from_spec(spec: TaskSpec) -> Self {
        Self {
            name: spec.name,
            parallel: spec.parallel,
            definition: RwLock::new(Definition {
                prerequisites: dedup(spec.prerequisites),
                actions: spec.actions,
                params: spec.params,
                description: spec.description,
            }),
            invoking: Mutex::new(()),
            outcome: Mutex::new(Invocation::NotInvoked),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Definition> {
        self.definition.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Definition> {
        self.definition.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_invocation(&self) -> MutexGuard<'_, ()> {
        self.invoking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` while another invoker holds the task.
    pub(crate) fn try_lock_invocation(&self) -> Option<MutexGuard<'_, ()>> {
        match self.invoking.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Snapshot of the current prerequisite list.
    pub fn prerequisites(&self) -> Vec<TaskName> {
        self.read().prerequisites.clone()
    }

    pub fn params(&self) -> TaskParams {
        self.read().params.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.read().description.clone()
    }

    pub fn action_count(&self) -> usize {
        self.read().actions.len()
    }

    pub(crate) fn actions(&self) -> Vec<Action> {
        self.read().actions.clone()
    }

    pub(crate) fn outcome(&self) -> Invocation {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set once the invocation ends, while the invocation lock is still held.
    pub(crate) fn record_outcome(&self, outcome: Invocation) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    /// Whether the task already ran (successfully or not) in this build.
    /// A task that is still running counts as not yet invoked.
    pub fn already_invoked(&self) -> bool {
        self.outcome() != Invocation::NotInvoked
    }

    /// Append prerequisites not already listed. Returns how many were added.
    pub fn add_prerequisites<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        let mut def = self.write();
        let mut added = 0;
        for name in names {
            let name = name.into();
            if !def.prerequisites.contains(&name) {
                def.prerequisites.push(name);
                added += 1;
            }
        }
        added
    }

    pub(crate) fn enhance(&self, spec: TaskSpec) {
        self.add_prerequisites(spec.prerequisites);
        let mut def = self.write();
        def.actions.extend(spec.actions);
        def.params.merge_missing(spec.params);
        if spec.description.is_some() {
            def.description = spec.description;
        }
    }

    pub(crate) fn set_param(&self, key: &str, raw: &str) -> Result<(), String> {
        self.write().params.set_from_str(key, raw)
    }
}

fn dedup(names: Vec<TaskName>) -> Vec<TaskName> {
    let mut unique: Vec<TaskName> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

/// What a task action gets to see while it runs.
pub struct TaskContext<'a> {
    task: &'a Task,
    params: TaskParams,
    graph: &'a TaskGraph,
    pool: &'a Arc<WorkerPool>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(task: &'a Task, graph: &'a TaskGraph, pool: &'a Arc<WorkerPool>) -> Self {
        Self {
            task,
            params: task.params(),
            graph,
            pool,
        }
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Parameter value by key, as resolved when the task started.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    /// The task graph, e.g. to add prerequisites while the build runs.
    pub fn graph(&self) -> &TaskGraph {
        self.graph
    }

    /// The worker pool, for actions that fan out work of their own.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        self.pool
    }
}
