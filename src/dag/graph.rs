// src/dag/graph.rs

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::config::model::ConfigFile;
use crate::dag::task::{Task, TaskSpec};
use crate::dag::TaskName;
use crate::errors::{ParabuildError, Result};
use crate::exec::command::shell_action;

/// The set of known tasks, keyed by name.
///
/// The graph can grow while a build runs: task actions may define tasks or
/// add prerequisites through [`TaskContext::graph`](crate::dag::TaskContext::graph).
/// Acyclicity of config-defined tasks is checked in `config::validate`;
/// cycles introduced at runtime are caught by the invocation chain.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: RwLock<BTreeMap<TaskName, Arc<Task>>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let graph = Self::new();

        for (name, tc) in cfg.task.iter() {
            let mut spec = TaskSpec::new(name.clone())
                .needs(tc.after.iter().cloned())
                .parallel(tc.parallel)
                .params(tc.task_params());
            if let Some(desc) = &tc.desc {
                spec = spec.describe(desc.clone());
            }
            if let Some(cmd) = &tc.cmd {
                spec.actions.push(shell_action(cmd.clone()));
            }
            graph.define(spec);
        }

        graph
    }

    /// Define a task, or enhance it if the name is already taken.
    pub fn define(&self, spec: TaskSpec) -> Arc<Task> {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = tasks.get(&spec.name) {
            if existing.is_parallel() != spec.parallel {
                warn!(
                    task = %spec.name,
                    parallel = existing.is_parallel(),
                    "redefinition changes `parallel`; keeping the first definition's setting"
                );
            }
            debug!(task = %spec.name, "enhancing existing task");
            existing.enhance(spec);
            return Arc::clone(existing);
        }

        debug!(task = %spec.name, parallel = spec.parallel, "defining task");
        let task = Arc::new(Task::from_spec(spec));
        tasks.insert(task.name().to_string(), Arc::clone(&task));
        task
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<Task>> {
        self.get(name)
            .ok_or_else(|| ParabuildError::TaskNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All task names, sorted.
    pub fn task_names(&self) -> Vec<TaskName> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Add prerequisites to `task`, defining it as a plain task if unknown.
    pub fn add_prerequisites<I, S>(&self, task: &str, prerequisites: I) -> Arc<Task>
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.define(TaskSpec::new(task).needs(prerequisites))
    }

    /// Override a declared parameter from its string form.
    pub fn set_param(&self, task: &str, key: &str, raw: &str) -> Result<()> {
        self.lookup(task)?
            .set_param(key, raw)
            .map_err(|e| ParabuildError::ConfigError(format!("task '{task}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn redefinition_appends_prerequisites_and_actions() {
        let graph = TaskGraph::new();
        graph.define(TaskSpec::new("t1").needs(["t2"]).action(|_| Ok(())));
        graph.define(TaskSpec::new("t1").needs(["t2", "t3"]).action(|_| Ok(())));

        let t1 = graph.lookup("t1").unwrap();
        assert_eq!(t1.prerequisites(), vec!["t2", "t3"]);
        assert_eq!(t1.action_count(), 2);
    }

    #[test]
    fn add_prerequisites_defines_unknown_tasks() {
        let graph = TaskGraph::new();
        graph.add_prerequisites("t9", ["t4"]);
        assert_eq!(graph.lookup("t9").unwrap().prerequisites(), vec!["t4"]);
        assert!(!graph.lookup("t9").unwrap().is_parallel());
    }

    #[test]
    fn set_param_is_type_checked() {
        let graph = TaskGraph::new();
        graph.define(TaskSpec::new("welcome").param("n", ParamValue::Int(1)));

        graph.set_param("welcome", "n", "3").unwrap();
        assert_eq!(
            graph.lookup("welcome").unwrap().params().get("n"),
            Some(&ParamValue::Int(3))
        );

        let err = graph.set_param("welcome", "n", "three").unwrap_err();
        assert!(matches!(err, ParabuildError::ConfigError(_)));
        let err = graph.set_param("missing", "n", "1").unwrap_err();
        assert!(matches!(err, ParabuildError::TaskNotFound(_)));
    }
}
