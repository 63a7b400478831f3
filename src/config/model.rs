// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{ParamValue, TaskParams};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// jobs = 4
///
/// [task.fetch]
/// cmd = "./scripts/fetch.sh"
///
/// [task.build]
/// cmd = "make"
/// after = ["fetch", "codegen"]
/// parallel = true
///
/// [task.build.params]
/// profile = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation.
///
/// Obtained through `ConfigFile::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(config: ConfigSection, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { config, task }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of prerequisite jobs running at once.
    ///
    /// Absent or `0` means unbounded. `--jobs` on the command line wins.
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Task invoked when no task is named on the command line.
    #[serde(default = "default_task_name")]
    pub default_task: String,
}

fn default_task_name() -> String {
    "default".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: None,
            default_task: default_task_name(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Shell command run as the task's action. A task without `cmd` only
    /// groups its prerequisites.
    #[serde(default)]
    pub cmd: Option<String>,

    /// One-line description shown by `--dry-run`.
    #[serde(default)]
    pub desc: Option<String>,

    /// Prerequisites: tasks invoked before this one runs.
    #[serde(default)]
    pub after: Vec<String>,

    /// If true, prerequisites run concurrently on the worker pool.
    #[serde(default)]
    pub parallel: bool,

    /// Typed parameters with their defaults (`[task.<name>.params]`).
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl TaskConfig {
    pub fn task_params(&self) -> TaskParams {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
