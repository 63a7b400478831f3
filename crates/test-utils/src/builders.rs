#![allow(dead_code)]

use std::collections::BTreeMap;

use parabuild::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use parabuild::errors::Result;
use parabuild::types::ParamValue;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = Some(jobs);
        self
    }

    pub fn with_default_task(mut self, name: &str) -> Self {
        self.config.config.default_task = name.to_string();
        self
    }

    /// Validate without panicking, for tests that expect a rejection.
    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    /// A task running `cmd` through the shell.
    pub fn cmd(cmd: &str) -> Self {
        let mut builder = Self::new();
        builder.task.cmd = Some(cmd.to_string());
        builder
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn parallel(mut self, val: bool) -> Self {
        self.task.parallel = val;
        self
    }

    pub fn desc(mut self, desc: &str) -> Self {
        self.task.desc = Some(desc.to_string());
        self
    }

    pub fn param(mut self, key: &str, value: ParamValue) -> Self {
        self.task.params.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
