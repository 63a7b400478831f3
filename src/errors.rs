// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::pool::PoolError;

#[derive(Error, Debug)]
pub enum ParabuildError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Task '{task}' failed")]
    TaskFailed {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Prerequisite '{task}' already failed in this build: {message}")]
    PrerequisiteFailed { task: String, message: String },

    #[error("Command for task '{task}' exited with {}", exit_description(.code))]
    CommandFailed { task: String, code: Option<i32> },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ParabuildError {
    /// The innermost `ParabuildError` behind pool and task failures, e.g. the
    /// circular dependency that made a whole batch of prerequisites fail.
    pub fn innermost(&self) -> &ParabuildError {
        let nested = match self {
            ParabuildError::Pool(err) => err
                .failure()
                .and_then(|failure| failure.downcast_ref::<ParabuildError>()),
            ParabuildError::TaskFailed { source, .. } | ParabuildError::Other(source) => {
                source.downcast_ref::<ParabuildError>()
            }
            _ => None,
        };
        nested.map_or(self, ParabuildError::innermost)
    }
}

/// Render an error and all of its causes on one line, `outer: inner: ...`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ParabuildError>;
