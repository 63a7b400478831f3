// src/exec/command.rs

//! Shell commands as task actions.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info};

use crate::dag::task::{Action, TaskContext};
use crate::errors::ParabuildError;
use crate::types::TaskParams;

/// Prefix of the environment variables carrying task parameters.
pub const PARAM_ENV_PREFIX: &str = "PARABUILD_PARAM_";

/// Action running `cmd` through the platform shell with the task's
/// parameters in the environment.
pub fn shell_action(cmd: String) -> Action {
    Arc::new(move |ctx: &TaskContext<'_>| {
        run_shell(ctx.name(), &cmd, ctx.params())?;
        Ok(())
    })
}

/// Run `cmd` for `task`, blocking until it exits.
///
/// stdout and stderr are inherited so command output reaches the terminal
/// directly. A non-zero exit status is a [`ParabuildError::CommandFailed`].
pub fn run_shell(task: &str, cmd: &str, params: &TaskParams) -> anyhow::Result<()> {
    info!(task = %task, cmd = %cmd, "starting command");

    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    for (key, value) in params.iter() {
        command.env(param_env_name(key), value.to_string());
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let started = Instant::now();
    let status = command
        .status()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    debug!(
        task = %task,
        exit_code = ?status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "command exited"
    );

    if !status.success() {
        return Err(ParabuildError::CommandFailed {
            task: task.to_string(),
            code: status.code(),
        }
        .into());
    }
    Ok(())
}

/// `PARABUILD_PARAM_<KEY>`, upper-cased with `-` turned into `_`.
pub fn param_env_name(key: &str) -> String {
    format!("{PARAM_ENV_PREFIX}{}", key.to_ascii_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    #[test]
    fn env_names_are_shell_friendly() {
        assert_eq!(param_env_name("profile"), "PARABUILD_PARAM_PROFILE");
        assert_eq!(param_env_name("opt-level"), "PARABUILD_PARAM_OPT_LEVEL");
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_command_failure() {
        let err = run_shell("t", "exit 3", &TaskParams::new()).unwrap_err();
        match err.downcast_ref::<ParabuildError>() {
            Some(ParabuildError::CommandFailed { task, code }) => {
                assert_eq!(task, "t");
                assert_eq!(*code, Some(3));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn params_are_exported() {
        let mut params = TaskParams::new();
        params.declare("greeting", ParamValue::Str("hello".to_string()));
        run_shell("t", r#"test "$PARABUILD_PARAM_GREETING" = hello"#, &params).unwrap();
    }
}
