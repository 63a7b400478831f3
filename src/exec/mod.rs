// src/exec/mod.rs

//! Process execution layer.
//!
//! Config-defined tasks run their `cmd` through the platform shell
//! (`sh -c` / `cmd /C`). Commands run synchronously on whichever thread
//! invokes the task, usually a pool worker.

pub mod command;

pub use command::{param_env_name, run_shell, shell_action};
