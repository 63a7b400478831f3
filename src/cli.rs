// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::ParamOverride;

/// Command-line arguments for `parabuild`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "parabuild",
    version,
    about = "Run build tasks, with prerequisites in parallel on a bounded worker pool.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to invoke, in order.
    ///
    /// Default: `[config].default_task` from the config file.
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Parabuild.toml")]
    pub config: String,

    /// Maximum number of jobs running at once. `0` means unbounded.
    ///
    /// Overrides `[config].jobs`.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Override a task parameter, e.g. `--set build.profile=release`.
    ///
    /// The value is parsed as the type of the parameter's default.
    #[arg(long = "set", value_name = "TASK.KEY=VALUE")]
    pub overrides: Vec<ParamOverride>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PARABUILD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
