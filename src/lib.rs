// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pool;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{Invoker, TaskGraph, TaskName};
use crate::pool::WorkerPool;
use crate::pool::worker_pool::UNBOUNDED;

/// High-level entry point used by `main.rs`. Blocks until the build is done.
///
/// This wires together:
/// - config loading and parameter overrides
/// - the task graph
/// - the worker pool shared by every parallel task
/// - invocation of the requested tasks, in order
pub fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let graph = Arc::new(TaskGraph::from_config(&cfg));
    for o in &args.overrides {
        graph.set_param(&o.task, &o.key, &o.value)?;
    }

    let targets = if args.tasks.is_empty() {
        vec![cfg.config.default_task.clone()]
    } else {
        args.tasks.clone()
    };
    for target in &targets {
        graph.lookup(target)?;
    }

    // `--jobs` wins over `[config].jobs`.
    let jobs = args.jobs.or(cfg.config.jobs);

    if args.dry_run {
        print_dry_run(&cfg, &graph, &targets, jobs);
        return Ok(());
    }

    let pool = Arc::new(WorkerPool::new(jobs));
    let invoker = Invoker::new(Arc::clone(&graph), Arc::clone(&pool));
    info!(tasks = ?targets, maximum_size = pool.maximum_size(), "starting build");

    let outcome = invoke_all(&invoker, &targets);

    // Let detached work finish and stop the workers before reporting.
    pool.join()?;
    outcome?;

    info!("build finished");
    Ok(())
}

fn invoke_all(invoker: &Invoker, targets: &[TaskName]) -> Result<()> {
    for target in targets {
        invoker
            .invoke(target)
            .with_context(|| format!("task '{target}' failed"))?;
    }
    Ok(())
}

/// Simple dry-run output: print tasks, prerequisites, commands and params.
fn print_dry_run(cfg: &ConfigFile, graph: &TaskGraph, targets: &[TaskName], jobs: Option<usize>) {
    println!("parabuild dry-run");
    match WorkerPool::normalize_size(jobs) {
        UNBOUNDED => println!("  jobs = unbounded"),
        n => println!("  jobs = {n}"),
    }
    println!("  targets = {targets:?}");
    println!();

    let names = graph.task_names();
    println!("tasks ({}):", names.len());
    for name in names {
        let Some(task) = graph.get(&name) else {
            continue;
        };
        println!("  - {name}");
        if let Some(desc) = task.description() {
            println!("      desc: {desc}");
        }
        if let Some(cmd) = cfg.task.get(&name).and_then(|t| t.cmd.as_ref()) {
            println!("      cmd: {cmd}");
        }
        let prerequisites = task.prerequisites();
        if !prerequisites.is_empty() {
            println!("      after: {prerequisites:?}");
        }
        if task.is_parallel() {
            println!("      parallel: true");
        }
        for (key, value) in task.params().iter() {
            println!("      param {key} = {value} ({})", value.type_name());
        }
    }

    debug!("dry-run complete (no execution)");
}
