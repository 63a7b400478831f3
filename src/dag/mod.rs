// src/dag/mod.rs

//! Task graph and invocation.
//!
//! - [`task`] defines tasks, their actions and parameters.
//! - [`graph`] is the name-to-task map, growable while a build runs.
//! - [`chain`] tracks the path of tasks being invoked, for cycle detection.
//! - [`invoker`] runs tasks, feeding the prerequisites of parallel tasks to
//!   the worker pool as batches.

pub mod chain;
pub mod graph;
pub mod invoker;
pub mod task;

pub use chain::InvocationChain;
pub use graph::TaskGraph;
pub use invoker::Invoker;
pub use task::{Action, Task, TaskContext, TaskSpec};

pub type TaskName = String;
