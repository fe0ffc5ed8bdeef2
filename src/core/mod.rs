//! Core domain models: the task contract, the DAG bookkeeping around it and
//! the shared pruning value.

pub mod shared;
pub mod task;

pub use shared::{Context, MinCost, Shared, SharedState};
pub use task::{Decomposition, Slot, Task, TaskId, TaskKind, TaskNode, TaskResult};
