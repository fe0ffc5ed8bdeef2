//! Messages between the Space and its Computers.
//!
//! The same enums travel over in-process channels and, serialized as JSON
//! lines, over TCP. Kept externally tagged so integer map keys inside task
//! outputs survive the JSON round trip.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::task::{Decomposition, Task, TaskNode};

/// Identifier the Space hands out at registration. Starts at 1 and is never
/// reused; 0 stands for the Space itself as the origin of a shared value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl WorkerId {
    pub const SPACE: WorkerId = WorkerId(0);
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Space to Computer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "", rename_all = "snake_case")]
pub enum ToWorker<T: Task> {
    Registered { worker_id: WorkerId },
    Execute { task: TaskNode<T> },
    SetShared {
        value: T::Shared,
        generation: u64,
        can_propagate: bool,
    },
    StartWorkers,
    Exit,
}

/// Computer to Space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "", rename_all = "snake_case")]
pub enum ToSpace<T: Task> {
    StoreResult { task: TaskNode<T> },
    StoreTasks { decomposition: Decomposition<T> },
    SetShared { value: T::Shared, generation: u64 },
}

impl<T: Task> ToWorker<T> {
    pub fn name(&self) -> &'static str {
        match self {
            ToWorker::Registered { .. } => "registered",
            ToWorker::Execute { .. } => "execute",
            ToWorker::SetShared { .. } => "set_shared",
            ToWorker::StartWorkers => "start_workers",
            ToWorker::Exit => "exit",
        }
    }
}

impl<T: Task> ToSpace<T> {
    pub fn name(&self) -> &'static str {
        match self {
            ToSpace::StoreResult { .. } => "store_result",
            ToSpace::StoreTasks { .. } => "store_tasks",
            ToSpace::SetShared { .. } => "set_shared",
        }
    }
}
