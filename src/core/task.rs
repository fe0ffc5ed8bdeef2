//! Task contract and the bookkeeping the runtime keeps around each task.
//!
//! A [`Task`] is the collaborator-supplied payload: it knows how to decide
//! whether it is atomic, how to split, how to build its Join successor and how
//! to execute. Everything else (identity, level, slots, counters, timing)
//! lives in [`TaskNode`] and is owned by the runtime.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::core::shared::{Context, Shared};
use crate::error::{Error, Result};

/// Unique identifier for a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Role of a node in the fork-join DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Does work itself or decomposes.
    Unit,
    /// Waits for its inputs and composes them.
    Join,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Unit => write!(f, "unit"),
            TaskKind::Join => write!(f, "join"),
        }
    }
}

/// The operations a problem domain provides.
///
/// Implementations must be side-effect free: a task may execute more than
/// once when the worker running it fails, and Joins see their inputs in
/// argument order but children finish in any order.
pub trait Task: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Output: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static;
    type Shared: Shared;

    /// Execute directly instead of decomposing.
    fn is_atomic(&self, ctx: &Context<Self::Shared>) -> bool;

    /// Children in argument order. Empty when every candidate was pruned.
    fn split(&self, ctx: &Context<Self::Shared>) -> Result<Vec<Self>>;

    /// The Join payload that will compose this task's children.
    fn create_successor(&self) -> Self;

    /// Compute a Unit (`inputs` empty) or compose a Join (`inputs` in
    /// argument order).
    fn execute(&self, ctx: &Context<Self::Shared>, inputs: &[Self::Output]) -> Result<Self::Output>;

    /// Whether a ready Join of this payload is cheap enough to run on the
    /// coordinator instead of paying a network round trip.
    fn execute_on_space(&self) -> bool {
        true
    }
}

/// One input position of a Join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot<O> {
    /// Will be filled by the task with this id.
    Pending(TaskId),
    Filled(O),
}

impl<O> Slot<O> {
    pub fn is_pending_on(&self, id: &TaskId) -> bool {
        matches!(self, Slot::Pending(pending) if pending == id)
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Slot::Filled(_))
    }
}

/// A task plus the runtime's bookkeeping for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TaskNode<T: Task> {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Depth in the DAG; the root and its Join are level 0.
    pub level: u32,
    /// Slot position in the successor. `None` only for the root and the
    /// Joins that stand in for it.
    pub arg_index: Option<usize>,
    pub successor: Option<TaskId>,
    /// Inputs a Join still waits for.
    pub join_counter: usize,
    pub inputs: Vec<Slot<T::Output>>,
    pub result: Option<T::Output>,
    /// Compute time of this node: execution, or decomposition when it split.
    pub elapsed: Duration,
    /// Compute time of every node below this one that has already reported.
    pub subtree_elapsed: Duration,
    /// Bound installed cluster-wide when the root is submitted.
    pub init_shared: Option<T::Shared>,
    /// Submission this node descends from. Stamped on the root by the Space
    /// and inherited by every node wired below it.
    #[serde(default)]
    pub generation: u64,
    pub payload: T,
}

impl<T: Task> TaskNode<T> {
    /// A level-0 task with no successor.
    pub fn root(payload: T) -> Self {
        Self::unit(payload, 0, None, None)
    }

    pub fn unit(payload: T, level: u32, arg_index: Option<usize>, successor: Option<TaskId>) -> Self {
        Self {
            id: TaskId::new(),
            kind: TaskKind::Unit,
            level,
            arg_index,
            successor,
            join_counter: 0,
            inputs: Vec::new(),
            result: None,
            elapsed: Duration::ZERO,
            subtree_elapsed: Duration::ZERO,
            init_shared: None,
            generation: 0,
            payload,
        }
    }

    pub fn with_shared(mut self, shared: T::Shared) -> Self {
        self.init_shared = Some(shared);
        self
    }

    pub fn is_root(&self) -> bool {
        self.level == 0 && self.successor.is_none()
    }

    pub fn is_join(&self) -> bool {
        self.kind == TaskKind::Join
    }

    /// Write `value` into the slot at `arg_index` if it still points at
    /// `from`, and decrement the counter.
    ///
    /// Returns `Ok(false)` for a stale report (slot already filled or
    /// re-pointed) and `Err` when the index is out of range or the counter
    /// would go negative.
    pub fn fill(&mut self, arg_index: usize, from: &TaskId, value: T::Output) -> Result<bool> {
        let slot_count = self.inputs.len();
        let slot = self.inputs.get_mut(arg_index).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "argument index {} out of range for join {} with {} slots",
                arg_index, self.id, slot_count
            ))
        })?;
        if !slot.is_pending_on(from) {
            return Ok(false);
        }
        self.join_counter = self.join_counter.checked_sub(1).ok_or_else(|| {
            Error::InvalidOperation(format!("join counter of {} would go negative", self.id))
        })?;
        *slot = Slot::Filled(value);
        Ok(true)
    }

    /// Point the slot at `arg_index` at `to` instead of `from`.
    pub fn repoint(&mut self, arg_index: usize, from: &TaskId, to: TaskId) -> Result<bool> {
        let slot_count = self.inputs.len();
        let slot = self.inputs.get_mut(arg_index).ok_or_else(|| {
            Error::InvalidOperation(format!(
                "argument index {} out of range for join {} with {} slots",
                arg_index, self.id, slot_count
            ))
        })?;
        if !slot.is_pending_on(from) {
            return Ok(false);
        }
        *slot = Slot::Pending(to);
        Ok(true)
    }

    /// Values of every slot, in argument order. Errors while any is pending.
    pub fn filled_inputs(&self) -> Result<Vec<T::Output>> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Slot::Filled(value) => Ok(value.clone()),
                Slot::Pending(id) => Err(Error::InvalidOperation(format!(
                    "join {} executed with slot {} still waiting on {}",
                    self.id, i, id
                ))),
            })
            .collect()
    }
}

/// What a worker reports after splitting a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Decomposition<T: Task> {
    /// The decomposed task's id. It never reports a result of its own.
    pub parent: TaskId,
    pub parent_successor: Option<TaskId>,
    pub parent_arg_index: Option<usize>,
    pub elapsed: Duration,
    /// Stands in for the parent in the parent's successor.
    pub join: TaskNode<T>,
    pub children: Vec<TaskNode<T>>,
}

impl<T: Task> Decomposition<T> {
    /// Wire a parent, its children payloads and its successor payload.
    ///
    /// The Join inherits the parent's level, successor and argument index,
    /// waits on every child, and each child points back at the Join.
    pub fn wire(parent: &TaskNode<T>, children: Vec<T>, successor: T, elapsed: Duration) -> Self {
        let join_id = TaskId::new();
        let children: Vec<TaskNode<T>> = children
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let mut child = TaskNode::unit(payload, parent.level + 1, Some(i), Some(join_id));
                child.generation = parent.generation;
                child
            })
            .collect();

        let join = TaskNode {
            id: join_id,
            kind: TaskKind::Join,
            level: parent.level,
            arg_index: parent.arg_index,
            successor: parent.successor,
            join_counter: children.len(),
            inputs: children.iter().map(|c| Slot::Pending(c.id)).collect(),
            result: None,
            elapsed: Duration::ZERO,
            subtree_elapsed: Duration::ZERO,
            init_shared: None,
            generation: parent.generation,
            payload: successor,
        };

        Self {
            parent: parent.id,
            parent_successor: parent.successor,
            parent_arg_index: parent.arg_index,
            elapsed,
            join,
            children,
        }
    }
}

/// The final answer of a submitted root task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult<O> {
    value: O,
    /// Id of the node that produced the answer (the root or its level-0 Join).
    pub task_id: TaskId,
    /// Compute time summed over every node of the DAG.
    pub total_elapsed: Duration,
}

impl<O> TaskResult<O> {
    pub fn new(value: O, task_id: TaskId, total_elapsed: Duration) -> Self {
        Self {
            value,
            task_id,
            total_elapsed,
        }
    }

    pub fn value(&self) -> &O {
        &self.value
    }

    pub fn into_value(self) -> O {
        self.value
    }

    pub fn map<P>(self, f: impl FnOnce(O) -> P) -> TaskResult<P> {
        TaskResult {
            value: f(self.value),
            task_id: self.task_id,
            total_elapsed: self.total_elapsed,
        }
    }
}
