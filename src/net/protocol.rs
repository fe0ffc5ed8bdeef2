//! Handshake and client messages on the TCP front door.
//!
//! Workers exchange [`ToWorker`](crate::system::ToWorker) and
//! [`ToSpace`](crate::system::ToSpace) frames once registered; clients
//! speak the request/reply pair below.

use serde::{Deserialize, Serialize};

use crate::core::task::{Task, TaskId, TaskResult};

/// First frame a peer sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Hello {
    Worker { parallelism: usize },
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "", rename_all = "snake_case")]
pub enum ClientRequest<T: Task> {
    /// Submit a root task, optionally with an initial shared value.
    Submit { task: T, shared: Option<T::Shared> },
    /// Block until the next final result.
    Take,
    /// Shut the cluster down.
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "", rename_all = "snake_case")]
pub enum ClientReply<T: Task> {
    Accepted { task_id: TaskId },
    Result { result: TaskResult<T::Output> },
    Stopped,
    Error { message: String },
}
