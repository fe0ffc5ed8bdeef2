use thiserror::Error;

use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Interrupted: coordinator is shutting down")]
    Interrupted,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Task {id} failed: {reason}")]
    Task { id: TaskId, reason: String },

    #[error("Task error: {0}")]
    Collaborator(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Wrap a collaborator failure so it can be returned from `split`/`execute`.
    pub fn task(reason: impl Into<String>) -> Self {
        Error::Collaborator(reason.into())
    }

    pub fn transport(reason: impl std::fmt::Display) -> Self {
        Error::Transport(reason.to_string())
    }

    /// True for failures that mean the peer on the other side is gone.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
