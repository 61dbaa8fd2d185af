use std::error::Error as StdError;

/// Why a task did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// Cancelled by the caller, by a deadline or by shutdown. Never reported to `on_error`.
    #[error("task was cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync>),
}

impl TaskError {
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        TaskError::Failed(err.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskManagerError {
    #[error("task manager is closed")]
    Closed,

    #[error("task manager is already closed")]
    AlreadyClosed,
}
