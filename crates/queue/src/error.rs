//! Work-queue error types.

use std::fmt;

use ilmari_graph::GraphError;
use thiserror::Error;

/// Result type for work-queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by the work queue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The error flag is latched; the queue refuses further work.
    #[error("work queue aborted")]
    Aborted,

    /// A vertex value has no oracle registered for it.
    #[error("no timestamp rule for artifact kind: {0}")]
    UnknownKind(String),

    /// `mark_done` for an item that was never handed out.
    #[error("item is not in progress: {0}")]
    NotInProgress(String),

    /// A worker claimed completion but a prerequisite is still newer.
    #[error("item was not updated: {0}")]
    StaleCompletion(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl QueueError {
    pub fn unknown_kind(kind: impl fmt::Debug) -> Self {
        Self::UnknownKind(format!("{kind:?}"))
    }

    pub fn not_in_progress(name: impl fmt::Debug) -> Self {
        Self::NotInProgress(format!("{name:?}"))
    }

    pub fn stale_completion(name: impl fmt::Debug) -> Self {
        Self::StaleCompletion(format!("{name:?}"))
    }
}
