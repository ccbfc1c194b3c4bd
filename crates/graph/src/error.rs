//! Graph-specific error types.

use std::fmt;

use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by the dependency graph API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("vertex not found: {0}")]
    VertexNotFound(String),

    #[error("vertex already exists: {0}")]
    DuplicateVertex(String),
}

impl GraphError {
    pub fn vertex_not_found(key: impl fmt::Debug) -> Self {
        Self::VertexNotFound(format!("{key:?}"))
    }

    pub fn duplicate_vertex(key: impl fmt::Debug) -> Self {
        Self::DuplicateVertex(format!("{key:?}"))
    }
}

/// Errors raised by [`crate::UniqueStack`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StackError {
    /// The stack holds each element at most once.
    #[error("stack requires unique elements: {0}")]
    Duplicate(String),

    /// Popped or peeked an empty stack.
    #[error("stack is empty")]
    Empty,
}

impl StackError {
    pub fn duplicate(item: impl fmt::Debug) -> Self {
        Self::Duplicate(format!("{item:?}"))
    }
}
