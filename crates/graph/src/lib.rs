//! # Ilmari Graph
//!
//! Dependency graph for the Ilmari build core. Vertices carry an opaque
//! value (the work queue uses it as an artifact-kind tag); edges record
//! "depends on" relationships. The graph offers reachability traversals in
//! both directions and cycle detection via Tarjan's strongly connected
//! components.
//!
//! The graph is not thread-safe: build it fully, check it with
//! [`Graph::is_cyclic`], then treat it as read-only.

#![forbid(unsafe_code)]

mod error;
mod graph;
mod tarjan;
mod unique_stack;

pub use error::{GraphError, Result, StackError};
pub use graph::{Graph, Reachable};
pub use unique_stack::UniqueStack;
