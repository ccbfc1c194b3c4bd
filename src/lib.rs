//! # Ilmari
//!
//! Incremental build core: a typed dependency graph with cycle detection
//! and a timestamp-driven work queue that feeds concurrent workers.
//!
//! The usual flow:
//!
//! 1. Build a [`Graph`] of artifacts - one vertex per file or target, one
//!    edge per "depends on". [`ilmari_deps`] can extract the edges for C
//!    sources from the compiler.
//! 2. Reject cyclic inputs with [`Graph::is_cyclic`].
//! 3. Construct a [`WorkQueue`] over the graph root with one timestamp
//!    [`Oracle`] per artifact kind - [`TimestampStore::time_or_missing`]
//!    is a ready-made oracle for store-backed artifacts.
//! 4. Let workers drain the queue: [`WorkQueue::get_item`], rebuild,
//!    [`WorkQueue::mark_done`]; on failure [`WorkQueue::mark_error`].

#![forbid(unsafe_code)]

pub use ilmari_core::{MISSING, Oracle, OracleMap, Timestamp};
pub use ilmari_deps as deps;
pub use ilmari_graph::{Graph, GraphError, Reachable, StackError, UniqueStack};
pub use ilmari_queue::{QueueError, WorkQueue};
pub use ilmari_store::{StoreError, TimestampStore};
