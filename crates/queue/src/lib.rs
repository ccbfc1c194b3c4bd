//! # Ilmari Queue
//!
//! Timestamp-driven incremental work queue. Given a read-only dependency
//! graph, a root artifact, and one timestamp oracle per artifact kind, the
//! queue decides once which artifacts are out-of-date, then hands them to
//! worker threads in an order that never releases a dependent before its
//! prerequisites are rebuilt.
//!
//! Worker contract: loop on [`WorkQueue::get_item`] with `wait = true`;
//! rebuild the returned artifact so its externally visible timestamp
//! advances; report with [`WorkQueue::mark_done`]. On failure call
//! [`WorkQueue::mark_error`] and exit - every blocked worker wakes and
//! drains.

#![forbid(unsafe_code)]

mod error;
mod work_queue;

pub use error::{QueueError, Result};
pub use work_queue::WorkQueue;
