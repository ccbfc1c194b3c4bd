//! # Ilmari Core
//!
//! Shared types for the Ilmari build core: the artifact age scalar and the
//! caller-supplied timestamp oracle interface that the work queue dispatches
//! through.

#![forbid(unsafe_code)]

mod oracle;
mod timestamp;

pub use oracle::{Oracle, OracleMap};
pub use timestamp::{MISSING, Timestamp};
