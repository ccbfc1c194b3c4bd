//! Artifact age scalar.

/// Age of a build artifact. Larger values are newer.
pub type Timestamp = i64;

/// Age reported for artifacts that do not exist.
///
/// An artifact with this age is infinitely old: it is always out-of-date and
/// never newer than anything it feeds into.
pub const MISSING: Timestamp = -1;
