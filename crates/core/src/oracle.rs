//! Timestamp oracles and per-kind dispatch.
//!
//! The work queue never touches the filesystem itself. Callers supply one
//! oracle per artifact kind; the queue selects the oracle through the value
//! stored on the graph vertex.

use std::collections::HashMap;
use std::hash::Hash;

use crate::{MISSING, Timestamp};

/// A caller-supplied source of artifact ages.
///
/// Contract:
/// - larger return values are newer;
/// - [`MISSING`] is returned for artifacts that do not exist;
/// - repeated queries for the same name during a single analysis are
///   idempotent and side-effect-free;
/// - implementations may be called from any thread.
pub trait Oracle<K: ?Sized>: Send + Sync {
    /// Current age of the named artifact, or [`MISSING`].
    fn timestamp(&self, name: &K) -> Timestamp;
}

impl<K: ?Sized, F> Oracle<K> for F
where
    F: Fn(&K) -> Timestamp + Send + Sync,
{
    fn timestamp(&self, name: &K) -> Timestamp {
        self(name)
    }
}

/// Dispatch table from artifact kind to its oracle.
///
/// The kind is whatever value type the graph stores on its vertices - an
/// enum of artifact kinds in the common case.
///
/// # Examples
///
/// ```
/// use ilmari_core::{MISSING, OracleMap, Timestamp};
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// enum Kind {
///     File,
/// }
///
/// let mut oracles: OracleMap<Kind, str> = OracleMap::new();
/// oracles.insert(Kind::File, |name: &str| {
///     if name == "main.c" { 42 } else { MISSING }
/// });
///
/// let oracle = oracles.get(&Kind::File).unwrap();
/// assert_eq!(oracle.timestamp("main.c"), 42);
/// assert_eq!(oracle.timestamp("gone.c"), MISSING);
/// ```
pub struct OracleMap<T, K: ?Sized> {
    rules: HashMap<T, Box<dyn Oracle<K>>>,
}

impl<T: Eq + Hash, K: ?Sized> OracleMap<T, K> {
    /// Create an empty dispatch table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register the oracle for an artifact kind, replacing any previous one.
    pub fn insert(&mut self, kind: T, oracle: impl Oracle<K> + 'static) {
        self.rules.insert(kind, Box::new(oracle));
    }

    /// Look up the oracle for a kind.
    #[must_use]
    pub fn get(&self, kind: &T) -> Option<&dyn Oracle<K>> {
        self.rules.get(kind).map(|rule| rule.as_ref())
    }

    /// Whether a kind has a registered oracle.
    #[must_use]
    pub fn contains(&self, kind: &T) -> bool {
        self.rules.contains_key(kind)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T: Eq + Hash, K: ?Sized> Default for OracleMap<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K: ?Sized> std::fmt::Debug for OracleMap<T, K>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleMap")
            .field("kinds", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A convenience oracle that always reports [`MISSING`].
///
/// Useful as a stand-in for kinds whose artifacts are never up to date, e.g.
/// phony targets that must always rebuild.
#[must_use]
pub fn always_missing<K: ?Sized>() -> impl Oracle<K> {
    |_: &K| MISSING
}
