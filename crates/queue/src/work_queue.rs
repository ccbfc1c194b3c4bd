//! Staleness analysis and worker dispatch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use ilmari_core::{MISSING, OracleMap, Timestamp};
use ilmari_graph::Graph;

use crate::error::{QueueError, Result};

/// Queue bookkeeping, guarded by the monitor.
///
/// `ready`, `in_progress`, `in_date` and the remainder of `out_of_date`
/// partition every analyzed artifact; `depends` maps each blocked artifact
/// to its still-unfinished out-of-date prerequisites.
#[derive(Debug)]
struct QueueState<K> {
    timestamps: HashMap<K, Timestamp>,
    depends: HashMap<K, HashSet<K>>,
    out_of_date: HashSet<K>,
    in_date: HashSet<K>,
    ready: HashSet<K>,
    in_progress: HashSet<K>,
    error: bool,
}

impl<K: Eq + Hash> QueueState<K> {
    fn empty() -> Self {
        Self {
            timestamps: HashMap::new(),
            depends: HashMap::new(),
            out_of_date: HashSet::new(),
            in_date: HashSet::new(),
            ready: HashSet::new(),
            in_progress: HashSet::new(),
            error: false,
        }
    }

    fn is_classified(&self, node: &K) -> bool {
        self.out_of_date.contains(node) || self.in_date.contains(node)
    }
}

/// A timestamp-driven incremental work queue.
///
/// Construction walks the prerequisite closure of `start` once, ages every
/// artifact through its kind's oracle, and splits the closure into
/// out-of-date and in-date sets. Worker threads then drain the queue
/// concurrently; a single monitor serializes all bookkeeping.
///
/// The graph must be acyclic (gate on [`Graph::is_cyclic`] first) and fully
/// built: the queue borrows it read-only for its whole life.
///
/// # Examples
///
/// ```
/// use ilmari_core::{MISSING, OracleMap};
/// use ilmari_graph::Graph;
/// use ilmari_queue::WorkQueue;
///
/// let mut g: Graph<&str, &str> = Graph::new();
/// g.add_vertex("out", "file").unwrap();
/// g.add_vertex("in", "file").unwrap();
/// g.add_edge(&"out", &"in").unwrap();
///
/// let mut oracles = OracleMap::new();
/// oracles.insert("file", |name: &&str| match *name {
///     "in" => 10,
///     _ => MISSING,
/// });
///
/// // "out" does not exist yet, so it is the one ready item.
/// let queue = WorkQueue::new(&g, &"out", oracles).unwrap();
/// assert_eq!(queue.ready_count(), 1);
/// assert_eq!(queue.get_item(false).unwrap(), Some("out"));
/// ```
pub struct WorkQueue<'g, K, V> {
    graph: &'g Graph<K, V>,
    oracles: OracleMap<V, K>,
    state: Mutex<QueueState<K>>,
    cond: Condvar,
}

impl<'g, K, V> WorkQueue<'g, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Eq + Hash + fmt::Debug,
{
    /// Build a queue over `graph` rooted at `start`, aging artifacts
    /// through `oracles`.
    ///
    /// If `start` and its whole prerequisite closure are current, the queue
    /// is born empty and [`Self::done`] is immediately true.
    ///
    /// # Errors
    ///
    /// [`QueueError::Graph`] if `start` or a traversed vertex is missing;
    /// [`QueueError::UnknownKind`] if a vertex value has no oracle.
    pub fn new(graph: &'g Graph<K, V>, start: &K, oracles: OracleMap<V, K>) -> Result<Self> {
        let mut state = QueueState::empty();
        Self::analyze(graph, &oracles, start, &mut state)?;

        debug!(
            out_of_date = state.out_of_date.len(),
            in_date = state.in_date.len(),
            ready = state.ready.len(),
            "staleness analysis complete"
        );

        Ok(Self {
            graph,
            oracles,
            state: Mutex::new(state),
            cond: Condvar::new(),
        })
    }

    /// Take one ready artifact, moving it into the in-progress set.
    ///
    /// Returns `Ok(None)` when no work remains (or will ever arrive). With
    /// `wait`, blocks until an artifact becomes ready or the queue
    /// finishes; a waiter woken by an abort observes completion and also
    /// gets `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Aborted`] if the error flag was already latched when
    /// the call was made.
    pub fn get_item(&self, wait: bool) -> Result<Option<K>> {
        let mut state = self.lock();

        if state.error {
            return Err(QueueError::Aborted);
        }
        if Self::is_done(&state) {
            return Ok(None);
        }

        if wait && state.ready.is_empty() {
            state = self
                .cond
                .wait_while(state, |s| !Self::is_done(s) && s.ready.is_empty())
                .unwrap_or_else(PoisonError::into_inner);

            if Self::is_done(&state) {
                return Ok(None);
            }
        }

        let item = state.ready.iter().next().cloned();
        if let Some(item) = item {
            state.ready.remove(&item);
            state.in_progress.insert(item.clone());
            trace!(item = ?item, "dispatched");
            Ok(Some(item))
        } else {
            Ok(None)
        }
    }

    /// Report that a dispatched artifact was rebuilt.
    ///
    /// Re-ages the artifact through its oracle, verifies it now postdates
    /// every direct prerequisite, retires it, and releases any dependent
    /// whose last unfinished prerequisite this was. Wakes every waiter on
    /// the done-transition, otherwise one waiter per newly ready artifact.
    ///
    /// # Errors
    ///
    /// [`QueueError::Aborted`] once the error flag is latched;
    /// [`QueueError::NotInProgress`] if the artifact was never dispatched;
    /// [`QueueError::StaleCompletion`] if a prerequisite is still newer -
    /// the worker claimed completion without refreshing the artifact.
    pub fn mark_done(&self, name: &K) -> Result<()> {
        let mut state = self.lock();

        if state.error {
            return Err(QueueError::Aborted);
        }
        if !state.in_progress.contains(name) {
            return Err(QueueError::not_in_progress(name));
        }

        let new_ts = Self::query(self.graph, &self.oracles, name)?;
        state.timestamps.insert(name.clone(), new_ts);

        for pred in self.graph.direct_predecessors(name)? {
            if state.timestamps.get(pred).copied().unwrap_or(MISSING) > new_ts {
                return Err(QueueError::stale_completion(name));
            }
        }

        state.out_of_date.remove(name);
        state.in_progress.remove(name);

        for succ in self.graph.direct_successors(name)? {
            // Dependents outside the analyzed closure carry no entry and
            // are not ours to release.
            let became_ready = match state.depends.get_mut(succ) {
                Some(blockers) => {
                    blockers.remove(name);
                    blockers.is_empty()
                }
                None => false,
            };

            if became_ready {
                state.depends.remove(succ);
                state.ready.insert(succ.clone());
                trace!(item = ?succ, "released");
            }
        }

        debug!(item = ?name, ts = new_ts, "completed");

        if Self::is_done(&state) {
            self.cond.notify_all();
        } else {
            for _ in 0..state.ready.len() {
                self.cond.notify_one();
            }
        }

        Ok(())
    }

    /// Latch the error flag and wake every waiter.
    ///
    /// One-way: from here on, [`Self::done`] reports true and guarded
    /// operations fail with [`QueueError::Aborted`].
    pub fn mark_error(&self) {
        let mut state = self.lock();
        state.error = true;
        debug!("work queue aborted");
        self.cond.notify_all();
    }

    /// Whether no work remains: nothing out-of-date, ready, or in
    /// progress - or the error flag is latched.
    #[must_use]
    pub fn done(&self) -> bool {
        Self::is_done(&self.lock())
    }

    /// Number of artifacts currently eligible for dispatch.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.lock().ready.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        // A poisoned monitor means a worker panicked mid-update; the
        // bookkeeping sections are short and leave the sets consistent, so
        // keep serving rather than propagate the poison.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_done(state: &QueueState<K>) -> bool {
        state.error
            || (state.out_of_date.is_empty()
                && state.ready.is_empty()
                && state.in_progress.is_empty())
    }

    /// One-time staleness analysis over the prerequisite closure of
    /// `start`.
    ///
    /// Explicit visit stack: a vertex is pushed unexpanded, re-pushed
    /// expanded beneath its unclassified prerequisites, and classified only
    /// once every direct prerequisite has been. Deep chains therefore
    /// cannot exhaust the call stack.
    fn analyze(
        graph: &Graph<K, V>,
        oracles: &OracleMap<V, K>,
        start: &K,
        state: &mut QueueState<K>,
    ) -> Result<()> {
        let mut visit: Vec<(K, bool)> = vec![(start.clone(), false)];
        let mut visiting: HashSet<K> = HashSet::new();

        while let Some((node, expanded)) = visit.pop() {
            if state.is_classified(&node) {
                continue;
            }

            if expanded {
                Self::classify(graph, oracles, node, state)?;
            } else {
                if !visiting.insert(node.clone()) {
                    // Already pending further down the stack. Cyclic inputs
                    // land here; their classification is unspecified and
                    // callers are expected to gate on is_cyclic.
                    continue;
                }
                visit.push((node.clone(), true));
                for pred in graph.direct_predecessors(&node)? {
                    if !state.is_classified(pred) && !visiting.contains(pred) {
                        visit.push((pred.clone(), false));
                    }
                }
            }
        }

        Ok(())
    }

    /// Decide one vertex, all of whose direct prerequisites are decided.
    ///
    /// Out-of-date iff the artifact is missing, any prerequisite is newer,
    /// or any prerequisite is itself out-of-date; in the last case the
    /// out-of-date prerequisites are recorded as the vertex's blockers,
    /// otherwise the vertex goes straight to ready.
    fn classify(
        graph: &Graph<K, V>,
        oracles: &OracleMap<V, K>,
        node: K,
        state: &mut QueueState<K>,
    ) -> Result<()> {
        let ts = Self::query(graph, oracles, &node)?;
        state.timestamps.insert(node.clone(), ts);

        let mut stale = ts == MISSING;
        let mut blockers: HashSet<K> = HashSet::new();

        for pred in graph.direct_predecessors(&node)? {
            if state.out_of_date.contains(pred) {
                blockers.insert(pred.clone());
            } else if state.timestamps.get(pred).copied().unwrap_or(MISSING) > ts {
                // Current prerequisite, but newer than us.
                stale = true;
            }
        }

        trace!(node = ?node, ts, stale, blockers = blockers.len(), "classified");

        if !blockers.is_empty() {
            state.out_of_date.insert(node.clone());
            state.depends.insert(node, blockers);
        } else if stale {
            state.out_of_date.insert(node.clone());
            state.ready.insert(node);
        } else {
            state.in_date.insert(node);
        }

        Ok(())
    }

    fn query(graph: &Graph<K, V>, oracles: &OracleMap<V, K>, name: &K) -> Result<Timestamp> {
        let kind = graph
            .get(name)
            .ok_or_else(|| ilmari_graph::GraphError::vertex_not_found(name))?;
        let oracle = oracles
            .get(kind)
            .ok_or_else(|| QueueError::unknown_kind(kind))?;
        Ok(oracle.timestamp(name))
    }
}
