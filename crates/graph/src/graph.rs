//! Typed dependency graph over a petgraph arena.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{GraphError, Result};

/// A vertex: identity plus an opaque payload.
///
/// The work queue reads the payload as an artifact-kind tag selecting a
/// timestamp oracle; the graph itself never interprets it.
#[derive(Debug, Clone)]
pub(crate) struct Vertex<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

/// A directed dependency graph.
///
/// `add_edge(dst, src)` records "`dst` depends on `src`": `src` becomes a
/// *predecessor* (prerequisite) of `dst`, and `dst` a *successor*
/// (dependent) of `src`.
///
/// Storage is a [`DiGraph`] arena with a key index, so adjacency holds
/// indices rather than owned cross-links and cyclic inputs cannot leak.
///
/// # Examples
///
/// ```
/// use ilmari_graph::Graph;
///
/// let mut g: Graph<&str> = Graph::new();
/// g.add_vertex("foo.o", ()).unwrap();
/// g.add_vertex("foo.c", ()).unwrap();
/// g.add_edge(&"foo.o", &"foo.c").unwrap();
///
/// let prereqs: Vec<_> = g.direct_predecessors(&"foo.o").unwrap().collect();
/// assert_eq!(prereqs, vec![&"foo.c"]);
/// assert!(!g.is_cyclic());
/// ```
#[derive(Debug, Clone)]
pub struct Graph<K, V = ()> {
    graph: DiGraph<Vertex<K, V>, ()>,
    node_map: HashMap<K, NodeIndex>,
    root_nodes: HashSet<K>,
    leaf_nodes: HashSet<K>,
    direct_cyclic: bool,
}

impl<K, V> Graph<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            root_nodes: HashSet::new(),
            leaf_nodes: HashSet::new(),
            direct_cyclic: false,
        }
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether a key names a vertex.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.node_map.contains_key(key)
    }

    /// The payload of a vertex, if present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.node_map
            .get(key)
            .and_then(|idx| self.graph.node_weight(*idx))
            .map(|vertex| &vertex.value)
    }

    /// Insert a fresh vertex.
    ///
    /// A new vertex has no edges, so it joins both [`Self::root_nodes`] and
    /// [`Self::leaf_nodes`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateVertex`] if the key is already taken;
    /// a vertex is created exactly once per key.
    pub fn add_vertex(&mut self, key: K, value: V) -> Result<()> {
        if self.node_map.contains_key(&key) {
            return Err(GraphError::duplicate_vertex(&key));
        }

        let idx = self.graph.add_node(Vertex {
            key: key.clone(),
            value,
        });
        self.node_map.insert(key.clone(), idx);
        self.root_nodes.insert(key.clone());
        self.leaf_nodes.insert(key);

        Ok(())
    }

    /// Alias for [`Self::add_vertex`], mirroring map insertion.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_vertex`]: duplicate keys are rejected.
    pub fn set(&mut self, key: K, value: V) -> Result<()> {
        self.add_vertex(key, value)
    }

    /// Record that `dst` depends on `src`.
    ///
    /// Inserting the same edge twice is a no-op; the adjacency is a set. A
    /// self-edge (`src == dst`) is accepted and marks the graph directly
    /// cyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] if either endpoint is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use ilmari_graph::Graph;
    ///
    /// let mut g: Graph<&str> = Graph::new();
    /// g.add_vertex("binary", ()).unwrap();
    /// g.add_vertex("main.o", ()).unwrap();
    /// g.add_edge(&"binary", &"main.o").unwrap();
    ///
    /// assert!(!g.root_nodes().contains("binary"));
    /// assert!(!g.leaf_nodes().contains("main.o"));
    /// ```
    pub fn add_edge(&mut self, dst: &K, src: &K) -> Result<()> {
        let dst_idx = self.index(dst)?;
        let src_idx = self.index(src)?;

        if src == dst {
            self.direct_cyclic = true;
        }

        // Edges point from prerequisite to dependent, so "successors" are
        // outgoing neighbors.
        self.graph.update_edge(src_idx, dst_idx, ());
        self.root_nodes.remove(dst);
        self.leaf_nodes.remove(src);

        Ok(())
    }

    /// Record that `dst` depends on every key in `srcs`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] if `dst` or any source is
    /// missing; sources before the offending one are already linked.
    pub fn add_edges<'a, I>(&mut self, dst: &K, srcs: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        // Validate dst up front so an empty source list still reports it.
        self.index(dst)?;

        for src in srcs {
            self.add_edge(dst, src)?;
        }

        Ok(())
    }

    /// The direct prerequisites of a vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] for an unknown key.
    pub fn direct_predecessors(&self, key: &K) -> Result<impl Iterator<Item = &K> + '_> {
        let idx = self.index(key)?;
        Ok(self.neighbor_keys(idx, Direction::Incoming))
    }

    /// The direct dependents of a vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] for an unknown key.
    pub fn direct_successors(&self, key: &K) -> Result<impl Iterator<Item = &K> + '_> {
        let idx = self.index(key)?;
        Ok(self.neighbor_keys(idx, Direction::Outgoing))
    }

    /// Every transitive prerequisite of a vertex, each exactly once, the
    /// vertex itself excluded. Safe on cyclic graphs.
    ///
    /// Yields in LIFO discipline: vertices far from `key` surface before
    /// near ones, which lets the staleness analysis age the deepest
    /// prerequisites first.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] for an unknown key.
    pub fn all_predecessors(&self, key: &K) -> Result<Reachable<'_, K, V>> {
        let idx = self.index(key)?;
        Ok(Reachable::new(
            &self.graph,
            idx,
            Direction::Incoming,
            Order::Lifo,
        ))
    }

    /// Every transitive dependent of a vertex, each exactly once, the
    /// vertex itself excluded. Breadth-first. Safe on cyclic graphs.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::VertexNotFound`] for an unknown key.
    pub fn all_successors(&self, key: &K) -> Result<Reachable<'_, K, V>> {
        let idx = self.index(key)?;
        Ok(Reachable::new(
            &self.graph,
            idx,
            Direction::Outgoing,
            Order::Fifo,
        ))
    }

    /// `(key, value)` pairs for every vertex, in arbitrary order.
    pub fn items(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.graph
            .node_weights()
            .map(|vertex| (&vertex.key, &vertex.value))
    }

    /// Vertices with no prerequisites.
    #[must_use]
    pub fn root_nodes(&self) -> &HashSet<K> {
        &self.root_nodes
    }

    /// Vertices with no dependents.
    #[must_use]
    pub fn leaf_nodes(&self) -> &HashSet<K> {
        &self.leaf_nodes
    }

    fn index(&self, key: &K) -> Result<NodeIndex> {
        self.node_map
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::vertex_not_found(key))
    }

    fn neighbor_keys(
        &self,
        idx: NodeIndex,
        direction: Direction,
    ) -> impl Iterator<Item = &K> + '_ {
        self.graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|vertex| &vertex.key)
    }

    pub(crate) fn inner(&self) -> &DiGraph<Vertex<K, V>, ()> {
        &self.graph
    }

    pub(crate) fn has_self_loop(&self) -> bool {
        self.direct_cyclic
    }
}

impl<K, V> Default for Graph<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Traversal discipline for [`Reachable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    /// Deepest-first; distant vertices surface before near ones.
    Lifo,
    /// Breadth-first.
    Fifo,
}

/// Lazy transitive-reachability iterator.
///
/// Produced by [`Graph::all_predecessors`] and [`Graph::all_successors`].
/// Tracks visited vertices so each reachable vertex is yielded exactly once
/// even when the graph is cyclic.
pub struct Reachable<'g, K, V> {
    graph: &'g DiGraph<Vertex<K, V>, ()>,
    direction: Direction,
    order: Order,
    seen: HashSet<NodeIndex>,
    pending: VecDeque<NodeIndex>,
}

impl<'g, K, V> Reachable<'g, K, V> {
    fn new(
        graph: &'g DiGraph<Vertex<K, V>, ()>,
        start: NodeIndex,
        direction: Direction,
        order: Order,
    ) -> Self {
        let mut seen = HashSet::new();
        seen.insert(start);
        let pending = graph.neighbors_directed(start, direction).collect();

        Self {
            graph,
            direction,
            order,
            seen,
            pending,
        }
    }
}

impl<'g, K, V> Iterator for Reachable<'g, K, V> {
    type Item = &'g K;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let idx = match self.order {
                Order::Lifo => self.pending.pop_back()?,
                Order::Fifo => self.pending.pop_front()?,
            };

            if self.seen.insert(idx) {
                self.pending
                    .extend(self.graph.neighbors_directed(idx, self.direction));
                return self.graph.node_weight(idx).map(|vertex| &vertex.key);
            }
        }
    }
}
