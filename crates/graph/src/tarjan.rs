//! Tarjan's strongly connected components and cycle detection.
//!
//! Each vertex gets a discovery `index` and a `lowlink` (the smallest index
//! reachable from it); a vertex whose lowlink equals its own index is the
//! root of a component, and the component is everything above it on the
//! stack. Runs in O(V + E).
//!
//! The walk keeps its own frame stack instead of recursing, so chains tens
//! of thousands of vertices deep cannot exhaust the call stack.

use std::fmt;
use std::hash::Hash;

use im::HashMap as ImHashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rand::seq::SliceRandom;

use crate::graph::{Graph, Vertex};
use crate::unique_stack::UniqueStack;

/// One suspended visit in the iterative walk.
#[derive(Debug)]
struct Frame {
    node: NodeIndex,
    successors: Vec<NodeIndex>,
    cursor: usize,
}

/// Walker state shared across the whole traversal: discovery indices,
/// lowlinks, the component stack, and the finished components.
#[derive(Debug, Default)]
struct TarjanWalker {
    next_index: usize,
    indices: ImHashMap<NodeIndex, usize>,
    lowlinks: ImHashMap<NodeIndex, usize>,
    stack: UniqueStack<NodeIndex>,
    components: Vec<Vec<NodeIndex>>,
}

impl TarjanWalker {
    fn new() -> Self {
        Self::default()
    }

    /// Visit every vertex reachable from `root` that has no index yet.
    fn walk<N, E>(&mut self, graph: &DiGraph<N, E>, root: NodeIndex) {
        if self.indices.contains_key(&root) {
            return;
        }

        let mut frames = vec![self.open(graph, root)];

        loop {
            let (node, next) = {
                let Some(frame) = frames.last_mut() else { break };
                let next = frame.successors.get(frame.cursor).copied();
                if next.is_some() {
                    frame.cursor = frame.cursor.saturating_add(1);
                }
                (frame.node, next)
            };

            match next {
                Some(succ) if !self.indices.contains_key(&succ) => {
                    frames.push(self.open(graph, succ));
                }
                Some(succ) => {
                    // Back edge to a vertex still on the stack pulls our
                    // lowlink down to its index; anything else is a cross
                    // edge into a finished component and is ignored.
                    if self.stack.contains(&succ) {
                        let succ_index = self.indices.get(&succ).copied().unwrap_or(0);
                        self.relax(node, succ_index);
                    }
                }
                None => {
                    frames.pop();

                    let index = self.indices.get(&node).copied().unwrap_or(0);
                    let lowlink = self.lowlinks.get(&node).copied().unwrap_or(index);
                    if index == lowlink {
                        self.close_component(node);
                    }

                    if let Some(parent) = frames.last() {
                        self.relax(parent.node, lowlink);
                    }
                }
            }
        }
    }

    /// Assign discovery index and lowlink, push onto the component stack,
    /// and snapshot the successor list for later resumption.
    fn open<N, E>(&mut self, graph: &DiGraph<N, E>, node: NodeIndex) -> Frame {
        let index = self.next_index;
        self.next_index = self.next_index.saturating_add(1);
        self.indices.insert(node, index);
        self.lowlinks.insert(node, index);

        // An unvisited vertex is never already on the stack.
        let pushed = self.stack.push(node);
        debug_assert!(pushed.is_ok());

        Frame {
            node,
            successors: graph
                .neighbors_directed(node, Direction::Outgoing)
                .collect(),
            cursor: 0,
        }
    }

    fn relax(&mut self, node: NodeIndex, candidate: usize) {
        let current = self.lowlinks.get(&node).copied().unwrap_or(candidate);
        if candidate < current {
            self.lowlinks.insert(node, candidate);
        }
    }

    /// Pop the stack down to and including `root`, forming one component.
    fn close_component(&mut self, root: NodeIndex) {
        let mut component = Vec::new();
        while let Ok(node) = self.stack.pop() {
            component.push(node);
            if node == root {
                break;
            }
        }
        self.components.push(component);
    }
}

impl<K, V> Graph<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Strongly connected components, one `Vec` per component.
    ///
    /// Singleton components are included, so an acyclic graph produces
    /// exactly one component per vertex.
    #[must_use]
    pub fn sccs(&self) -> Vec<Vec<K>> {
        self.run_tarjan(false)
    }

    /// Like [`Self::sccs`], but the outer iteration over vertices is
    /// shuffled. Component count is unaffected; component order and
    /// membership order may differ between calls.
    #[must_use]
    pub fn sccs_shuffled(&self) -> Vec<Vec<K>> {
        self.run_tarjan(true)
    }

    /// Whether the graph contains a cycle.
    ///
    /// True iff a self-edge was inserted or some component spans more than
    /// one vertex (fewer components than vertices).
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        self.has_self_loop() || self.sccs().len() != self.len()
    }

    /// [`Self::is_cyclic`] over a shuffled vertex order. The answer is the
    /// same for every order; the shuffle only exercises that property.
    #[must_use]
    pub fn is_cyclic_shuffled(&self) -> bool {
        self.has_self_loop() || self.sccs_shuffled().len() != self.len()
    }

    fn run_tarjan(&self, shuffle: bool) -> Vec<Vec<K>> {
        let graph: &DiGraph<Vertex<K, V>, ()> = self.inner();

        let mut order: Vec<NodeIndex> = graph.node_indices().collect();
        if shuffle {
            order.shuffle(&mut rand::thread_rng());
        }

        let mut walker = TarjanWalker::new();
        for node in order {
            walker.walk(graph, node);
        }

        walker
            .components
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .filter_map(|idx| graph.node_weight(idx))
                    .map(|vertex| vertex.key.clone())
                    .collect()
            })
            .collect()
    }
}
