//! Arena-based multi-layer graph: nodes, neighbor slots, and the forward
//! (live-list) chain used for full scans and persistence.
//!
//! Nodes live in a single `Vec<GraphNode>` owned by [`HnswGraph`]; a
//! [`NodeId`] is an index into that arena rather than a pointer, which is
//! what lets neighbor slots, the entry point, and the forward-chain link all
//! be plain `Copy` values instead of borrowed references.

use crate::metric::Metric;
use crate::panic_if;
use crate::vector::Vector;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Non-owning reference to a [`GraphNode`] within its owning [`HnswGraph`]'s
/// arena. Never valid across two different graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Per-layer adjacency: a capacity-bounded list of outgoing neighbors plus
/// an independently tracked in-degree (how many other nodes point back at
/// this node at this layer — not derivable from this node's own neighbors).
#[derive(Debug, Clone, Default)]
struct LayerSlots {
    neighbors: Vec<NodeId>,
    in_degree: u32,
}

/// A node in the multi-layer graph.
///
/// `level` is the top layer this node participates in; it has adjacency at
/// every layer from 0 up to and including `level`. `alive = false` marks a
/// logical delete: the node stays in the graph (and in the forward chain)
/// to preserve routing, but is excluded from query results.
#[derive(Debug, Clone)]
pub struct GraphNode {
    vector: Vector,
    level: u32,
    alive: bool,
    layers: Vec<LayerSlots>,
    next: Option<NodeId>,
}

impl GraphNode {
    fn new(vector: Vector, level: u32, m0: u32) -> Self {
        let layers = (0..=level)
            .map(|l| LayerSlots {
                neighbors: Vec::with_capacity(layer_capacity(l, m0) as usize),
                in_degree: 0,
            })
            .collect();
        Self {
            vector,
            level,
            alive: true,
            layers,
            next: None,
        }
    }

    /// The vector this node owns.
    #[must_use]
    pub fn vector(&self) -> &Vector {
        &self.vector
    }

    /// The top layer this node participates in.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// `false` if this node has been logically deleted.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Marks this node as logically deleted. Idempotent.
    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Forward-chain link to the next node, for full scans and persistence.
    #[must_use]
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    /// This node's current outgoing neighbors at `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds this node's own `level` — callers must
    /// check `level() >= level` first; a node has no adjacency above its
    /// own level.
    #[must_use]
    pub fn neighbors(&self, level: u32) -> &[NodeId] {
        &self.layers[level as usize].neighbors
    }

    /// Out-degree at `level`: the number of occupied neighbor slots.
    #[must_use]
    pub fn out_degree(&self, level: u32) -> u32 {
        self.layers[level as usize].neighbors.len() as u32
    }

    /// In-degree at `level`: how many other nodes list this node as a
    /// neighbor at that layer.
    #[must_use]
    pub fn in_degree(&self, level: u32) -> u32 {
        self.layers[level as usize].in_degree
    }

    fn capacity_at(&self, level: u32, m0: u32) -> usize {
        let _ = self;
        layer_capacity(level, m0) as usize
    }

    /// Appends `id` to this node's outgoing list at `level`.
    ///
    /// # Panics
    ///
    /// Panics if the layer is already at capacity — callers (the insertion
    /// and back-link algorithms) must never attempt to overflow a slot
    /// array; doing so is an internal-invariant violation, not a runtime
    /// condition.
    pub fn push_neighbor(&mut self, level: u32, id: NodeId, m0: u32) {
        let cap = self.capacity_at(level, m0);
        let slots = &mut self.layers[level as usize];
        panic_if!(
            slots.neighbors.len() >= cap,
            "neighbor array overflow at level {level}: capacity {cap}"
        );
        slots.neighbors.push(id);
    }

    /// Replaces this node's entire outgoing list at `level` with `ids`.
    ///
    /// # Panics
    ///
    /// Panics if `ids.len()` exceeds this layer's capacity.
    pub fn set_neighbors(&mut self, level: u32, ids: Vec<NodeId>, m0: u32) {
        let cap = self.capacity_at(level, m0);
        panic_if!(
            ids.len() > cap,
            "attempted to set {} neighbors at level {level}, capacity is {cap}",
            ids.len()
        );
        self.layers[level as usize].neighbors = ids;
    }

    fn inc_in_degree(&mut self, level: u32) {
        self.layers[level as usize].in_degree += 1;
    }

    /// Raw constructor used only by the persistence loader: builds a node
    /// directly from deserialized fields, skipping the capacity
    /// preallocation `GraphNode::new` does (each layer's `neighbors` is set
    /// to exactly the deserialized list rather than reserved to capacity).
    /// In-degree counters start at zero; the caller (the owning graph's
    /// loader) fills them in afterward via [`HnswGraph::recompute_in_degrees`].
    pub(crate) fn from_parts(vector: Vector, level: u32, alive: bool, neighbors: Vec<Vec<NodeId>>) -> Self {
        let layers = neighbors
            .into_iter()
            .map(|n| LayerSlots {
                neighbors: n,
                in_degree: 0,
            })
            .collect();
        Self {
            vector,
            level,
            alive,
            layers,
            next: None,
        }
    }

    fn dec_in_degree(&mut self, level: u32) {
        let slot = &mut self.layers[level as usize];
        panic_if!(
            slot.in_degree == 0,
            "in-degree underflow at level {level}"
        );
        slot.in_degree -= 1;
    }
}

/// Out-degree capacity for a given layer: `m0` at layer 0, `m0/2` above.
#[must_use]
pub fn layer_capacity(level: u32, m0: u32) -> u32 {
    if level == 0 {
        m0
    } else {
        (m0 / 2).max(1)
    }
}

/// The owning arena plus dynamic HNSW state: entry point, top level, element
/// count, and the head of the forward (live-list) chain.
///
/// This is the `IndexHNSW` of the design: it owns every [`GraphNode`] and is
/// mutated exclusively by the façade's locked operations. It does not itself
/// perform id-based duplicate detection — that is the id-map's job, one
/// layer up.
#[derive(Debug)]
pub struct HnswGraph {
    nodes: Vec<GraphNode>,
    entry_point: Option<NodeId>,
    top_level: u32,
    head: Option<NodeId>,
    pub(crate) metric: Metric,
    pub(crate) dims: u32,
    pub(crate) dims_aligned: u32,
    pub(crate) m0: u32,
    pub(crate) ef_construct: u32,
    pub(crate) ef_search: u32,
    pub(crate) rng: ChaCha8Rng,
    level_mult: f64,
}

impl HnswGraph {
    /// Builds an empty graph for the given configuration.
    #[must_use]
    pub fn new(
        metric: Metric,
        dims: u32,
        m0: u32,
        ef_construct: u32,
        ef_search: u32,
        rng: ChaCha8Rng,
    ) -> Self {
        let dims_aligned = crate::vector::dims_aligned(dims);
        let level_mult = 1.0 / f64::from(m0 / 2).max(2.0).ln();
        Self {
            nodes: Vec::new(),
            entry_point: None,
            top_level: 0,
            head: None,
            metric,
            dims,
            dims_aligned,
            m0,
            ef_construct,
            ef_search,
            rng,
            level_mult,
        }
    }

    /// Number of live and dead nodes currently in the arena.
    #[must_use]
    pub fn elements(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the graph has no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The current entry point, if any node has been inserted.
    #[must_use]
    pub fn entry_point(&self) -> Option<NodeId> {
        self.entry_point
    }

    /// The highest level any node currently occupies.
    #[must_use]
    pub fn top_level(&self) -> u32 {
        self.top_level
    }

    /// The head of the forward (live-list) chain, for full scans.
    #[must_use]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    /// Borrows a node by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not refer to a node in this arena — an
    /// out-of-range `NodeId` is always an internal-invariant violation,
    /// since ids are only ever handed out by this graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0 as usize]
    }

    /// Mutably borrows a node by id. See [`HnswGraph::node`] for panics.
    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Draws this node's sampled level: `floor(-ln(U) / ln(M0/2))`, `U`
    /// uniform on the open interval `(0, 1)`.
    pub fn sample_level(&mut self) -> u32 {
        let u: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-u.ln() * self.level_mult).floor() as u32
    }

    /// Allocates a fresh node for `vector` at the given sampled `level` and
    /// links it at the head of the forward chain. Returns its `NodeId`.
    ///
    /// This does not run any HNSW wiring — it only reserves the arena slot
    /// and the adjacency arrays; callers (the insertion algorithm) are
    /// responsible for connecting edges afterward.
    pub fn alloc_node(&mut self, vector: Vector, level: u32) -> NodeId {
        let mut node = GraphNode::new(vector, level, self.m0);
        node.next = self.head;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.head = Some(id);
        id
    }

    /// Connects a directed edge `from -> to` at `level` by appending to
    /// `from`'s outgoing list and incrementing `to`'s in-degree counter.
    ///
    /// # Panics
    ///
    /// Panics if `from`'s outgoing list at `level` is already full — callers
    /// must only call this when they know there is room (a fresh node's
    /// out-degree starts at 0, so this never overflows during initial
    /// wiring).
    pub fn connect(&mut self, from: NodeId, to: NodeId, level: u32) {
        self.node_mut(from).push_neighbor(level, to, self.m0);
        self.node_mut(to).inc_in_degree(level);
    }

    /// Removes the directed edge `from -> to` at `level`, if present,
    /// decrementing `to`'s in-degree. Used when shrinking a saturated
    /// neighbor list before rebuilding it.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId, level: u32) {
        let slots = &mut self.node_mut(from).layers[level as usize];
        if let Some(pos) = slots.neighbors.iter().position(|&n| n == to) {
            slots.neighbors.remove(pos);
            self.node_mut(to).dec_in_degree(level);
        }
    }

    /// Promotes `node` to entry point, updating `top_level` to match.
    pub fn set_entry_point(&mut self, node: NodeId, level: u32) {
        self.entry_point = Some(node);
        self.top_level = level;
    }

    /// Computes the distance between the query and the vector owned by `node`.
    #[must_use]
    pub fn distance_to(&self, query: &[f32], node: NodeId) -> f32 {
        self.metric.compare(query, self.node(node).vector().payload())
    }

    /// Computes the distance between the vectors owned by two nodes.
    #[must_use]
    pub fn pairwise_distance(&self, a: NodeId, b: NodeId) -> f32 {
        self.metric
            .compare(self.node(a).vector().payload(), self.node(b).vector().payload())
    }

    /// Iterates every node in the arena in on-disk order (`NodeId(0), NodeId(1), ...`).
    ///
    /// This is the order the persistence module serializes nodes in: since
    /// `NodeId` is already an arena index, it doubles as the on-disk node
    /// position and needs no separate offset-resolution pass on load.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Raw constructor used only by the persistence loader: rebuilds a graph
    /// directly from already-deserialized nodes rather than replaying
    /// `graph_insert` for each one.
    ///
    /// `nodes` must be in arena order (index `i` is `NodeId(i)`); in-degree
    /// counters are expected to already be zeroed and are filled in by a
    /// follow-up call to [`HnswGraph::recompute_in_degrees`].
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        metric: Metric,
        dims: u32,
        m0: u32,
        ef_construct: u32,
        ef_search: u32,
        rng: ChaCha8Rng,
        nodes: Vec<GraphNode>,
        entry_point: Option<NodeId>,
        top_level: u32,
    ) -> Self {
        let dims_aligned = crate::vector::dims_aligned(dims);
        let level_mult = 1.0 / f64::from(m0 / 2).max(2.0).ln();
        // Forward chain mirrors arena order: last node pushed is head.
        let head = if nodes.is_empty() {
            None
        } else {
            Some(NodeId((nodes.len() - 1) as u32))
        };
        let mut graph = Self {
            nodes,
            entry_point,
            top_level,
            head,
            metric,
            dims,
            dims_aligned,
            m0,
            ef_construct,
            ef_search,
            rng,
            level_mult,
        };
        for i in (0..graph.nodes.len()).rev() {
            graph.nodes[i].next = if i == 0 {
                None
            } else {
                Some(NodeId((i - 1) as u32))
            };
        }
        graph.recompute_in_degrees();
        graph
    }

    /// Recomputes every node's in-degree counters at every layer by walking
    /// each node's outgoing edges — the load-time step that makes in-degree
    /// independent of whatever was serialized for it.
    pub(crate) fn recompute_in_degrees(&mut self) {
        for node in &mut self.nodes {
            for layer in &mut node.layers {
                layer.in_degree = 0;
            }
        }
        let mut edges: Vec<(NodeId, u32)> = Vec::new();
        for node in &self.nodes {
            for level in 0..=node.level {
                for &to in &node.layers[level as usize].neighbors {
                    edges.push((to, level));
                }
            }
        }
        for (to, level) in edges {
            self.nodes[to.0 as usize].layers[level as usize].in_degree += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vector;
    use rand_chacha::rand_core::SeedableRng;

    fn test_graph(m0: u32) -> HnswGraph {
        HnswGraph::new(
            Metric::L2Squared,
            4,
            m0,
            32,
            16,
            ChaCha8Rng::seed_from_u64(1),
        )
    }

    #[test]
    fn layer_capacity_halves_above_base_layer() {
        assert_eq!(layer_capacity(0, 32), 32);
        assert_eq!(layer_capacity(1, 32), 16);
        assert_eq!(layer_capacity(2, 32), 16);
    }

    #[test]
    fn alloc_node_links_forward_chain_at_head() {
        let mut g = test_graph(8);
        let v1 = Vector::new(1, 0, 4, &[0.0, 0.0, 0.0, 0.0]);
        let v2 = Vector::new(2, 0, 4, &[1.0, 1.0, 1.0, 1.0]);
        let a = g.alloc_node(v1, 0);
        let b = g.alloc_node(v2, 0);
        assert_eq!(g.head(), Some(b));
        assert_eq!(g.node(b).next(), Some(a));
        assert_eq!(g.node(a).next(), None);
    }

    #[test]
    fn connect_updates_out_and_in_degree_on_both_sides() {
        let mut g = test_graph(8);
        let v1 = Vector::new(1, 0, 4, &[0.0, 0.0, 0.0, 0.0]);
        let v2 = Vector::new(2, 0, 4, &[1.0, 1.0, 1.0, 1.0]);
        let a = g.alloc_node(v1, 0);
        let b = g.alloc_node(v2, 0);
        g.connect(a, b, 0);
        assert_eq!(g.node(a).out_degree(0), 1);
        assert_eq!(g.node(a).neighbors(0), &[b]);
        assert_eq!(g.node(b).in_degree(0), 1);
    }

    #[test]
    fn disconnect_reverses_connect() {
        let mut g = test_graph(8);
        let v1 = Vector::new(1, 0, 4, &[0.0, 0.0, 0.0, 0.0]);
        let v2 = Vector::new(2, 0, 4, &[1.0, 1.0, 1.0, 1.0]);
        let a = g.alloc_node(v1, 0);
        let b = g.alloc_node(v2, 0);
        g.connect(a, b, 0);
        g.disconnect(a, b, 0);
        assert_eq!(g.node(a).out_degree(0), 0);
        assert_eq!(g.node(b).in_degree(0), 0);
    }

    #[test]
    #[should_panic(expected = "neighbor array overflow")]
    fn push_neighbor_panics_when_layer_is_full() {
        let mut g = test_graph(2);
        let v1 = Vector::new(1, 0, 4, &[0.0, 0.0, 0.0, 0.0]);
        let v2 = Vector::new(2, 0, 4, &[1.0, 1.0, 1.0, 1.0]);
        let v3 = Vector::new(3, 0, 4, &[2.0, 2.0, 2.0, 2.0]);
        let v4 = Vector::new(4, 0, 4, &[3.0, 3.0, 3.0, 3.0]);
        let a = g.alloc_node(v1, 0);
        let b = g.alloc_node(v2, 0);
        let c = g.alloc_node(v3, 0);
        let d = g.alloc_node(v4, 0);
        g.connect(a, b, 0);
        g.connect(a, c, 0);
        g.connect(a, d, 0); // capacity is 2, this overflows
    }

    #[test]
    fn sample_level_is_usually_zero_for_typical_m0() {
        let mut g = test_graph(32);
        let samples: Vec<u32> = (0..1000).map(|_| g.sample_level()).collect();
        let zero_count = samples.iter().filter(|&&l| l == 0).count();
        assert!(zero_count > 800, "level 0 should dominate, got {zero_count}/1000");
    }

    #[test]
    fn set_entry_point_updates_top_level() {
        let mut g = test_graph(8);
        let v1 = Vector::new(1, 0, 4, &[0.0, 0.0, 0.0, 0.0]);
        let a = g.alloc_node(v1, 3);
        g.set_entry_point(a, 3);
        assert_eq!(g.entry_point(), Some(a));
        assert_eq!(g.top_level(), 3);
    }
}
