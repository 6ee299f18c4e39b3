//! Per-query search context and the layer-search / k-NN query algorithms.

use super::graph::{HnswGraph, NodeId};
use crate::heap::{Heap, HeapMode, HeapNode};
use crate::idmap::IdMap;
use crate::metric::Metric;

/// A single search's scope-local working state: the query payload, the
/// active comparator, and whether logically-deleted nodes should be
/// admitted into results.
///
/// Built once per query and reused across every layer that query visits;
/// it never outlives the call that created it and holds no lock itself —
/// the façade holds the index lock, this is a plain stack value.
pub struct SearchContext<'a> {
    query: &'a [f32],
    dims_aligned: u32,
    metric: Metric,
    /// Off during greedy descent (dead nodes still route traffic), on at
    /// the base layer (dead nodes are excluded from answers).
    pub filter_alive: bool,
}

impl<'a> SearchContext<'a> {
    /// Builds a search context over an already dims-aligned, zero-padded
    /// query buffer.
    #[must_use]
    pub fn new(query: &'a [f32], dims_aligned: u32, metric: Metric) -> Self {
        Self {
            query,
            dims_aligned,
            metric,
            filter_alive: false,
        }
    }

    /// The query payload this context searches for.
    #[must_use]
    pub fn query(&self) -> &[f32] {
        self.query
    }

    #[must_use]
    fn dims_aligned(&self) -> u32 {
        self.dims_aligned
    }
}

/// Traversal-length safety cap, expressed as a multiple of `ef`: if a single
/// `search_layer` call expands more candidates than this, it stops early
/// and logs a warning rather than looping indefinitely on a pathological or
/// corrupted graph. Documented-algorithm behavior on well-formed graphs is
/// unaffected — this bound is never hit there.
const MAX_TRAVERSAL_MULT: usize = 10;

/// Best-first traversal of a single layer of the graph.
///
/// Maintains a best-top candidate heap `C` (unbounded), a worst-top result
/// heap `W` (bounded by `ef`), and a visited set. Returns `W`.
pub fn search_layer(
    graph: &HnswGraph,
    sc: &SearchContext<'_>,
    entry_points: &[NodeId],
    ef: usize,
    level: u32,
) -> Heap<NodeId> {
    debug_assert_eq!(
        sc.dims_aligned(),
        graph.dims_aligned,
        "search context built for a different index's dims_aligned"
    );
    let is_better = graph.metric.is_better_fn();
    let mut visited = IdMap::new(ef.max(16) * 2, crate::idmap::DEFAULT_LOAD_FACTOR_THRESHOLD);
    let mut c: Heap<NodeId> = Heap::new(HeapMode::BestTop, None, is_better);
    let mut w: Heap<NodeId> = Heap::new(HeapMode::WorstTop, Some(ef.max(1)), is_better);

    for &ep in entry_points {
        if visited.has(u64::from(ep.0)) {
            continue;
        }
        visited.insert(u64::from(ep.0), 1);
        let d = graph.distance_to(sc.query(), ep);
        c.insert(HeapNode::new(d, ep))
            .expect("unbounded candidate heap never reports full");
        if !sc.filter_alive || graph.node(ep).is_alive() {
            w.insert_or_replace_if_better(HeapNode::new(d, ep));
        }
    }

    let expansion_cap = ef.max(1).saturating_mul(MAX_TRAVERSAL_MULT);
    let mut expansions = 0usize;

    while let Ok(candidate) = c.pop() {
        expansions += 1;
        if expansions > expansion_cap {
            log::warn!(
                "search_layer: traversal safety cap hit at level {level} (ef={ef}, expansions={expansions})"
            );
            break;
        }

        if w.full() {
            let worst = w.peek().expect("full implies non-empty").distance;
            if is_better(worst, candidate.distance) {
                break;
            }
        }

        let cur = candidate.payload;
        if graph.node(cur).level() < level {
            continue;
        }

        for &n in graph.node(cur).neighbors(level) {
            if visited.has(u64::from(n.0)) {
                continue;
            }
            visited.insert(u64::from(n.0), 1);
            let d = graph.distance_to(sc.query(), n);

            let admit_to_candidates = !w.full()
                || is_better(d, w.peek().expect("full implies non-empty").distance);
            if !admit_to_candidates {
                continue;
            }
            c.insert(HeapNode::new(d, n))
                .expect("unbounded candidate heap never reports full");

            if !sc.filter_alive || graph.node(n).is_alive() {
                w.insert_or_replace_if_better(HeapNode::new(d, n));
            }
        }
    }

    w
}

fn sorted_best_first(graph: &HnswGraph, heap: Heap<NodeId>) -> Vec<(u64, f32)> {
    let is_better = graph.metric.is_better_fn();
    let mut items = heap.into_vec();
    items.sort_by(|a, b| {
        if is_better(a.distance, b.distance) {
            std::cmp::Ordering::Less
        } else if is_better(b.distance, a.distance) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
    items
        .into_iter()
        .map(|n| (graph.node(n.payload).vector().id(), n.distance))
        .collect()
}

/// Runs a k-NN query: greedy descent through the upper layers followed by a
/// bounded best-first search at layer 0, trimmed to the best `k` results.
///
/// `query` must already be the dims-aligned, zero-padded payload.
///
/// # Panics
///
/// Panics if the graph is empty — callers must check `IndexEmpty` before
/// calling this.
#[must_use]
pub fn graph_knn_search(graph: &HnswGraph, query: &[f32], k: usize) -> Vec<(u64, f32)> {
    let entry = graph.entry_point().expect("graph_knn_search called on an empty graph");
    let mut sc = SearchContext::new(query, graph.dims_aligned, graph.metric);

    let mut current = entry;
    for level in (1..=graph.top_level()).rev() {
        sc.filter_alive = false;
        let w = search_layer(graph, &sc, std::slice::from_ref(&current), 1, level);
        if let Ok(best) = w.peek() {
            current = best.payload;
        }
    }

    let ef = graph.ef_search.max(2 * k as u32) as usize;
    log::debug!("graph_knn_search: using ef={ef} for k={k} (configured ef_search={})", graph.ef_search);
    sc.filter_alive = true;
    let mut w = search_layer(graph, &sc, std::slice::from_ref(&current), ef, 0);

    while w.size() > k {
        w.pop().expect("loop invariant: heap non-empty while size > k");
    }

    sorted_best_first(graph, w)
}

/// Full linear scan of the forward chain, restricted to alive nodes whose
/// tag shares at least one bit with `tag_mask`.
///
/// HNSW's graph invariants are built without knowledge of tags; searching
/// only the graph under an arbitrary subset filter can silently return
/// wrong (disconnected) results, so a tag-filtered query instead pays
/// linear cost for correctness.
#[must_use]
pub fn linear_tag_search(graph: &HnswGraph, query: &[f32], tag_mask: u64, k: usize) -> Vec<(u64, f32)> {
    let is_better = graph.metric.is_better_fn();
    let mut heap: Heap<NodeId> = Heap::new(HeapMode::WorstTop, Some(k), is_better);

    let mut cursor = graph.head();
    while let Some(id) = cursor {
        let node = graph.node(id);
        if node.is_alive() && (node.vector().tag() & tag_mask != 0) {
            let d = graph.distance_to(query, id);
            heap.insert_or_replace_if_better(HeapNode::new(d, id));
        }
        cursor = node.next();
    }

    sorted_best_first(graph, heap)
}
