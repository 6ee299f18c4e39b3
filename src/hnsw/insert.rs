//! Neighbor-selection heuristic, back-link pruning, and the top-level
//! insertion algorithm.

use super::graph::{layer_capacity, HnswGraph, NodeId};
use super::search::{search_layer, SearchContext};
use crate::heap::{Heap, HeapMode, HeapNode};
use crate::vector::Vector;

/// Diversifies a candidate set down to at most `m` neighbors of `reference`.
///
/// `candidates` must be a best-top heap of entries whose `distance` field is
/// already the distance to `reference` (not recomputed here). When
/// `extend_candidates` is set, every neighbor-of-a-candidate at `level` is
/// folded into the working set before selection; when `keep_pruned` is set,
/// rejected candidates are kept in reserve and used to pad the result out to
/// `m` if the diversity rule alone doesn't produce enough.
///
/// This is the angular-diversity rule: a candidate is accepted only if it is
/// closer to `reference` than to every neighbor already accepted — so two
/// near-duplicate directions don't both consume a neighbor slot.
pub fn select_neighbors_heuristic(
    graph: &HnswGraph,
    reference: &[f32],
    candidates: Heap<NodeId>,
    m: usize,
    level: u32,
    extend_candidates: bool,
    keep_pruned: bool,
) -> Vec<NodeId> {
    let is_better = graph.metric.is_better_fn();
    let mut working: Heap<NodeId> = Heap::new(HeapMode::BestTop, None, is_better);
    let mut seen: Vec<NodeId> = Vec::new();

    let entries = candidates.into_vec();
    for entry in &entries {
        working
            .insert(HeapNode::new(entry.distance, entry.payload))
            .expect("unbounded working heap never reports full");
        seen.push(entry.payload);
    }

    if extend_candidates {
        for entry in &entries {
            if graph.node(entry.payload).level() < level {
                continue;
            }
            for &nb in graph.node(entry.payload).neighbors(level) {
                if seen.contains(&nb) {
                    continue;
                }
                seen.push(nb);
                let d = graph.metric.compare(reference, graph.node(nb).vector().payload());
                working
                    .insert(HeapNode::new(d, nb))
                    .expect("unbounded working heap never reports full");
            }
        }
    }

    let mut result: Vec<NodeId> = Vec::new();
    let mut discarded: Heap<NodeId> = Heap::new(HeapMode::BestTop, None, is_better);

    while !working.is_empty() && result.len() < m {
        let candidate = working.pop().expect("checked non-empty above");
        let d_to_reference = candidate.distance;
        let accepted = result.iter().all(|&r| {
            let d_to_chosen = graph.pairwise_distance(candidate.payload, r);
            !is_better(d_to_chosen, d_to_reference)
        });
        if accepted {
            result.push(candidate.payload);
        } else if keep_pruned {
            discarded
                .insert(HeapNode::new(d_to_reference, candidate.payload))
                .expect("unbounded discard heap never reports full");
        }
    }

    if keep_pruned {
        while result.len() < m {
            match discarded.pop() {
                Ok(n) => result.push(n.payload),
                Err(_) => break,
            }
        }
    }

    result
}

/// Adds `e` to `n`'s outgoing list at `level`, shrinking `n`'s neighbor set
/// through the heuristic if it is already saturated.
///
/// When `n` has room, this is a plain [`HnswGraph::connect`]. Otherwise `n`'s
/// entire neighbor set (plus `e`) is re-run through
/// [`select_neighbors_heuristic`] with `keep_pruned` set, so `n` keeps
/// exactly `m` diverse neighbors rather than exceeding its degree bound.
pub fn backlink_connect_with_shrink(graph: &mut HnswGraph, n: NodeId, e: NodeId, level: u32, m: usize) {
    if (graph.node(n).out_degree(level) as usize) < m {
        graph.connect(n, e, level);
        return;
    }

    let existing: Vec<NodeId> = graph.node(n).neighbors(level).to_vec();
    for &nb in &existing {
        graph.disconnect(n, nb, level);
    }

    let is_better = graph.metric.is_better_fn();
    let mut candidates: Heap<NodeId> = Heap::new(HeapMode::BestTop, None, is_better);
    for &nb in &existing {
        let d = graph.pairwise_distance(n, nb);
        candidates
            .insert(HeapNode::new(d, nb))
            .expect("unbounded heap never reports full");
    }
    let d_e = graph.pairwise_distance(n, e);
    candidates
        .insert(HeapNode::new(d_e, e))
        .expect("unbounded heap never reports full");

    let reference = graph.node(n).vector().payload().to_vec();
    let selected = select_neighbors_heuristic(graph, &reference, candidates, m, level, false, true);
    debug_assert_eq!(
        selected.len(),
        m,
        "back-link shrink must produce exactly m entries when keep_pruned is set"
    );
    for sel in selected {
        graph.connect(n, sel, level);
    }
}

/// Inserts a freshly-built vector into the graph, returning its [`NodeId`].
///
/// Implements the five-step insertion algorithm: first-node bootstrapping,
/// greedy descent from the entry point down to the new node's sampled
/// level, then, layer by layer down to 0, a bounded `search_layer` pass
/// followed by heuristic neighbor selection and bidirectional (back-linked,
/// shrink-on-saturation) wiring.
pub fn graph_insert(graph: &mut HnswGraph, id: u64, tag: u64, payload: &[f32]) -> NodeId {
    let level = graph.sample_level();
    let vector = Vector::new(id, tag, graph.dims, payload);
    let new_node = graph.alloc_node(vector, level);

    if graph.entry_point().is_none() {
        graph.set_entry_point(new_node, level);
        return new_node;
    }

    let query = graph.node(new_node).vector().payload().to_vec();
    let top_level_before = graph.top_level();
    let mut current = graph.entry_point().expect("checked Some above");

    for l in (level + 1..=top_level_before).rev() {
        let sc = SearchContext::new(&query, graph.dims_aligned, graph.metric);
        let w = search_layer(graph, &sc, std::slice::from_ref(&current), 1, l);
        if let Ok(best) = w.peek() {
            current = best.payload;
        }
    }

    let mut entry_set = vec![current];
    let bottom = level.min(top_level_before);
    for l in (0..=bottom).rev() {
        let sc = SearchContext::new(&query, graph.dims_aligned, graph.metric);
        let w = search_layer(graph, &sc, &entry_set, graph.ef_construct as usize, l);
        let cap = layer_capacity(l, graph.m0) as usize;
        let selected = select_neighbors_heuristic(graph, &query, w, cap, l, true, true);

        for &sel in &selected {
            graph.connect(new_node, sel, l);
            backlink_connect_with_shrink(graph, sel, new_node, l, cap);
        }

        entry_set = selected;
    }

    if level > top_level_before {
        graph.set_entry_point(new_node, level);
    }

    new_node
}
