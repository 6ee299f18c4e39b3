//! HNSW module: graph arena, construction/search algorithms, and configuration.

/// Construction parameters and the `update_context` field mask.
pub mod config;
/// Arena-based multi-layer graph: nodes, neighbor slots, forward chain.
pub mod graph;
/// Neighbor-selection heuristic, back-link pruning, top-level insertion.
pub mod insert;
/// Per-query search context, layer search, k-NN query, tag-filtered scan.
pub mod search;

pub use config::{HnswConfig, UpdateMask, DEFAULT_EF_CONSTRUCT, DEFAULT_EF_SEARCH, DEFAULT_M0};
pub use graph::{layer_capacity, GraphNode, HnswGraph, NodeId};
pub use insert::{backlink_connect_with_shrink, graph_insert, select_neighbors_heuristic};
pub use search::{graph_knn_search, linear_tag_search, search_layer, SearchContext};
