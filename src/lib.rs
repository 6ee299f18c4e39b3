//! # vindex
//!
//! An embedded approximate-nearest-neighbor vector index backed by a
//! hierarchical navigable small world (HNSW) graph.
//!
//! ## Overview
//!
//! An [`Index`] owns an arena of graph nodes, each holding one vector and
//! its per-layer neighbor lists, plus an id-map for O(1) duplicate
//! detection and deletion. Inserts build the graph incrementally with
//! heuristic neighbor selection and back-link pruning; queries descend the
//! graph greedily through the upper layers before a bounded best-first
//! search at layer 0. A single reader-writer lock per index serializes
//! mutating operations against each other and against readers; it has no
//! timeout and does not support reentrant acquisition.
//!
//! Distributed operation, GPU execution, vector quantization, and
//! transactional durability beyond a synchronous snapshot dump/load are
//! out of scope — see `DESIGN.md` for the full list of what this crate
//! deliberately does not do.
//!
//! ## Example
//!
//! ```rust
//! use vindex::{HnswConfig, Index, IndexKind, Metric};
//!
//! let config = HnswConfig::new(4, Metric::L2Squared);
//! let index = Index::alloc_index(IndexKind::Hnsw, config).expect("valid config");
//!
//! index.insert(1, &[0.0, 0.0, 0.0, 0.0], 0).expect("first insert");
//! index.insert(2, &[5.0, 5.0, 5.0, 5.0], 0).expect("second insert");
//!
//! let hits = index.search(&[0.1, 0.0, 0.0, 0.0], 1, 0).expect("non-empty index");
//! assert_eq!(hits[0].id, 1);
//! ```
//!
//! ## Persistence example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use vindex::{HnswConfig, Index, IndexKind, Metric};
//!
//! let config = HnswConfig::new(128, Metric::Cosine);
//! let index = Index::alloc_index(IndexKind::Hnsw, config).unwrap();
//! index.insert(1, &vec![0.1; 128], 0).unwrap();
//!
//! index.dump(Path::new("index.vindex")).unwrap();
//! let reloaded = Index::load(Path::new("index.vindex")).unwrap();
//! assert_eq!(reloaded.size().unwrap(), 1);
//! ```

#![warn(missing_docs)]

/// Stable error taxonomy and the `panic_if!` internal-invariant macro.
pub mod error;
/// Bounded/unbounded binary heap with best-top and worst-top ordering modes.
pub mod heap;
/// The embedder-facing index handle: graph, id-map, stats, and persistence.
pub mod index;
/// Open-chained hash map from vector id to arena index.
pub mod idmap;
/// Distance kernels and the metric dispatch enum.
pub mod metric;
/// The HNSW graph arena, construction/search algorithms, and configuration.
pub mod hnsw;
/// Binary dump/load format.
pub mod persistence;
/// The index entry record: id, tag, and payload.
pub mod vector;

pub use error::{IndexError, Result};
pub use hnsw::{HnswConfig, UpdateMask};
pub use index::{ImportMode, Index, IndexKind, MatchResult, OpKind, OpStats};
pub use metric::Metric;
pub use vector::Vector;
