//! The embedder-facing index handle: ties the graph arena, the id-map, and
//! persistence together behind a single per-index reader-writer lock.
//!
//! This is the component every other module in this crate exists to serve:
//! `Index` is the only type most callers ever touch directly.

use crate::error::{IndexError, Result};
use crate::hnsw::config::{HnswConfig, UpdateMask};
use crate::hnsw::graph::{HnswGraph, NodeId};
use crate::hnsw::insert::graph_insert;
use crate::hnsw::search::{graph_knn_search, linear_tag_search};
use crate::idmap::IdMap;
use crate::metric::Metric;
use crate::persistence;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

/// Which index backend an [`Index`] was allocated with.
///
/// Only [`IndexKind::Hnsw`] is implemented; the flat brute-force backend
/// named in the external configuration enumeration is out of scope for this
/// crate (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IndexKind {
    /// Brute-force flat index. Recognized as a configuration value but not
    /// implemented — `alloc_index` rejects it with `InvalidIndexType`.
    Flat = 0,
    /// Hierarchical navigable small world graph. The only implemented kind.
    Hnsw = 3,
}

impl IndexKind {
    /// Decodes the external integer kind tag.
    #[must_use]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(IndexKind::Flat),
            3 => Some(IndexKind::Hnsw),
            _ => None,
        }
    }
}

/// One search hit: a vector id and its distance/similarity to the query.
///
/// Unused slots in a caller-sized output buffer carry the sentinel
/// `{ id: 0, distance: metric.worst_match_value() }`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// The matched vector's id, or `0` for an unused/sentinel slot.
    pub id: u64,
    /// Distance (lower-is-better metrics) or similarity (higher-is-better
    /// metrics) between the query and this match.
    pub distance: f32,
}

impl MatchResult {
    fn sentinel(metric: Metric) -> Self {
        Self {
            id: 0,
            distance: metric.worst_match_value(),
        }
    }
}

/// How `import` resolves an incoming vector whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Delete the existing entry and insert the incoming one in its place.
    Overwrite,
    /// Skip the incoming entry without logging anything.
    IgnoreSilent,
    /// Skip the incoming entry, logging a `warn!` naming the colliding id.
    IgnoreVerbose,
}

/// Which public operation a [`Stats`] entry's timings belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `Index::insert`
    Insert,
    /// `Index::search` (including tag-filtered queries, selected via its
    /// `tag_mask` parameter)
    Search,
    /// `Index::delete`
    Delete,
    /// `Index::update_context`
    UpdateContext,
    /// `Index::dump`
    Dump,
    /// `Index::load` (static; recorded against the freshly built index)
    Load,
    /// `Index::export`
    Export,
    /// `Index::import`
    Import,
}

/// Per-op elapsed-time bookkeeping, in milliseconds. Updated only on
/// successful operations, per the concurrency model's timing contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpStats {
    /// Number of successful calls recorded.
    pub count: u64,
    /// Sum of elapsed milliseconds across all recorded calls.
    pub total_ms: f64,
    /// Elapsed milliseconds of the most recent recorded call.
    pub last_ms: f64,
    /// Smallest elapsed milliseconds recorded.
    pub min_ms: f64,
    /// Largest elapsed milliseconds recorded.
    pub max_ms: f64,
}

impl OpStats {
    fn record(&mut self, elapsed_ms: f64) {
        self.count += 1;
        self.total_ms += elapsed_ms;
        self.last_ms = elapsed_ms;
        self.min_ms = if self.count == 1 {
            elapsed_ms
        } else {
            self.min_ms.min(elapsed_ms)
        };
        self.max_ms = self.max_ms.max(elapsed_ms);
    }
}

impl Default for OpStats {
    fn default() -> Self {
        Self {
            count: 0,
            total_ms: 0.0,
            last_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        }
    }
}

struct IndexInner {
    graph: HnswGraph,
    id_map: IdMap,
}

fn seed_from_clock() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ 0xD1B5_4A32_D192_ED03
}

/// An embeddable approximate-nearest-neighbor vector index.
///
/// Every mutating operation takes the write half of a single internal
/// `RwLock`; every read-only operation (searches, `stats`, `size`,
/// `contains`, `dump`, `export`) takes the read half. The lock has no
/// timeout and does not support reentrant acquisition — calling a locking
/// method from within another locking method on the same `Index` deadlocks,
/// matching the concurrency model this crate is built against.
pub struct Index {
    inner: RwLock<IndexInner>,
    stats: Mutex<HashMap<OpKind, OpStats>>,
    dims: u32,
}

impl Index {
    /// Allocates a fresh index. Only [`IndexKind::Hnsw`] is implemented.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidIndexType`] for [`IndexKind::Flat`], or
    /// [`IndexError::InvalidArgument`] if `config.dims` is zero.
    pub fn alloc_index(kind: IndexKind, config: HnswConfig) -> Result<Self> {
        if kind != IndexKind::Hnsw {
            return Err(IndexError::InvalidIndexType);
        }
        if config.dims == 0 {
            return Err(IndexError::InvalidArgument("dims must be non-zero".into()));
        }
        let rng = deterministic_rng_override().unwrap_or_else(|| ChaCha8Rng::seed_from_u64(seed_from_clock()));
        let graph = HnswGraph::new(
            config.metric,
            config.dims,
            config.m0,
            config.ef_construct,
            config.ef_search,
            rng,
        );
        Ok(Self {
            inner: RwLock::new(IndexInner {
                graph,
                id_map: IdMap::default(),
            }),
            stats: Mutex::new(HashMap::new()),
            dims: config.dims,
        })
    }

    fn record_stat(&self, op: OpKind, elapsed_ms: f64) {
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        stats.entry(op).or_default().record(elapsed_ms);
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexInner>> {
        self.inner.read().map_err(|_| IndexError::ThreadError)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, IndexInner>> {
        self.inner.write().map_err(|_| IndexError::ThreadError)
    }

    fn check_dims(&self, payload_len: usize) -> Result<()> {
        if payload_len != self.dims as usize {
            return Err(IndexError::InvalidDimensions {
                expected: self.dims,
                actual: payload_len as u32,
            });
        }
        Ok(())
    }

    /// Inserts a new vector under `id` with an opaque `tag` bitmap.
    ///
    /// Rejects `id == 0`, a payload whose length doesn't match the index's
    /// configured `dims`, and an `id` already present. Duplicate detection
    /// is checked against the id-map *before* the graph is touched, so
    /// there is never a partially-applied insert to roll back.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidId`], [`IndexError::InvalidDimensions`], or
    /// [`IndexError::DuplicatedEntry`].
    pub fn insert(&self, id: u64, payload: &[f32], tag: u64) -> Result<()> {
        if id == 0 {
            return Err(IndexError::InvalidId);
        }
        self.check_dims(payload.len())?;
        let start = Instant::now();
        let mut guard = self.write()?;
        if guard.id_map.has(id) {
            return Err(IndexError::DuplicatedEntry(id));
        }
        let node = graph_insert(&mut guard.graph, id, tag, payload);
        guard.id_map.insert(id, node.0);
        drop(guard);
        self.record_stat(OpKind::Insert, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Runs a k-NN query, returning up to `k` matches sorted best-first.
    ///
    /// If `tag_mask` is non-zero, falls back to a linear tag-filtered scan
    /// (see `hnsw::search::linear_tag_search`) instead of the graph search.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidDimensions`] or [`IndexError::IndexEmpty`].
    pub fn search(&self, query: &[f32], k: usize, tag_mask: u64) -> Result<Vec<MatchResult>> {
        self.check_dims(query.len())?;
        let start = Instant::now();
        let guard = self.read()?;
        if guard.graph.is_empty() {
            return Err(IndexError::IndexEmpty);
        }
        let aligned = pad_query(query, guard.graph.dims_aligned);
        let hits = if tag_mask == 0 {
            graph_knn_search(&guard.graph, &aligned, k)
        } else {
            linear_tag_search(&guard.graph, &aligned, tag_mask, k)
        };
        let metric = guard.graph.metric;
        drop(guard);

        let mut out: Vec<MatchResult> = hits
            .into_iter()
            .map(|(id, distance)| MatchResult { id, distance })
            .collect();
        out.resize(k, MatchResult::sentinel(metric));
        self.record_stat(OpKind::Search, start.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    /// Logically deletes `id`: marks its node dead (it remains in the graph
    /// for routing) and removes it from the id-map so the id becomes
    /// insertable again.
    ///
    /// # Errors
    ///
    /// [`IndexError::NotFoundId`] if `id` is not present.
    pub fn delete(&self, id: u64) -> Result<()> {
        let start = Instant::now();
        let mut guard = self.write()?;
        let idx = guard.id_map.remove(id).ok_or(IndexError::NotFoundId(id))?;
        guard.graph.node_mut(NodeId(idx)).mark_dead();
        drop(guard);
        self.record_stat(OpKind::Delete, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Atomically applies the fields selected by `mask` from `cfg`.
    ///
    /// `metric` and `dims` cannot be changed after allocation; only
    /// `ef_construct`, `ef_search`, and `m0` are adjustable.
    pub fn update_context(&self, cfg: &HnswConfig, mask: UpdateMask) -> Result<()> {
        let start = Instant::now();
        let mut guard = self.write()?;
        if mask.contains(UpdateMask::SET_EF_CONSTRUCT) {
            guard.graph.ef_construct = cfg.ef_construct;
        }
        if mask.contains(UpdateMask::SET_EF_SEARCH) {
            guard.graph.ef_search = cfg.ef_search;
        }
        if mask.contains(UpdateMask::SET_M0) {
            guard.graph.m0 = cfg.m0;
        }
        drop(guard);
        self.record_stat(OpKind::UpdateContext, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// A snapshot of per-op timing statistics recorded so far.
    #[must_use]
    pub fn stats(&self) -> HashMap<OpKind, OpStats> {
        self.stats
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of live and logically-deleted nodes currently in the graph.
    ///
    /// # Errors
    ///
    /// [`IndexError::ThreadError`] if the lock is poisoned.
    pub fn size(&self) -> Result<usize> {
        Ok(self.read()?.graph.elements())
    }

    /// `true` if `id` is currently present (and alive) in the index.
    ///
    /// # Errors
    ///
    /// [`IndexError::ThreadError`] if the lock is poisoned.
    pub fn contains(&self, id: u64) -> Result<bool> {
        Ok(self.read()?.id_map.has(id))
    }

    /// Writes a complete dump (vectors + graph) to `path`.
    ///
    /// # Errors
    ///
    /// [`IndexError::FileIoError`] on any filesystem or encoding failure.
    pub fn dump(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let guard = self.read()?;
        persistence::dump_to_path(&guard.graph, path).map_err(persistence_err)?;
        drop(guard);
        self.record_stat(OpKind::Dump, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Loads a complete dump written by [`Index::dump`], rebuilding the
    /// id-map from the loaded graph's live nodes.
    ///
    /// # Errors
    ///
    /// [`IndexError::FileIoError`] or [`IndexError::InvalidFile`] if `path`
    /// is not a recognized HNSW dump.
    pub fn load(path: &Path) -> Result<Self> {
        let start = Instant::now();
        let graph = persistence::load_from_path(path).map_err(persistence_err)?;
        let dims = graph.dims;
        let mut id_map = IdMap::default();
        for (id, node) in graph.nodes() {
            if node.is_alive() {
                id_map.insert(node.vector().id(), id.0);
            }
        }
        let index = Self {
            inner: RwLock::new(IndexInner { graph, id_map }),
            stats: Mutex::new(HashMap::new()),
            dims,
        };
        index.record_stat(OpKind::Load, start.elapsed().as_secs_f64() * 1000.0);
        Ok(index)
    }

    /// Writes a vectors-only export (no graph/node section) to `path`.
    ///
    /// # Errors
    ///
    /// [`IndexError::FileIoError`] on any filesystem or encoding failure.
    pub fn export(&self, path: &Path) -> Result<()> {
        let start = Instant::now();
        let guard = self.read()?;
        persistence::export_to_path(&guard.graph, path).map_err(persistence_err)?;
        drop(guard);
        self.record_stat(OpKind::Export, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Merges the vectors from an export or dump at `path` into this index.
    ///
    /// For each incoming vector whose id already exists, `mode` selects
    /// whether it overwrites the existing entry or is skipped.
    ///
    /// # Errors
    ///
    /// [`IndexError::FileIoError`], [`IndexError::InvalidFile`], or
    /// [`IndexError::InvalidDimensions`] if the source file's `dims` don't
    /// match this index.
    pub fn import(&self, path: &Path, mode: ImportMode) -> Result<()> {
        let start = Instant::now();
        let records = persistence::import_vectors_from_path(path).map_err(persistence_err)?;
        let mut guard = self.write()?;
        for (id, tag, payload) in records {
            self.check_dims(payload.len())?;
            if guard.id_map.has(id) {
                match mode {
                    ImportMode::Overwrite => {
                        let idx = guard.id_map.remove(id).expect("has() just confirmed presence");
                        guard.graph.node_mut(NodeId(idx)).mark_dead();
                    }
                    ImportMode::IgnoreSilent => continue,
                    ImportMode::IgnoreVerbose => {
                        log::warn!("import: skipping colliding id {id}");
                        continue;
                    }
                }
            }
            let node = graph_insert(&mut guard.graph, id, tag, &payload);
            guard.id_map.insert(id, node.0);
        }
        drop(guard);
        self.record_stat(OpKind::Import, start.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    /// Consumes the index, releasing its graph and id-map.
    ///
    /// Rust's ownership model already frees the arena and its vectors when
    /// `Index` is dropped; this method exists to give embedders an explicit,
    /// named lifecycle operation mirroring `destroy_index`.
    pub fn destroy(self) {
        drop(self);
    }
}

fn persistence_err(e: persistence::PersistenceError) -> IndexError {
    use persistence::PersistenceError as P;
    match e {
        P::Io(io) => IndexError::FileIoError(io.to_string()),
        P::InvalidMagic { .. } | P::UnsupportedVersion(..) | P::Corrupted(_) => {
            IndexError::InvalidFile(e.to_string())
        }
        P::Unsupported(msg) => IndexError::NotImplemented(msg),
    }
}

fn pad_query(query: &[f32], dims_aligned: u32) -> Vec<f32> {
    let mut buf = vec![0.0f32; dims_aligned as usize];
    buf[..query.len()].copy_from_slice(query);
    buf
}

/// Test-only hook: when set, `alloc_index` seeds its RNG deterministically
/// instead of from the system clock, so construction is reproducible in
/// tests without threading a seed through the public API.
#[cfg(test)]
thread_local! {
    static DETERMINISTIC_SEED: std::cell::Cell<Option<u64>> = const { std::cell::Cell::new(None) };
}

#[cfg(test)]
fn deterministic_rng_override() -> Option<ChaCha8Rng> {
    DETERMINISTIC_SEED.with(|s| s.get()).map(ChaCha8Rng::seed_from_u64)
}

#[cfg(not(test))]
fn deterministic_rng_override() -> Option<ChaCha8Rng> {
    None
}

#[cfg(test)]
/// Sets the deterministic RNG seed override used by `alloc_index` in tests.
pub fn set_deterministic_seed(seed: u64) {
    DETERMINISTIC_SEED.with(|s| s.set(Some(seed)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(dims: u32) -> HnswConfig {
        HnswConfig::new(dims, Metric::L2Squared).with_m0(8)
    }

    #[test]
    fn insert_then_search_finds_itself() {
        set_deterministic_seed(1);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(4)).unwrap();
        idx.insert(1, &[0.0, 0.0, 0.0, 0.0], 0).unwrap();
        idx.insert(2, &[5.0, 5.0, 5.0, 5.0], 0).unwrap();
        let out = idx.search(&[0.0, 0.0, 0.0, 0.0], 1, 0).unwrap();
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        set_deterministic_seed(2);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        idx.insert(1, &[0.0, 0.0], 0).unwrap();
        let err = idx.insert(1, &[1.0, 1.0], 0).unwrap_err();
        assert_eq!(err, IndexError::DuplicatedEntry(1));
    }

    #[test]
    fn insert_rejects_zero_id_and_wrong_dims() {
        set_deterministic_seed(3);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        assert_eq!(idx.insert(0, &[0.0, 0.0], 0).unwrap_err(), IndexError::InvalidId);
        assert!(matches!(
            idx.insert(1, &[0.0], 0).unwrap_err(),
            IndexError::InvalidDimensions { .. }
        ));
    }

    #[test]
    fn search_on_empty_index_reports_index_empty() {
        set_deterministic_seed(4);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        assert_eq!(idx.search(&[0.0, 0.0], 1, 0).unwrap_err(), IndexError::IndexEmpty);
    }

    #[test]
    fn search_pads_unused_slots_with_sentinel() {
        set_deterministic_seed(5);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        idx.insert(1, &[0.0, 0.0], 0).unwrap();
        let out = idx.search(&[0.0, 0.0], 3, 0).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].id, 0);
        assert_eq!(out[1].distance, Metric::L2Squared.worst_match_value());
    }

    #[test]
    fn delete_then_reinsert_same_id_succeeds() {
        set_deterministic_seed(6);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        idx.insert(1, &[0.0, 0.0], 0).unwrap();
        idx.delete(1).unwrap();
        assert!(!idx.contains(1).unwrap());
        idx.insert(1, &[1.0, 1.0], 0).unwrap();
        assert!(idx.contains(1).unwrap());
    }

    #[test]
    fn delete_missing_id_reports_not_found() {
        set_deterministic_seed(7);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        assert_eq!(idx.delete(99).unwrap_err(), IndexError::NotFoundId(99));
    }

    #[test]
    fn update_context_applies_only_masked_fields() {
        set_deterministic_seed(8);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        let new_cfg = cfg(2).with_ef_search(999).with_m0(64);
        idx.update_context(&new_cfg, UpdateMask::SET_EF_SEARCH).unwrap();
        let guard = idx.inner.read().unwrap();
        assert_eq!(guard.graph.ef_search, 999);
        assert_ne!(guard.graph.m0, 64);
    }

    #[test]
    fn dump_and_load_round_trip_preserves_search_results() {
        set_deterministic_seed(9);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(4)).unwrap();
        for i in 1..=20u64 {
            #[allow(clippy::cast_precision_loss)]
            let v = [i as f32, 0.0, 0.0, 0.0];
            idx.insert(i, &v, 0).unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        idx.dump(&path).unwrap();
        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded.size().unwrap(), idx.size().unwrap());
        let before = idx.search(&[1.0, 0.0, 0.0, 0.0], 3, 0).unwrap();
        let after = loaded.search(&[1.0, 0.0, 0.0, 0.0], 3, 0).unwrap();
        assert_eq!(before.iter().map(|m| m.id).collect::<Vec<_>>(), after.iter().map(|m| m.id).collect::<Vec<_>>());
    }

    #[test]
    fn import_overwrite_replaces_colliding_id() {
        set_deterministic_seed(10);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        idx.insert(1, &[0.0, 0.0], 0).unwrap();

        let src = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        src.insert(1, &[9.0, 9.0], 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.bin");
        src.export(&path).unwrap();

        idx.import(&path, ImportMode::Overwrite).unwrap();
        assert!(idx.contains(1).unwrap());
        assert_eq!(idx.size().unwrap(), 2); // old node stays as a dead tombstone
    }

    #[test]
    fn import_ignore_silent_skips_colliding_id() {
        set_deterministic_seed(11);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        idx.insert(1, &[0.0, 0.0], 0).unwrap();

        let src = Index::alloc_index(IndexKind::Hnsw, cfg(2)).unwrap();
        src.insert(1, &[9.0, 9.0], 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.bin");
        src.export(&path).unwrap();

        idx.import(&path, ImportMode::IgnoreSilent).unwrap();
        assert_eq!(idx.size().unwrap(), 1);
    }

    #[test]
    fn tag_filtered_search_only_returns_matching_tags() {
        set_deterministic_seed(12);
        let idx = Index::alloc_index(IndexKind::Hnsw, cfg(1)).unwrap();
        idx.insert(1, &[0.0], 0b01).unwrap();
        idx.insert(2, &[1.0], 0b10).unwrap();
        let out = idx.search(&[0.0], 5, 0b01).unwrap();
        assert_eq!(out[0].id, 1);
        assert_eq!(out[1].id, 0);
    }
}
