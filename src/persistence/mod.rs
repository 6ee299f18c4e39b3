//! Binary dump/load format for an [`HnswGraph`](crate::hnsw::HnswGraph):
//! a fixed header, then the vector section, then the node section.
//!
//! Little-endian, explicitly fixed-width, no reliance on in-memory struct
//! layout — see `header.rs` and `DESIGN.md` for the exact byte layout and
//! the open-question resolutions it freezes.

/// Header and subheader byte layout.
pub mod header;

use crate::hnsw::graph::{GraphNode, HnswGraph, NodeId};
use crate::metric::Metric;
use crate::vector::Vector;
use header::{
    FileHeader, HnswSubheader, COMBINED_HEADER_SIZE, DEGREES_COMPUTED, HEADER_SIZE, MAGIC_HNSW,
    SUBHEADER_SIZE, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH,
};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while writing or reading the dump format.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Underlying file or stream I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file's magic bytes don't match this crate's expected value.
    #[error("invalid magic number: expected {expected:?}, got {actual:?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Actual magic bytes read.
        actual: [u8; 4],
    },

    /// The file's major version is newer than this crate supports.
    #[error("unsupported version: {0}.{1}")]
    UnsupportedVersion(u8, u8),

    /// The file is structurally well-formed but its contents are
    /// inconsistent (bad metric tag, neighbor reference out of range, ...).
    #[error("corrupted data: {0}")]
    Corrupted(String),

    /// An operation was attempted against a file shape it doesn't support
    /// (e.g. `load` on a vectors-only `export`).
    #[error("unsupported: {0}")]
    Unsupported(String),
}

fn seed_from_clock() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ 0x9E37_79B9_7F4A_7C15
}

fn read_exact_u32(r: &mut impl Read) -> Result<u32, PersistenceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_exact_u64(r: &mut impl Read) -> Result<u64, PersistenceError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_exact_f32(r: &mut impl Read) -> Result<f32, PersistenceError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn write_vector_section(graph: &HnswGraph, w: &mut impl Write) -> Result<(), PersistenceError> {
    for (_, node) in graph.nodes() {
        let v = node.vector();
        w.write_all(&v.id().to_le_bytes())?;
        w.write_all(&v.tag().to_le_bytes())?;
        for f in v.payload() {
            w.write_all(&f.to_le_bytes())?;
        }
    }
    Ok(())
}

fn write_node_section(graph: &HnswGraph, w: &mut impl Write) -> Result<(), PersistenceError> {
    for (id, node) in graph.nodes() {
        w.write_all(&id.0.to_le_bytes())?;
        w.write_all(&node.level().to_le_bytes())?;
        w.write_all(&[u8::from(node.is_alive())])?;
        for level in 0..=node.level() {
            let neighbors = node.neighbors(level);
            w.write_all(&(neighbors.len() as u32).to_le_bytes())?;
            for &n in neighbors {
                // 1-based on disk: 0 is reserved to mean "no neighbor",
                // matching the "unused slots are zero" convention even
                // though this writer never emits padding slots at all.
                w.write_all(&(n.0 + 1).to_le_bytes())?;
            }
        }
    }
    Ok(())
}

/// Writes a complete dump (vector section + node/graph section) of `graph`.
///
/// # Errors
///
/// Returns [`PersistenceError::Io`] if `w` fails.
pub fn write_full(graph: &HnswGraph, w: &mut impl Write) -> Result<(), PersistenceError> {
    let per_vector_size = 16 + u64::from(graph.dims_aligned) * 4;
    let elements = graph.elements() as u64;
    let vector_section_offset = u64::from(COMBINED_HEADER_SIZE);
    let node_section_offset = vector_section_offset + elements * per_vector_size;
    let entry_point = graph.entry_point().map_or(0, |n| n.0 + 1);

    let header = FileHeader {
        magic: MAGIC_HNSW,
        version_major: VERSION_MAJOR,
        version_minor: VERSION_MINOR,
        version_patch: VERSION_PATCH,
        hsize: COMBINED_HEADER_SIZE,
        elements: elements as u32,
        method: graph.metric.tag() as u16,
        dims: graph.dims as u16,
        dims_aligned: graph.dims_aligned as u16,
        only_vectors: 0,
        per_vector_size: per_vector_size as u16,
        per_node_size: 9,
        vector_section_offset,
        node_section_offset,
    };
    let subheader = HnswSubheader {
        ef_search: graph.ef_search,
        ef_construct: graph.ef_construct,
        m0: graph.m0,
        degree_flags: DEGREES_COMPUTED,
        entry_point,
        ..Default::default()
    };

    w.write_all(&header.to_bytes())?;
    w.write_all(&subheader.to_bytes())?;
    write_vector_section(graph, w)?;
    write_node_section(graph, w)?;
    log::info!(
        "dump wrote {} elements, {} dims (aligned {})",
        header.elements,
        header.dims,
        header.dims_aligned
    );
    Ok(())
}

/// Writes a vectors-only export of `graph`: just the vector section, no
/// graph/node section. Used as the source file for `import`.
///
/// # Errors
///
/// Returns [`PersistenceError::Io`] if `w` fails.
pub fn write_vectors_only(graph: &HnswGraph, w: &mut impl Write) -> Result<(), PersistenceError> {
    let per_vector_size = 16 + u64::from(graph.dims_aligned) * 4;
    let elements = graph.elements() as u64;
    let vector_section_offset = u64::from(HEADER_SIZE as u8);
    let header = FileHeader {
        magic: MAGIC_HNSW,
        version_major: VERSION_MAJOR,
        version_minor: VERSION_MINOR,
        version_patch: VERSION_PATCH,
        hsize: HEADER_SIZE as u8,
        elements: elements as u32,
        method: graph.metric.tag() as u16,
        dims: graph.dims as u16,
        dims_aligned: graph.dims_aligned as u16,
        only_vectors: 1,
        per_vector_size: per_vector_size as u16,
        per_node_size: 0,
        vector_section_offset,
        node_section_offset: vector_section_offset + elements * per_vector_size,
    };
    w.write_all(&header.to_bytes())?;
    write_vector_section(graph, w)?;
    Ok(())
}

struct ParsedHeader {
    header: FileHeader,
    subheader: HnswSubheader,
}

fn read_header(r: &mut impl Read) -> Result<ParsedHeader, PersistenceError> {
    let mut hbuf = [0u8; HEADER_SIZE];
    r.read_exact(&mut hbuf)?;
    let header = FileHeader::from_bytes(&hbuf)?;
    let subheader = if header.hsize as usize >= usize::from(COMBINED_HEADER_SIZE) {
        let mut sbuf = [0u8; SUBHEADER_SIZE];
        r.read_exact(&mut sbuf)?;
        HnswSubheader::from_bytes(&sbuf)
    } else {
        HnswSubheader::default()
    };
    Ok(ParsedHeader { header, subheader })
}

/// One deserialized vector record: `(id, tag, truncated-to-dims payload)`.
pub type VectorRecord = (u64, u64, Vec<f32>);

fn read_vector_section(
    r: &mut impl Read,
    header: &FileHeader,
) -> Result<Vec<VectorRecord>, PersistenceError> {
    let mut out = Vec::with_capacity(header.elements as usize);
    for _ in 0..header.elements {
        let id = read_exact_u64(r)?;
        let tag = read_exact_u64(r)?;
        let mut payload = vec![0f32; header.dims_aligned as usize];
        for f in &mut payload {
            *f = read_exact_f32(r)?;
        }
        payload.truncate(header.dims as usize);
        out.push((id, tag, payload));
    }
    Ok(out)
}

/// Reads a full dump (vector section + node section) back into an
/// [`HnswGraph`].
///
/// # Errors
///
/// Returns [`PersistenceError::Unsupported`] if the file is a vectors-only
/// export (use [`import_vectors`] instead), or [`PersistenceError::Corrupted`]
/// if a neighbor reference or metric tag is out of range.
pub fn read_full(r: &mut impl Read) -> Result<HnswGraph, PersistenceError> {
    let ParsedHeader { header, subheader } = read_header(r)?;
    if header.only_vectors != 0 {
        return Err(PersistenceError::Unsupported(
            "file contains only a vector section; use import instead of load".into(),
        ));
    }
    let metric = Metric::from_tag(u32::from(header.method))
        .ok_or_else(|| PersistenceError::Corrupted(format!("unknown metric tag {}", header.method)))?;
    let vectors = read_vector_section(r, &header)?;

    let mut raw_nodes: Vec<(u32, u32, bool, Vec<Vec<u32>>)> = Vec::with_capacity(header.elements as usize);
    for _ in 0..header.elements {
        let vector_index = read_exact_u32(r)?;
        let level = read_exact_u32(r)?;
        let mut alive_buf = [0u8; 1];
        r.read_exact(&mut alive_buf)?;
        let alive = alive_buf[0] != 0;
        let mut layers = Vec::with_capacity(level as usize + 1);
        for _ in 0..=level {
            let out_degree = read_exact_u32(r)?;
            let mut refs = Vec::with_capacity(out_degree as usize);
            for _ in 0..out_degree {
                refs.push(read_exact_u32(r)?);
            }
            layers.push(refs);
        }
        raw_nodes.push((vector_index, level, alive, layers));
    }

    let dims = u32::from(header.dims);
    let mut nodes: Vec<GraphNode> = Vec::with_capacity(raw_nodes.len());
    for (vector_index, level, alive, layer_refs) in raw_nodes {
        let (id, tag, payload) = vectors.get(vector_index as usize).ok_or_else(|| {
            PersistenceError::Corrupted(format!("node references out-of-range vector {vector_index}"))
        })?;
        if *id == 0 {
            return Err(PersistenceError::Corrupted(
                "vector record carries reserved id 0".into(),
            ));
        }
        let vector = Vector::new(*id, *tag, dims, payload);
        let mut neighbors: Vec<Vec<NodeId>> = Vec::with_capacity(layer_refs.len());
        for refs in layer_refs {
            let mut layer = Vec::with_capacity(refs.len());
            for r in refs {
                if r == 0 {
                    return Err(PersistenceError::Corrupted("neighbor ref 0 is reserved for null".into()));
                }
                if r - 1 >= header.elements {
                    return Err(PersistenceError::Corrupted(format!(
                        "node references out-of-range neighbor {} (element count {})",
                        r - 1,
                        header.elements
                    )));
                }
                layer.push(NodeId(r - 1));
            }
            neighbors.push(layer);
        }
        nodes.push(GraphNode::from_parts(vector, level, alive, neighbors));
    }

    let entry_point = if subheader.entry_point == 0 {
        None
    } else {
        let idx = subheader.entry_point - 1;
        if idx as usize >= nodes.len() {
            return Err(PersistenceError::Corrupted("entry point index out of range".into()));
        }
        Some(NodeId(idx))
    };
    let top_level = entry_point.map_or(0, |NodeId(idx)| nodes[idx as usize].level());

    let rng = ChaCha8Rng::seed_from_u64(seed_from_clock());
    let graph = HnswGraph::from_parts(
        metric,
        dims,
        subheader.m0,
        subheader.ef_construct,
        subheader.ef_search,
        rng,
        nodes,
        entry_point,
        top_level,
    );
    log::info!(
        "load read {} elements, format v{}.{}.{}",
        header.elements,
        header.version_major,
        header.version_minor,
        header.version_patch
    );
    Ok(graph)
}

/// Reads just the vector section of a dump or export — the shape `import`
/// needs, regardless of whether the source file also has a node section.
///
/// # Errors
///
/// Returns [`PersistenceError::Corrupted`] if the metric tag is unrecognized.
pub fn import_vectors(r: &mut impl Read) -> Result<Vec<VectorRecord>, PersistenceError> {
    let ParsedHeader { header, .. } = read_header(r)?;
    Metric::from_tag(u32::from(header.method))
        .ok_or_else(|| PersistenceError::Corrupted(format!("unknown metric tag {}", header.method)))?;
    read_vector_section(r, &header)
}

/// Convenience: dumps `graph` to a file at `path`, truncating/creating it.
///
/// # Errors
///
/// Returns [`PersistenceError::Io`] on any filesystem failure.
pub fn dump_to_path(graph: &HnswGraph, path: &Path) -> Result<(), PersistenceError> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);
    write_full(graph, &mut w)?;
    use std::io::Write as _;
    w.flush()?;
    Ok(())
}

/// Convenience: loads a graph dumped with [`dump_to_path`].
///
/// # Errors
///
/// See [`read_full`].
pub fn load_from_path(path: &Path) -> Result<HnswGraph, PersistenceError> {
    let file = std::fs::File::open(path)?;
    let mut r = std::io::BufReader::new(file);
    read_full(&mut r)
}

/// Convenience: writes a vectors-only export of `graph` to `path`.
///
/// # Errors
///
/// Returns [`PersistenceError::Io`] on any filesystem failure.
pub fn export_to_path(graph: &HnswGraph, path: &Path) -> Result<(), PersistenceError> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);
    write_vectors_only(graph, &mut w)?;
    w.flush()?;
    Ok(())
}

/// Convenience: reads the vector records out of a dump or export at `path`.
///
/// # Errors
///
/// See [`import_vectors`].
pub fn import_vectors_from_path(path: &Path) -> Result<Vec<VectorRecord>, PersistenceError> {
    let file = std::fs::File::open(path)?;
    let mut r = std::io::BufReader::new(file);
    import_vectors(&mut r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::graph::HnswGraph;
    use crate::hnsw::insert::graph_insert;
    use rand_chacha::rand_core::SeedableRng;

    fn build_graph(n: u64, dims: u32) -> HnswGraph {
        let mut g = HnswGraph::new(Metric::L2Squared, dims, 8, 32, 16, ChaCha8Rng::seed_from_u64(99));
        for i in 1..=n {
            #[allow(clippy::cast_precision_loss)]
            let v: Vec<f32> = (0..dims).map(|d| (i as f32) + d as f32 * 0.1).collect();
            graph_insert(&mut g, i, 0, &v);
        }
        g
    }

    #[test]
    fn full_dump_round_trips_element_count_and_ids() {
        let g = build_graph(50, 8);
        let mut buf = Vec::new();
        write_full(&g, &mut buf).unwrap();
        let loaded = read_full(&mut &buf[..]).unwrap();
        assert_eq!(loaded.elements(), g.elements());
        assert_eq!(loaded.entry_point().is_some(), g.entry_point().is_some());

        let mut ids: Vec<u64> = g.nodes().map(|(_, n)| n.vector().id()).collect();
        let mut loaded_ids: Vec<u64> = loaded.nodes().map(|(_, n)| n.vector().id()).collect();
        ids.sort_unstable();
        loaded_ids.sort_unstable();
        assert_eq!(ids, loaded_ids);
    }

    #[test]
    fn full_dump_preserves_degree_consistency_after_recompute() {
        let g = build_graph(80, 4);
        let mut buf = Vec::new();
        write_full(&g, &mut buf).unwrap();
        let loaded = read_full(&mut &buf[..]).unwrap();
        for (id, node) in loaded.nodes() {
            for level in 0..=node.level() {
                for &nb in node.neighbors(level) {
                    assert!(
                        loaded.node(nb).in_degree(level) > 0,
                        "node {id:?}'s neighbor {nb:?} at level {level} has zero in-degree after recompute"
                    );
                }
            }
        }
    }

    #[test]
    fn rejects_bad_magic_file() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"NOPE");
        let err = read_full(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidMagic { .. }));
    }

    #[test]
    fn vectors_only_export_is_rejected_by_load_but_readable_by_import() {
        let g = build_graph(10, 4);
        let mut buf = Vec::new();
        write_vectors_only(&g, &mut buf).unwrap();

        let err = read_full(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::Unsupported(_)));

        let records = import_vectors(&mut &buf[..]).unwrap();
        assert_eq!(records.len(), 10);
    }

    #[test]
    fn truncated_file_reports_io_error_not_panic() {
        let g = build_graph(5, 4);
        let mut buf = Vec::new();
        write_full(&g, &mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        let err = read_full(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
    }

    /// Hand-builds a single-node dump (dims=1, dims_aligned=4) so corruption
    /// tests can plant an invalid value at a specific field without going
    /// through `write_full`, which would never emit it itself.
    fn single_node_dump(vector_id: u64, neighbor_refs: &[u32]) -> Vec<u8> {
        let per_vector_size: u64 = 16 + 4 * 4;
        let vector_section_offset = u64::from(COMBINED_HEADER_SIZE);
        let node_section_offset = vector_section_offset + per_vector_size;

        let header = FileHeader {
            magic: MAGIC_HNSW,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            version_patch: VERSION_PATCH,
            hsize: COMBINED_HEADER_SIZE,
            elements: 1,
            method: Metric::L2Squared.tag() as u16,
            dims: 1,
            dims_aligned: 4,
            only_vectors: 0,
            per_vector_size: per_vector_size as u16,
            per_node_size: 9,
            vector_section_offset,
            node_section_offset,
        };
        let subheader = HnswSubheader {
            ef_search: 16,
            ef_construct: 32,
            m0: 8,
            degree_flags: DEGREES_COMPUTED,
            entry_point: 1,
            ..Default::default()
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(&subheader.to_bytes());

        // vector section: one record, id/tag/4-wide zero payload.
        buf.extend_from_slice(&vector_id.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        // node section: one node at level 0, alive, with the given
        // (possibly invalid) neighbor refs at level 0.
        buf.extend_from_slice(&0u32.to_le_bytes()); // vector_index
        buf.extend_from_slice(&0u32.to_le_bytes()); // level
        buf.push(1); // alive
        buf.extend_from_slice(&(neighbor_refs.len() as u32).to_le_bytes());
        for &r in neighbor_refs {
            buf.extend_from_slice(&r.to_le_bytes());
        }
        buf
    }

    #[test]
    fn rejects_vector_record_carrying_reserved_id_zero() {
        let buf = single_node_dump(0, &[]);
        let err = read_full(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupted(_)));
    }

    #[test]
    fn rejects_out_of_range_neighbor_reference() {
        // Only one element is declared (index 0, on-disk ref 1); ref 2 has
        // no corresponding vector and must be rejected rather than accepted
        // and later panicking on an out-of-bounds arena index.
        let buf = single_node_dump(1, &[2]);
        let err = read_full(&mut &buf[..]).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupted(_)));
    }
}
