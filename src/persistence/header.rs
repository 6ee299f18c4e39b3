//! Fixed-width, explicitly little-endian header layout for the dump/load
//! binary format.
//!
//! The source this crate is modeled on serializes these as packed C structs;
//! doing the same in Rust via `#[repr(C, packed)]` would tie the on-disk
//! layout to whatever the compiler decides a struct's field order means,
//! which is exactly what the design notes warn against. Every field here is
//! written and read as an explicit little-endian byte range instead, so the
//! format is stable regardless of how the in-memory struct is declared.

use super::PersistenceError;

/// Magic bytes for an HNSW index dump. Chosen to be distinct from any flat
/// index format this crate does not implement.
pub const MAGIC_HNSW: [u8; 4] = *b"VIH1";

/// Current format major version.
pub const VERSION_MAJOR: u8 = 1;
/// Current format minor version.
pub const VERSION_MINOR: u8 = 0;
/// Current format patch version.
pub const VERSION_PATCH: u8 = 0;

/// Size of [`FileHeader`] on disk, in bytes.
pub const HEADER_SIZE: usize = 40;
/// Size of [`HnswSubheader`] on disk, in bytes.
pub const SUBHEADER_SIZE: usize = 24;
/// Combined size through the end of the HNSW subheader — the canonical
/// `hsize` value for every dump this crate writes, resolving the
/// header/subheader ambiguity the source format left open.
pub const COMBINED_HEADER_SIZE: u8 = (HEADER_SIZE + SUBHEADER_SIZE) as u8;

/// Bit 0 of [`HnswSubheader::degree_flags`]: out-degree counters were valid
/// and fully serialized. Always set by this crate's `dump` — in-degree is
/// unconditionally recomputed on load regardless of this bit (see
/// `DESIGN.md` for the rationale), so it never gates load behavior.
pub const DEGREES_COMPUTED: u32 = 1 << 0;

/// The 40-byte header common to every dump this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format magic, currently always [`MAGIC_HNSW`].
    pub magic: [u8; 4],
    /// Format major version.
    pub version_major: u8,
    /// Format minor version.
    pub version_minor: u8,
    /// Format patch version.
    pub version_patch: u8,
    /// Combined size, in bytes, of this header plus any type-specific
    /// subheader that follows it — always [`COMBINED_HEADER_SIZE`] here.
    pub hsize: u8,
    /// Total element count (live and logically deleted) in the node section.
    pub elements: u32,
    /// [`crate::metric::Metric`] tag.
    pub method: u16,
    /// Unpadded vector dimensionality.
    pub dims: u16,
    /// Dimensionality rounded up to the kernel alignment unit.
    pub dims_aligned: u16,
    /// Non-zero if this dump contains only the vector section (an `export`),
    /// with no node/graph section following it.
    pub only_vectors: u16,
    /// Size, in bytes, of one serialized vector record.
    pub per_vector_size: u16,
    /// Size, in bytes, of the fixed portion of a node record (excluding its
    /// variable-length neighbor arrays — see `DESIGN.md`). Zero when
    /// `only_vectors` is set, since there is no node section to describe.
    pub per_node_size: u16,
    /// Byte offset of the vector section from the start of the file.
    pub vector_section_offset: u64,
    /// Byte offset of the node section from the start of the file. Equal to
    /// the end-of-file offset when `only_vectors` is set.
    pub node_section_offset: u64,
}

impl FileHeader {
    /// Serializes this header to exactly [`HEADER_SIZE`] little-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6] = self.version_patch;
        buf[7] = self.hsize;
        buf[8..12].copy_from_slice(&self.elements.to_le_bytes());
        buf[12..14].copy_from_slice(&self.method.to_le_bytes());
        buf[14..16].copy_from_slice(&self.dims.to_le_bytes());
        buf[16..18].copy_from_slice(&self.dims_aligned.to_le_bytes());
        buf[18..20].copy_from_slice(&self.only_vectors.to_le_bytes());
        buf[20..22].copy_from_slice(&self.per_vector_size.to_le_bytes());
        buf[22..24].copy_from_slice(&self.per_node_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.vector_section_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.node_section_offset.to_le_bytes());
        buf
    }

    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::InvalidMagic`] if the magic bytes don't
    /// match [`MAGIC_HNSW`], or [`PersistenceError::UnsupportedVersion`] if
    /// `version_major` is newer than this crate supports.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, PersistenceError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != MAGIC_HNSW {
            return Err(PersistenceError::InvalidMagic {
                expected: MAGIC_HNSW,
                actual: magic,
            });
        }
        let version_major = buf[4];
        if version_major > VERSION_MAJOR {
            return Err(PersistenceError::UnsupportedVersion(version_major, buf[5]));
        }
        Ok(Self {
            magic,
            version_major,
            version_minor: buf[5],
            version_patch: buf[6],
            hsize: buf[7],
            elements: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            method: u16::from_le_bytes(buf[12..14].try_into().unwrap()),
            dims: u16::from_le_bytes(buf[14..16].try_into().unwrap()),
            dims_aligned: u16::from_le_bytes(buf[16..18].try_into().unwrap()),
            only_vectors: u16::from_le_bytes(buf[18..20].try_into().unwrap()),
            per_vector_size: u16::from_le_bytes(buf[20..22].try_into().unwrap()),
            per_node_size: u16::from_le_bytes(buf[22..24].try_into().unwrap()),
            vector_section_offset: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            node_section_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
        })
    }
}

/// The HNSW-specific subheader that immediately follows [`FileHeader`] in
/// every dump this crate writes (never omitted, even when `only_vectors` is
/// set — `degree_flags`/`entry_point` are simply zero in that case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HnswSubheader {
    /// Search breadth used at query time.
    pub ef_search: u32,
    /// Search breadth used at construction time.
    pub ef_construct: u32,
    /// Maximum out-degree at layer 0.
    pub m0: u32,
    /// Bitset; see [`DEGREES_COMPUTED`].
    pub degree_flags: u32,
    /// 1-based position of the entry point in the serialized node sequence;
    /// 0 means "no entry point" (an empty index).
    pub entry_point: u32,
    _reserved: u32,
}

impl HnswSubheader {
    /// Serializes this subheader to exactly [`SUBHEADER_SIZE`] bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SUBHEADER_SIZE] {
        let mut buf = [0u8; SUBHEADER_SIZE];
        buf[0..4].copy_from_slice(&self.ef_search.to_le_bytes());
        buf[4..8].copy_from_slice(&self.ef_construct.to_le_bytes());
        buf[8..12].copy_from_slice(&self.m0.to_le_bytes());
        buf[12..16].copy_from_slice(&self.degree_flags.to_le_bytes());
        buf[16..20].copy_from_slice(&self.entry_point.to_le_bytes());
        buf[20..24].copy_from_slice(&self._reserved.to_le_bytes());
        buf
    }

    /// Parses a subheader from exactly [`SUBHEADER_SIZE`] bytes.
    #[must_use]
    pub fn from_bytes(buf: &[u8; SUBHEADER_SIZE]) -> Self {
        Self {
            ef_search: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            ef_construct: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            m0: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            degree_flags: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            entry_point: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            _reserved: 0,
        }
    }
}
