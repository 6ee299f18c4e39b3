//! The Vector record: an index entry's immutable payload plus its identity.
//!
//! Mirrors the allocator contract (`make_vector`/`alloc_vector`/`free_vector`)
//! used throughout the graph algorithms: a vector is built once at insert
//! time and never mutated afterward, only read by distance kernels and
//! eventually freed when its owning node is dropped.

/// Reserved sentinel id meaning "no id" / "none". Real vector ids are non-zero.
pub const INVALID_ID: u64 = 0;

/// Rounds `dims` up to the next multiple of 4, the payload alignment unit
/// distance kernels assume even though no SIMD kernel in this crate
/// currently exploits it.
#[must_use]
pub fn dims_aligned(dims: u32) -> u32 {
    (dims + 3) & !3
}

/// An index entry: a caller-assigned id, an opaque tag bitmap, and the
/// (possibly zero-padded) float payload.
///
/// The payload length is always `dims_aligned(dims)`, with entries beyond
/// `dims` zeroed. `id` and `tag` are set at construction and never change;
/// distance kernels only ever read `payload[..dims]` conceptually, but the
/// aligned tail is kept around so future vectorized kernels can read whole
/// `dims_aligned`-length chunks without a bounds check.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    id: u64,
    tag: u64,
    payload: Vec<f32>,
}

impl Vector {
    /// Builds a new vector record, padding `src` with zeros up to
    /// `dims_aligned(dims)`.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0` or `src.len() != dims as usize` — both indicate
    /// caller misuse that should never reach this constructor; the façade
    /// is responsible for validating caller input before this point.
    #[must_use]
    pub fn new(id: u64, tag: u64, dims: u32, src: &[f32]) -> Self {
        assert_ne!(id, INVALID_ID, "vector id 0 is reserved");
        assert_eq!(
            src.len(),
            dims as usize,
            "source payload length does not match configured dims"
        );
        let aligned = dims_aligned(dims) as usize;
        let mut payload = vec![0.0f32; aligned];
        payload[..src.len()].copy_from_slice(src);
        Self { id, tag, payload }
    }

    /// The caller-assigned, non-zero id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The opaque tag bitmap attached at insert time.
    #[must_use]
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Replaces the tag bitmap in place. The payload and id remain immutable.
    pub fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }

    /// The full (aligned, zero-padded) payload.
    #[must_use]
    pub fn payload(&self) -> &[f32] {
        &self.payload
    }

    /// The logical payload truncated to `dims`, discarding alignment padding.
    #[must_use]
    pub fn values(&self, dims: u32) -> &[f32] {
        &self.payload[..dims as usize]
    }
}
