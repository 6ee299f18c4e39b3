//! Typed construction parameters for an index and the `update_context`
//! partial-update mask.

use crate::metric::Metric;
use serde::{Deserialize, Serialize};

/// Default construction-time search breadth.
pub const DEFAULT_EF_CONSTRUCT: u32 = 220;
/// Default query-time search breadth.
pub const DEFAULT_EF_SEARCH: u32 = 110;
/// Default maximum out-degree at layer 0.
pub const DEFAULT_M0: u32 = 32;

/// HNSW tunables plus the comparator choice. `Copy` because it is small and
/// meant to be configured by value before an index is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Distance/similarity semantics for this index.
    pub metric: Metric,
    /// Vector dimensionality (unpadded).
    pub dims: u32,
    /// Search breadth used while building the graph.
    pub ef_construct: u32,
    /// Search breadth used while querying the graph.
    pub ef_search: u32,
    /// Maximum out-degree at layer 0 (halved at higher layers).
    pub m0: u32,
}

impl HnswConfig {
    /// Builds a configuration with this crate's defaults for everything but
    /// `metric` and `dims`.
    #[must_use]
    pub fn new(dims: u32, metric: Metric) -> Self {
        Self {
            metric,
            dims,
            ef_construct: DEFAULT_EF_CONSTRUCT,
            ef_search: DEFAULT_EF_SEARCH,
            m0: DEFAULT_M0,
        }
    }

    /// Builder-style override for `ef_construct`.
    #[must_use]
    pub fn with_ef_construct(mut self, ef_construct: u32) -> Self {
        self.ef_construct = ef_construct;
        self
    }

    /// Builder-style override for `ef_search`.
    #[must_use]
    pub fn with_ef_search(mut self, ef_search: u32) -> Self {
        self.ef_search = ef_search;
        self
    }

    /// Builder-style override for `m0`.
    #[must_use]
    pub fn with_m0(mut self, m0: u32) -> Self {
        self.m0 = m0;
        self
    }
}

/// Which fields `update_context` should apply from a partial update.
///
/// A small hand-rolled bitset rather than a dependency: three flags don't
/// warrant one, and the combine/contains operations below are the entire
/// surface `update_context` needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct UpdateMask(u32);

impl UpdateMask {
    /// Apply the incoming `ef_construct` value.
    pub const SET_EF_CONSTRUCT: UpdateMask = UpdateMask(0b001);
    /// Apply the incoming `ef_search` value.
    pub const SET_EF_SEARCH: UpdateMask = UpdateMask(0b010);
    /// Apply the incoming `m0` value.
    pub const SET_M0: UpdateMask = UpdateMask(0b100);
    /// No fields selected.
    pub const EMPTY: UpdateMask = UpdateMask(0);

    /// `true` if every flag set in `other` is also set in `self`.
    #[must_use]
    pub fn contains(self, other: UpdateMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for UpdateMask {
    type Output = UpdateMask;
    fn bitor(self, rhs: UpdateMask) -> UpdateMask {
        UpdateMask(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_spec_defaults() {
        let cfg = HnswConfig::new(128, Metric::Cosine);
        assert_eq!(cfg.ef_construct, DEFAULT_EF_CONSTRUCT);
        assert_eq!(cfg.ef_search, DEFAULT_EF_SEARCH);
        assert_eq!(cfg.m0, DEFAULT_M0);
        assert_eq!(cfg.dims, 128);
    }

    #[test]
    fn builders_override_individual_fields() {
        let cfg = HnswConfig::new(4, Metric::L2Squared)
            .with_ef_construct(50)
            .with_m0(16);
        assert_eq!(cfg.ef_construct, 50);
        assert_eq!(cfg.ef_search, DEFAULT_EF_SEARCH);
        assert_eq!(cfg.m0, 16);
    }

    #[test]
    fn update_mask_combines_flags() {
        let mask = UpdateMask::SET_EF_SEARCH | UpdateMask::SET_M0;
        assert!(mask.contains(UpdateMask::SET_EF_SEARCH));
        assert!(mask.contains(UpdateMask::SET_M0));
        assert!(!mask.contains(UpdateMask::SET_EF_CONSTRUCT));
    }
}
