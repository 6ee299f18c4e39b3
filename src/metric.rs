//! Distance kernels (squared Euclidean, cosine, dot product).
//!
//! Dispatch is a closed enum rather than a trait object: the inner loop of
//! `search_layer` calls `compare`/`is_better` on every candidate edge, and a
//! `match` on a small enum resolves to a direct call at that call site
//! instead of going through a vtable.

use serde::{Deserialize, Serialize};

/// The distance/similarity function an index is configured with.
///
/// Numeric values match the external, language-neutral configuration
/// enumeration: `L2_SQUARED = 0`, `COSINE = 1`, `DOT = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum Metric {
    /// Squared Euclidean distance. Lower is better.
    L2Squared = 0,
    /// Cosine similarity. Higher is better.
    Cosine = 1,
    /// Raw dot product. Higher is better.
    DotProduct = 2,
}

impl Metric {
    /// Decodes the persisted/external integer method tag.
    ///
    /// # Errors
    ///
    /// Returns `None` for any value other than 0, 1, or 2.
    #[must_use]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Metric::L2Squared),
            1 => Some(Metric::Cosine),
            2 => Some(Metric::DotProduct),
            _ => None,
        }
    }

    /// The persisted/external integer method tag for this metric.
    #[must_use]
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Computes the pairwise comparison value between two aligned, equal-length
    /// vectors.
    ///
    /// Pure and symmetric for `L2Squared` and `DotProduct`; `Cosine` is
    /// symmetric in direction but not commutative-looking in magnitude
    /// handling (both sides are normalized by their own norm).
    ///
    /// # Panics
    ///
    /// Panics (debug assertion) if `a` and `b` differ in length, or if
    /// either contains a non-finite value — both indicate caller/internal
    /// misuse rather than a recoverable runtime condition.
    #[inline]
    #[must_use]
    pub fn compare(self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "dimension mismatch in distance kernel");
        match self {
            Metric::L2Squared => l2_squared(a, b),
            Metric::Cosine => cosine_similarity(a, b),
            Metric::DotProduct => dot_product(a, b),
        }
    }

    /// Total order predicate: does `x` rank strictly better than `y` as a
    /// match, under this metric?
    #[inline]
    #[must_use]
    pub fn is_better(self, x: f32, y: f32) -> bool {
        match self {
            Metric::L2Squared => x < y,
            Metric::Cosine | Metric::DotProduct => x > y,
        }
    }

    /// A plain function pointer equivalent to [`Metric::is_better`], for
    /// callers (the bounded heap) that need a `fn(f32, f32) -> bool` value
    /// rather than a bound method.
    #[must_use]
    pub fn is_better_fn(self) -> fn(f32, f32) -> bool {
        match self {
            Metric::L2Squared => lower_is_better,
            Metric::Cosine | Metric::DotProduct => higher_is_better,
        }
    }

    /// The sentinel comparison value that loses every `is_better` comparison
    /// under this metric — used to fill unused result slots.
    #[inline]
    #[must_use]
    pub fn worst_match_value(self) -> f32 {
        match self {
            Metric::L2Squared => f32::INFINITY,
            Metric::Cosine | Metric::DotProduct => -1.0,
        }
    }
}

fn lower_is_better(x: f32, y: f32) -> bool {
    x < y
}

fn higher_is_better(x: f32, y: f32) -> bool {
    x > y
}

#[inline]
fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        debug_assert!(!(x.is_nan() || y.is_nan()), "NaN detected in input");
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        debug_assert!(!(x.is_nan() || y.is_nan()), "NaN detected in input");
        sum += x * y;
    }
    sum
}

#[inline]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        debug_assert!(!(x.is_nan() || y.is_nan()), "NaN detected in input");
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        // Zero-length vector: no direction is defined. Treat as the
        // worst possible match rather than dividing by zero into NaN.
        return -1.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_squared_is_zero_for_identical_vectors() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(Metric::L2Squared.compare(&v, &v), 0.0);
    }

    #[test]
    fn l2_squared_ordering_prefers_smaller() {
        assert!(Metric::L2Squared.is_better(1.0, 2.0));
        assert!(!Metric::L2Squared.is_better(2.0, 1.0));
    }

    #[test]
    fn cosine_similarity_of_identical_direction_is_one() {
        let v = [1.0, 2.0, 3.0];
        let scaled = [2.0, 4.0, 6.0];
        let sim = Metric::Cosine.compare(&v, &scaled);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_is_zero() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let sim = Metric::Cosine.compare(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn cosine_ordering_prefers_larger() {
        assert!(Metric::Cosine.is_better(0.9, 0.1));
    }

    #[test]
    fn is_better_fn_matches_is_better_method() {
        let f = Metric::L2Squared.is_better_fn();
        assert_eq!(f(1.0, 2.0), Metric::L2Squared.is_better(1.0, 2.0));
        let f = Metric::Cosine.is_better_fn();
        assert_eq!(f(0.9, 0.1), Metric::Cosine.is_better(0.9, 0.1));
    }

    #[test]
    fn dot_product_basic() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        assert_eq!(Metric::DotProduct.compare(&a, &b), 11.0);
    }

    #[test]
    fn worst_match_values_lose_every_comparison() {
        let m = Metric::L2Squared;
        assert!(!m.is_better(m.worst_match_value(), 100.0));
        let c = Metric::Cosine;
        assert!(!c.is_better(c.worst_match_value(), -0.99));
    }

    #[test]
    fn round_trips_through_tag() {
        for m in [Metric::L2Squared, Metric::Cosine, Metric::DotProduct] {
            assert_eq!(Metric::from_tag(m.tag()), Some(m));
        }
        assert_eq!(Metric::from_tag(99), None);
    }
}
