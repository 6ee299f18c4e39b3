//! Bounded/unbounded binary heap with best-top and worst-top ordering modes.
//!
//! This mirrors the heap contract used throughout the graph algorithms:
//! `search_layer` keeps one best-top heap of candidates to expand and one
//! worst-top heap of the current best results, and the neighbor-selection
//! heuristic keeps a best-top working set and a best-top discard pile.
//! A single generic type serves all of these rather than one type per mode,
//! with the ordering branching on a runtime flag — the hot operations
//! (`replace_top`, `insert_or_replace_if_better`) are shared code.

/// Ordering mode for a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapMode {
    /// The root is the element the comparator prefers (smallest distance
    /// for "lower is better" metrics, highest similarity otherwise).
    BestTop,
    /// The root is the element the comparator dislikes most — the one to
    /// evict first when the heap is full and a better candidate arrives.
    WorstTop,
}

/// Unbounded capacity sentinel, matching the C library's `NOLIMIT_HEAP`.
pub const NO_LIMIT: i64 = -1;

/// Initial backing capacity for an unbounded heap before it starts doubling.
const DEFAULT_CAPACITY: usize = 50;

/// One entry in the heap: a comparison value and an opaque payload.
#[derive(Debug, Clone, Copy)]
pub struct HeapNode<T> {
    /// The comparison value produced by a distance kernel (or similar).
    pub distance: f32,
    /// Caller-defined payload — a `NodeId`, a vector id, or anything else
    /// that should travel alongside the ranking value.
    pub payload: T,
}

impl<T> HeapNode<T> {
    /// Builds a new heap entry.
    pub fn new(distance: f32, payload: T) -> Self {
        Self { distance, payload }
    }
}

/// Errors returned by fallible heap operations.
///
/// These are ordinary recoverable conditions (an empty pop, a full bounded
/// insert) — not the internal-invariant violations the heap also guards
/// against via `panic_if!`, which abort instead of returning a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// `pop`/`peek`/`replace_top` called on an empty heap.
    #[error("heap is empty")]
    Empty,
    /// `insert` called on a bounded heap that is already at capacity.
    #[error("heap is full")]
    Full,
}

/// An array-backed binary heap parameterized by an `is_better` comparator
/// and a best-top/worst-top mode.
#[derive(Debug, Clone)]
pub struct Heap<T> {
    data: Vec<HeapNode<T>>,
    mode: HeapMode,
    /// `None` means unbounded (grows by doubling from [`DEFAULT_CAPACITY`]).
    capacity: Option<usize>,
    is_better: fn(f32, f32) -> bool,
}

impl<T> Heap<T> {
    /// Creates a new heap.
    ///
    /// `capacity = None` means unbounded (starts at a backing capacity of
    /// 50 and doubles on demand, matching `NOLIMIT_HEAP`/`DEFAULT_SIZE`).
    /// `is_better(x, y)` must report whether `x` is a strictly better match
    /// than `y`; the heap roots the element the mode favors.
    #[must_use]
    pub fn new(mode: HeapMode, capacity: Option<usize>, is_better: fn(f32, f32) -> bool) -> Self {
        let initial = capacity.unwrap_or(DEFAULT_CAPACITY);
        Self {
            data: Vec::with_capacity(initial),
            mode,
            capacity,
            is_better,
        }
    }

    /// Number of elements currently held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `true` if the heap holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The configured capacity, or `None` if unbounded.
    #[must_use]
    pub fn cap(&self) -> Option<usize> {
        self.capacity
    }

    /// `true` if a bounded heap is at capacity. An unbounded heap is never full.
    #[must_use]
    pub fn full(&self) -> bool {
        matches!(self.capacity, Some(c) if self.data.len() >= c)
    }

    /// Non-destructively inspects the root element.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Empty`] if the heap has no elements.
    pub fn peek(&self) -> Result<&HeapNode<T>, HeapError> {
        self.data.first().ok_or(HeapError::Empty)
    }

    /// Inserts a node, growing an unbounded heap if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Full`] if the heap is bounded and already at
    /// capacity.
    pub fn insert(&mut self, node: HeapNode<T>) -> Result<(), HeapError> {
        if self.full() {
            return Err(HeapError::Full);
        }
        self.data.push(node);
        let last = self.data.len() - 1;
        self.sift_up(last);
        Ok(())
    }

    /// Removes and returns the root element.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Empty`] if the heap has no elements.
    pub fn pop(&mut self) -> Result<HeapNode<T>, HeapError> {
        if self.data.is_empty() {
            return Err(HeapError::Empty);
        }
        let last = self.data.len() - 1;
        self.data.swap(0, last);
        let root = self.data.pop().expect("heap was non-empty above");
        if !self.data.is_empty() {
            self.sift_down(0);
        }
        Ok(root)
    }

    /// Overwrites the root with `node` and restores the heap invariant by
    /// sifting down.
    ///
    /// # Errors
    ///
    /// Returns [`HeapError::Empty`] if the heap has no elements — there is
    /// no root to replace.
    pub fn replace_top(&mut self, node: HeapNode<T>) -> Result<(), HeapError> {
        if self.data.is_empty() {
            return Err(HeapError::Empty);
        }
        self.data[0] = node;
        self.sift_down(0);
        Ok(())
    }

    /// Convenience combining insert and replace: if there is room, insert;
    /// otherwise, if `node` is a better match than the current root, evict
    /// the root in its favor; otherwise drop `node` silently.
    ///
    /// Always succeeds — there is no error condition, only "did it land".
    /// Returns `true` if `node` was retained (inserted or swapped in).
    pub fn insert_or_replace_if_better(&mut self, node: HeapNode<T>) -> bool {
        if !self.full() {
            self.insert(node).expect("checked not full above");
            return true;
        }
        let root_distance = self.peek().expect("full implies non-empty").distance;
        if (self.is_better)(node.distance, root_distance) {
            self.replace_top(node).expect("checked non-empty above");
            true
        } else {
            false
        }
    }

    /// Drains the heap into a `Vec`, worst-first as stored internally (not
    /// sorted) — callers that need a sorted result should repeatedly `pop`.
    pub fn into_vec(self) -> Vec<HeapNode<T>> {
        self.data
    }

    /// `true` if `candidate` should be preferred to `reference` by this
    /// heap's comparator.
    #[must_use]
    pub fn is_better(&self, candidate: f32, reference: f32) -> bool {
        (self.is_better)(candidate, reference)
    }

    /// Root-favoring predicate: does `a` belong above `b` in this heap's
    /// array, given its mode?
    fn belongs_above(&self, a: f32, b: f32) -> bool {
        match self.mode {
            HeapMode::BestTop => (self.is_better)(a, b),
            HeapMode::WorstTop => !(self.is_better)(a, b) && a != b,
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.belongs_above(self.data[i].distance, self.data[parent].distance) {
                self.data.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.data.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut best = i;

            if left < len && self.belongs_above(self.data[left].distance, self.data[best].distance)
            {
                best = left;
            }
            if right < len
                && self.belongs_above(self.data[right].distance, self.data[best].distance)
            {
                best = right;
            }
            if best == i {
                break;
            }
            self.data.swap(i, best);
            i = best;
        }
    }
}
