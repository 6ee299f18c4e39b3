//! Open-chained hash map from 64-bit vector id to an arena-indexed value.
//!
//! Mirrors the id→pointer map the graph algorithms depend on for O(1)
//! duplicate detection and deletion: `map.contains(id) ⇔` the id's node is
//! alive in the index. Built as a small bucket-of-chains table rather than
//! reaching for `std::collections::HashMap` so that the load-factor/rehash
//! policy, and the "map never checks for duplicates, the caller does"
//! contract, are explicit and match the component this crate is modeled on.

/// Default load-factor threshold (elements / bucket count) that triggers a rehash.
pub const DEFAULT_LOAD_FACTOR_THRESHOLD: u16 = 15;

const DEFAULT_BUCKET_COUNT: usize = 64;

struct Entry {
    key: u64,
    value: u32,
}

/// A chained hash map keyed by non-zero `u64` vector ids, valued by `u32`
/// arena indices (`NodeId`s in practice).
#[derive(Debug)]
pub struct IdMap {
    buckets: Vec<Vec<Entry>>,
    elements: usize,
    load_factor_threshold: u16,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

impl IdMap {
    /// Creates a map with `initial_buckets` buckets and the given rehash
    /// threshold. `initial_buckets` is rounded up to at least 1.
    #[must_use]
    pub fn new(initial_buckets: usize, load_factor_threshold: u16) -> Self {
        let n = initial_buckets.max(1);
        Self {
            buckets: (0..n).map(|_| Vec::new()).collect(),
            elements: 0,
            load_factor_threshold,
        }
    }

    /// `map_hash(k) = k mod mapsize`.
    #[inline]
    fn bucket_index(&self, key: u64) -> usize {
        (key % self.buckets.len() as u64) as usize
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements
    }

    /// `true` if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }

    /// `true` if `key` is present.
    #[must_use]
    pub fn has(&self, key: u64) -> bool {
        let idx = self.bucket_index(key);
        self.buckets[idx].iter().any(|e| e.key == key)
    }

    /// Looks up the value for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<u32> {
        let idx = self.bucket_index(key);
        self.buckets[idx]
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value)
    }

    /// Inserts `key -> value`, triggering a rehash if the load factor
    /// threshold is now exceeded.
    ///
    /// Does not check for an existing entry with the same key — duplicate
    /// policy is the caller's responsibility, matching the component this
    /// is modeled on. Inserting over an existing key overwrites it in place
    /// (callers that need duplicate rejection must `has` first).
    pub fn insert(&mut self, key: u64, value: u32) {
        let idx = self.bucket_index(key);
        if let Some(existing) = self.buckets[idx].iter_mut().find(|e| e.key == key) {
            existing.value = value;
            return;
        }
        self.buckets[idx].push(Entry { key, value });
        self.elements += 1;

        let load_factor = self.elements as u64 * 100 / self.buckets.len() as u64;
        if load_factor > self.load_factor_threshold as u64 * 100 {
            self.rehash(self.buckets.len() * 2);
        }
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: u64) -> Option<u32> {
        let idx = self.bucket_index(key);
        let bucket = &mut self.buckets[idx];
        let pos = bucket.iter().position(|e| e.key == key)?;
        let removed = bucket.swap_remove(pos);
        self.elements -= 1;
        Some(removed.value)
    }

    /// Clears the map back to empty, keeping the current bucket count.
    pub fn purge(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.elements = 0;
    }

    /// Iterates over all `(key, value)` pairs currently stored.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.buckets
            .iter()
            .flat_map(|b| b.iter().map(|e| (e.key, e.value)))
    }

    fn rehash(&mut self, new_bucket_count: usize) {
        let mut new_buckets: Vec<Vec<Entry>> = (0..new_bucket_count).map(|_| Vec::new()).collect();
        for bucket in self.buckets.drain(..) {
            for entry in bucket {
                let idx = (entry.key % new_bucket_count as u64) as usize;
                new_buckets[idx].push(entry);
            }
        }
        self.buckets = new_buckets;
    }
}

impl Default for IdMap {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_COUNT, DEFAULT_LOAD_FACTOR_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let mut m = IdMap::default();
        m.insert(42, 7);
        assert_eq!(m.get(42), Some(7));
        assert!(m.has(42));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn remove_returns_value_and_forgets_key() {
        let mut m = IdMap::default();
        m.insert(1, 10);
        assert_eq!(m.remove(1), Some(10));
        assert_eq!(m.remove(1), None);
        assert!(!m.has(1));
        assert_eq!(m.len(), 0);
    }

    #[test]
    fn insert_overwrites_existing_key_without_duplicate_check() {
        let mut m = IdMap::default();
        m.insert(5, 1);
        m.insert(5, 2);
        assert_eq!(m.get(5), Some(2));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn rehash_preserves_all_entries_under_heavy_load() {
        let mut m = IdMap::new(4, 2);
        for id in 1..2000u64 {
            m.insert(id, id as u32);
        }
        assert_eq!(m.len(), 1999);
        for id in 1..2000u64 {
            assert_eq!(m.get(id), Some(id as u32));
        }
    }

    #[test]
    fn purge_empties_the_map() {
        let mut m = IdMap::default();
        for id in 1..50u64 {
            m.insert(id, id as u32);
        }
        m.purge();
        assert_eq!(m.len(), 0);
        assert!(!m.has(1));
    }

    #[test]
    fn iter_yields_every_pair() {
        let mut m = IdMap::default();
        m.insert(1, 10);
        m.insert(2, 20);
        let mut pairs: Vec<_> = m.iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(1, 10), (2, 20)]);
    }
}
