//! String and value interning.
//!
//! [`StringInterner`] trades CPU for near-zero duplication: a cache hit is
//! O(1), a miss falls back to a byte-substring scan over everything stored so
//! far (which may resolve to a slice of a longer string), and only then is a
//! fresh copy appended. Real schedule data is highly repetitive, so almost
//! everything after the first few snapshots is a hit.
//!
//! The exact-match cache is keyed by the *stored* string, not the input, so
//! no copy of the caller's data is retained. Disabling the cache keeps
//! results identical but makes every intern a scan.

use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;

use hashbrown::HashTable;

use crate::arena::{Arena, ArenaSnapshot, Span};

/// Deduplicating string store backed by a chunked arena.
pub struct StringInterner {
    arena: Arena,
    cache: Option<HashTable<Span>>,
    hasher: RandomState,
    /// Total bytes requested, including hits.
    requested: u64,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            arena: Arena::new(),
            cache: None,
            hasher: RandomState::new(),
            requested: 0,
        }
    }

    /// Enable the exact-match cache with an initial capacity, or disable it
    /// with `0`. Disabling degrades interning to quadratic time.
    pub fn set_cache(&mut self, capacity: usize) {
        self.cache = (capacity != 0).then(|| HashTable::with_capacity(capacity));
    }

    /// Intern `s`, scanning stored bytes for an existing occurrence.
    pub fn intern(&mut self, s: &str) -> Span {
        self.requested += s.len() as u64;
        if s.is_empty() {
            return Span::EMPTY;
        }
        if let Some(span) = self.lookup(s) {
            return span;
        }
        if let Some(span) = self.arena.find(s.as_bytes()) {
            self.record(span);
            return span;
        }
        let span = self.arena.alloc(s.as_bytes());
        self.record(span);
        span
    }

    /// Intern `s` without the substring scan: cache hit or fresh append.
    /// For low-value, high-cardinality fields where the scan does not pay.
    pub fn intern_fast(&mut self, s: &str) -> Span {
        self.requested += s.len() as u64;
        if s.is_empty() {
            return Span::EMPTY;
        }
        if let Some(span) = self.lookup(s) {
            return span;
        }
        let span = self.arena.alloc(s.as_bytes());
        self.record(span);
        span
    }

    /// Resolve a span.
    pub fn get(&self, span: Span) -> &str {
        std::str::from_utf8(self.arena.bytes(span)).expect("interned span is valid UTF-8")
    }

    /// Total bytes requested across all intern calls.
    pub fn bytes_requested(&self) -> u64 {
        self.requested
    }

    /// Total bytes actually stored.
    pub fn bytes_stored(&self) -> u64 {
        self.arena.total_allocated()
    }

    /// Freeze stored chunks into a shareable snapshot. Spans created so far
    /// (and in the future) resolve against it.
    pub fn publish(&mut self) -> ArenaSnapshot {
        self.arena.publish()
    }

    fn lookup(&self, s: &str) -> Option<Span> {
        let cache = self.cache.as_ref()?;
        let hash = self.hasher.hash_one(s.as_bytes());
        cache
            .find(hash, |&span| self.arena.bytes(span) == s.as_bytes())
            .copied()
    }

    fn record(&mut self, span: Span) {
        let arena = &self.arena;
        let hasher = &self.hasher;
        if let Some(cache) = self.cache.as_mut() {
            let hash = hasher.hash_one(arena.bytes(span));
            cache.insert_unique(hash, span, |&sp| hasher.hash_one(arena.bytes(sp)));
        }
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringInterner")
            .field("requested", &self.requested)
            .field("stored", &self.bytes_stored())
            .field("cached", &self.cache.as_ref().map_or(0, |c| c.len()))
            .finish()
    }
}

/// Structural deduplication of leaf records. Linear scan; fine for the small
/// distinct sets real data produces (well under 10^4).
pub struct ValueInterner<T> {
    items: Vec<Arc<T>>,
    requested: u64,
}

impl<T: PartialEq> ValueInterner<T> {
    pub fn new() -> Self {
        ValueInterner {
            items: Vec::new(),
            requested: 0,
        }
    }

    /// Return a shared copy of `value`, reusing a structurally equal one if
    /// already stored.
    pub fn intern(&mut self, value: T) -> Arc<T> {
        self.requested += 1;
        if let Some(found) = self.items.iter().find(|e| ***e == value) {
            return Arc::clone(found);
        }
        let stored = Arc::new(value);
        self.items.push(Arc::clone(&stored));
        stored
    }

    /// Distinct values stored.
    pub fn distinct(&self) -> usize {
        self.items.len()
    }
}

impl<T: PartialEq> Default for ValueInterner<T> {
    fn default() -> Self {
        Self::new()
    }
}
