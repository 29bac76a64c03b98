//! Chunked byte arena with logical spans.
//!
//! The arena backs the string interner: strings live in large append-only
//! chunks and are referred to by `(chunk, offset, len)` triples rather than
//! pointers. Offsets are stable because a chunk's written prefix is never
//! modified, so spans stay valid across chunk publication and arena growth.
//!
//! The active chunk is owned exclusively by the arena while it is being
//! filled. Publication ([`Arena::publish`]) freezes it into a shared
//! immutable chunk list, which finished indexes clone (cheap `Arc` bumps)
//! and resolve against without any locking.

use std::sync::Arc;

/// Default chunk size. Allocations larger than this get their own chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Logical location of a byte run within an [`Arena`].
///
/// Span equality is positional: two equal spans always resolve to the same
/// bytes. The interner guarantees the converse for strings it deduplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub(crate) chunk: u32,
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

impl Span {
    /// The canonical span of the empty string.
    pub const EMPTY: Span = Span {
        chunk: 0,
        offset: 0,
        len: 0,
    };

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for the empty span.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Chunked append-only byte arena.
pub struct Arena {
    frozen: Vec<Arc<[u8]>>,
    active: Vec<u8>,
    total: u64,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            frozen: Vec::new(),
            active: Vec::new(),
            total: 0,
        }
    }

    /// Total bytes ever allocated.
    pub fn total_allocated(&self) -> u64 {
        self.total
    }

    /// Append `bytes`, returning the span of the stored copy.
    pub fn alloc(&mut self, bytes: &[u8]) -> Span {
        if bytes.is_empty() {
            return Span::EMPTY;
        }
        if self.active.capacity() - self.active.len() < bytes.len() {
            self.freeze_active();
            self.active = Vec::with_capacity(bytes.len().max(DEFAULT_CHUNK_SIZE));
        }
        let offset = self.active.len() as u32;
        self.active.extend_from_slice(bytes);
        self.total += bytes.len() as u64;
        Span {
            chunk: self.frozen.len() as u32,
            offset,
            len: bytes.len() as u32,
        }
    }

    /// Resolve a span to its bytes.
    pub fn bytes(&self, span: Span) -> &[u8] {
        if span.len == 0 {
            return &[];
        }
        let (start, end) = (span.offset as usize, (span.offset + span.len) as usize);
        let chunk = span.chunk as usize;
        if chunk < self.frozen.len() {
            &self.frozen[chunk][start..end]
        } else {
            &self.active[start..end]
        }
    }

    /// Search every chunk for `needle`, returning the span of the first
    /// occurrence. O(total stored bytes).
    pub fn find(&self, needle: &[u8]) -> Option<Span> {
        if needle.is_empty() {
            return Some(Span::EMPTY);
        }
        for (i, chunk) in self
            .frozen
            .iter()
            .map(|c| c.as_ref())
            .chain(std::iter::once(self.active.as_slice()))
            .enumerate()
        {
            if chunk.len() < needle.len() {
                continue;
            }
            if let Some(offset) = chunk
                .windows(needle.len())
                .position(|window| window == needle)
            {
                return Some(Span {
                    chunk: i as u32,
                    offset: offset as u32,
                    len: needle.len() as u32,
                });
            }
        }
        None
    }

    fn freeze_active(&mut self) {
        if !self.active.is_empty() {
            let chunk = std::mem::take(&mut self.active);
            self.frozen.push(Arc::from(chunk));
        }
    }

    /// Freeze the active chunk and return an immutable view of every chunk.
    /// All spans handed out so far resolve against the returned snapshot.
    pub fn publish(&mut self) -> ArenaSnapshot {
        self.freeze_active();
        ArenaSnapshot {
            chunks: self.frozen.clone(),
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("chunks", &(self.frozen.len() + 1))
            .field("total", &self.total)
            .finish()
    }
}

/// Immutable shared view of an arena's chunks.
#[derive(Clone, Debug)]
pub struct ArenaSnapshot {
    chunks: Vec<Arc<[u8]>>,
}

impl ArenaSnapshot {
    /// Resolve a span to its bytes.
    pub fn bytes(&self, span: Span) -> &[u8] {
        if span.len == 0 {
            return &[];
        }
        let (start, end) = (span.offset as usize, (span.offset + span.len) as usize);
        &self.chunks[span.chunk as usize][start..end]
    }

    /// Resolve a span to its string.
    pub fn str(&self, span: Span) -> &str {
        // spans are only created for whole interned strings or byte-equal
        // substring matches of them, so the bytes are always valid UTF-8
        std::str::from_utf8(self.bytes(span)).expect("interned span is valid UTF-8")
    }
}
