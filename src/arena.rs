use alloc::vec::Vec;

use crate::HeapError;

/// The arena size ceiling used by [`VecArena::new`]: 20 MiB.
pub const DEFAULT_ARENA_LIMIT: usize = 20 * (1 << 20);

/// The memory source backing a [`Heap`](crate::Heap).
///
/// An arena is a single contiguous, append-only byte region addressed by
/// offset from its base. It only ever grows (until [`reset`](Arena::reset)),
/// and bytes below [`current_end`](Arena::current_end) never move relative
/// to the base, so offsets handed out by the heap stay valid.
///
/// The heap calls [`extend`](Arena::extend) when no free block can satisfy a request.
/// Implementations must either grow by exactly `nbytes` or fail without
/// changing [`current_end`](Arena::current_end).
pub trait Arena {
    /// Grow the arena by `nbytes`, returning the offset of the start of the new span
    /// (the previous end), or [`HeapError::ArenaExhausted`] if a hard ceiling is reached.
    fn extend(&mut self, nbytes: usize) -> Result<usize, HeapError>;

    /// The offset one past the last byte of the arena.
    fn current_end(&self) -> usize;

    /// Discard the whole arena, returning its end to zero.
    fn reset(&mut self);

    /// The bytes of `0..current_end()`.
    fn bytes(&self) -> &[u8];

    /// The bytes of `0..current_end()`.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// An [`Arena`] backed by an owned, growable buffer with a hard size ceiling.
#[derive(Debug, Clone)]
pub struct VecArena {
    buf: Vec<u8>,
    limit: usize,
}

impl VecArena {
    /// Create an empty arena limited to [`DEFAULT_ARENA_LIMIT`] bytes.
    pub const fn new() -> Self {
        Self::with_limit(DEFAULT_ARENA_LIMIT)
    }

    /// Create an empty arena that refuses to grow beyond `limit` bytes.
    pub const fn with_limit(limit: usize) -> Self {
        Self { buf: Vec::new(), limit }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for VecArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena for VecArena {
    fn extend(&mut self, nbytes: usize) -> Result<usize, HeapError> {
        let old_end = self.buf.len();
        let remaining = self.limit.saturating_sub(old_end);

        if nbytes > remaining {
            return Err(HeapError::ArenaExhausted { requested: nbytes, remaining });
        }

        self.buf.resize(old_end + nbytes, 0);
        Ok(old_end)
    }

    fn current_end(&self) -> usize {
        self.buf.len()
    }

    fn reset(&mut self) {
        self.buf.clear();
    }

    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// An [`Arena`] that hands out a caller-provided buffer front to back.
///
/// Useful for static buffers or memory obtained elsewhere.
/// The arena is exhausted once the break reaches the end of the slice.
#[derive(Debug)]
pub struct SliceArena<'a> {
    memory: &'a mut [u8],
    brk: usize,
}

impl<'a> SliceArena<'a> {
    pub fn new(memory: &'a mut [u8]) -> Self {
        Self { memory, brk: 0 }
    }

    /// The total number of bytes this arena may grow to.
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl<'a> From<&'a mut [u8]> for SliceArena<'a> {
    fn from(memory: &'a mut [u8]) -> Self {
        Self::new(memory)
    }
}

impl Arena for SliceArena<'_> {
    fn extend(&mut self, nbytes: usize) -> Result<usize, HeapError> {
        let old_brk = self.brk;
        let remaining = self.memory.len() - old_brk;

        if nbytes > remaining {
            return Err(HeapError::ArenaExhausted { requested: nbytes, remaining });
        }

        self.brk += nbytes;
        Ok(old_brk)
    }

    fn current_end(&self) -> usize {
        self.brk
    }

    fn reset(&mut self) {
        self.brk = 0;
    }

    fn bytes(&self) -> &[u8] {
        &self.memory[..self.brk]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory[..self.brk]
    }
}
