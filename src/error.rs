use thiserror::Error;

/// Errors surfaced by [`Heap`](crate::Heap) and [`Arena`](crate::Arena) operations.
///
/// None of these leave the heap in a partially-updated state: each is
/// returned before the first boundary tag or free list link is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The arena provider refused to grow any further.
    #[error("arena exhausted: requested {requested} bytes with {remaining} remaining")]
    ArenaExhausted { requested: usize, remaining: usize },

    /// The request cannot be described by a block size.
    #[error("request of {requested} bytes exceeds the maximum block size")]
    SizeOverflow { requested: usize },

    /// [`Heap::init`](crate::Heap::init) hasn't been called, or failed.
    #[error("heap is not initialized")]
    Uninitialized,
}
