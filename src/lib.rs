#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[cfg(feature = "counters")]
mod counters;
#[cfg(feature = "lock_api")]
mod sync;

mod arena;
mod check;
mod config;
mod error;
mod llist;
mod span;
mod tag;

pub use arena::{Arena, SliceArena, VecArena, DEFAULT_ARENA_LIMIT};
pub use check::{HeapReport, Violation};
pub use config::{
    CheckLevel, HeapConfig, DEFAULT_CHUNK_SIZE, DEFAULT_FIT_THRESHOLD, DEFAULT_SPLIT_THRESHOLD,
};
#[cfg(feature = "counters")]
pub use counters::Counters;
pub use error::HeapError;
pub use llist::MAX_ARENA_SIZE;
pub use span::Span;
#[cfg(feature = "lock_api")]
pub use sync::HeapLock;
pub use tag::Tag;

use core::num::NonZeroUsize;

use llist::FreeList;

// Block (8 bytes of overhead):
//   ?? | HDR: Tag (u32) | payload ........................ | FTR: Tag (u32) | ??
//                       ^ block offset, always ALIGNMENT-aligned
//
// Heap, as laid out by `init`:
//   pad (u32) | prologue HDR 8/a | prologue FTR 8/a | blocks ... | epilogue HDR 0/a
//
// The prologue and epilogue are permanently allocated, so looking one block past
// either end of the real blocks always finds an allocated neighbour.
// The free list lives beside the arena, keyed by block offset.

/// Boundary tag size.
pub const WSIZE: usize = core::mem::size_of::<Tag>();
/// Double word size.
pub const DSIZE: usize = 2 * WSIZE;
/// Every block size and block offset is a multiple of this.
pub const ALIGNMENT: usize = DSIZE;
/// Header and footer bytes of every block.
pub const OVERHEAD: usize = 2 * WSIZE;
/// Smallest block the heap will create.
pub const MIN_BLOCK_SIZE: usize = OVERHEAD + DSIZE;

/// Bytes taken by the padding word, the prologue and the epilogue.
const INIT_SIZE: usize = 4 * WSIZE;

/// Returns the block size needed to hold `size` bytes of payload.
///
/// ```rust
/// # use tagheap::*;
/// assert_eq!(adjusted_size(1), Ok(16));
/// assert_eq!(adjusted_size(100), Ok(112));
/// assert!(adjusted_size(usize::MAX).is_err());
/// ```
pub fn adjusted_size(size: usize) -> Result<usize, HeapError> {
    size.checked_add(OVERHEAD + ALIGNMENT - 1)
        .map(|padded| padded & !(ALIGNMENT - 1))
        .filter(|&asize| asize <= Tag::MAX_SIZE)
        .ok_or(HeapError::SizeOverflow { requested: size })
}

/// A handle to an allocation: the arena offset of its first payload byte.
///
/// Payload offsets are never zero, so `Option<Payload>` plays the role of a nullable pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Payload(NonZeroUsize);

impl Payload {
    #[inline]
    fn from_block(bp: usize) -> Self {
        match NonZeroUsize::new(bp) {
            Some(offset) => Self(offset),
            None => unreachable!("blocks never start at offset zero"),
        }
    }

    /// The arena offset of the payload.
    #[inline]
    pub const fn offset(self) -> usize {
        self.0.get()
    }
}

impl core::fmt::Display for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x}", self.offset())
    }
}

/// A snapshot of one block, as yielded by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// Offset of the payload; the header sits in the word before it.
    pub offset: usize,
    /// Total size, header and footer included.
    pub size: usize,
    pub allocated: bool,
}

impl BlockInfo {
    /// The bytes covered by the block, header through footer.
    pub const fn span(&self) -> Span {
        Span::from_base_size(self.offset - WSIZE, self.size)
    }

    pub const fn payload_size(&self) -> usize {
        self.size - OVERHEAD
    }
}

/// A boundary-tag heap over an [`Arena`].
///
/// Blocks carry their size and allocation state in a header and an identical footer,
/// which makes both neighbours of any block reachable in O(1).
/// Free blocks are additionally tracked by an explicit LIFO free list.
///
/// Initialize with [`Heap::with_arena`], or [`Heap::new`]/[`Heap::with_config`] followed by [`Heap::init`].
///
/// Call [`lock`](Heap::lock) to get a [`HeapLock`] to share the heap between threads.
///
/// # Examples
/// ```rust
/// # use tagheap::*;
/// let mut heap = Heap::with_arena(VecArena::new()).unwrap();
///
/// let a = heap.malloc(100).unwrap();
/// heap.payload_mut(a)[..5].copy_from_slice(b"hello");
///
/// let a = heap.realloc(Some(a), 5000).unwrap();
/// assert_eq!(&heap.payload(a)[..5], b"hello");
///
/// heap.free(a);
/// assert!(heap.check_heap(false).is_ok());
/// ```
pub struct Heap<A: Arena> {
    arena: A,
    config: HeapConfig,

    /// Offset of the prologue's payload, `None` until initialized.
    prologue: Option<usize>,

    free_list: FreeList,

    #[cfg(feature = "counters")]
    counters: counters::Counters,
}

impl<A: Arena> core::fmt::Debug for Heap<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("prologue", &self.prologue)
            .field("arena_end", &format_args!("{:#x}", self.arena.current_end()))
            .field("free_blocks", &self.free_list.len())
            .field("free_list_bytes", &self.free_list.table_bytes())
            .finish()
    }
}

impl<A: Arena> Heap<A> {
    /// Create an uninitialized heap with the default [`HeapConfig`].
    pub fn new(arena: A) -> Self {
        Self::with_config(arena, HeapConfig::default())
    }

    /// Create an uninitialized heap.
    pub fn with_config(arena: A, config: HeapConfig) -> Self {
        Self {
            arena,
            config,
            prologue: None,
            free_list: FreeList::new(),
            #[cfg(feature = "counters")]
            counters: counters::Counters::new(),
        }
    }

    /// Create and initialize a heap with the default [`HeapConfig`].
    pub fn with_arena(arena: A) -> Result<Self, HeapError> {
        let mut heap = Self::new(arena);
        heap.init()?;
        Ok(heap)
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Change how much checking `malloc` and `free` perform.
    pub fn set_check_level(&mut self, check: CheckLevel) {
        self.config = self.config.with_check(check);
    }

    pub fn arena(&self) -> &A {
        &self.arena
    }

    pub fn into_arena(self) -> A {
        self.arena
    }

    pub fn is_initialized(&self) -> bool {
        self.prologue.is_some()
    }

    /// Returns the [`Span`] covering every block between the prologue and the epilogue.
    pub fn heap_span(&self) -> Span {
        match self.prologue {
            Some(prologue) => Span::new(prologue + WSIZE, self.arena.current_end() - WSIZE),
            None => Span::empty(),
        }
    }

    #[inline]
    fn get(&self, at: usize) -> Tag {
        let mut word = [0; WSIZE];
        word.copy_from_slice(&self.arena.bytes()[at..at + WSIZE]);
        Tag::from_bytes(word)
    }

    #[inline]
    fn put(&mut self, at: usize, tag: Tag) {
        self.arena.bytes_mut()[at..at + WSIZE].copy_from_slice(&tag.to_bytes());
    }

    #[inline]
    fn header(&self, bp: usize) -> Tag {
        self.get(bp - WSIZE)
    }

    #[inline]
    fn footer(&self, bp: usize) -> Tag {
        self.get(bp + self.header(bp).size() - DSIZE)
    }

    #[inline]
    fn block_size(&self, bp: usize) -> usize {
        self.header(bp).size()
    }

    #[inline]
    fn next_block(&self, bp: usize) -> usize {
        bp + self.block_size(bp)
    }

    /// Reads the footer just below the header of `bp`.
    #[inline]
    fn prev_block(&self, bp: usize) -> usize {
        bp - self.get(bp - DSIZE).size()
    }

    /// Writes matching header and footer words for a block of `size` at `bp`.
    #[inline]
    fn set_block(&mut self, bp: usize, size: usize, allocated: bool) {
        let tag = Tag::pack(size, allocated);
        self.put(bp - WSIZE, tag);
        self.put(bp + size - DSIZE, tag);
    }

    /// Whether `bp` could be a block of this heap.
    fn owns(&self, bp: usize) -> bool {
        bp % ALIGNMENT == 0 && self.heap_span().contains(bp)
    }

    /// Initialize the heap: lay down the prologue and epilogue,
    /// then extend the arena by one chunk of free memory.
    ///
    /// The arena is [`reset`](Arena::reset) first, so calling this again
    /// discards every allocation.
    pub fn init(&mut self) -> Result<(), HeapError> {
        self.prologue = None;
        self.free_list.clear();
        self.arena.reset();
        #[cfg(feature = "counters")]
        {
            self.counters = counters::Counters::new();
        }

        let base = self.arena.extend(INIT_SIZE)?;
        debug_assert_eq!(base, 0);

        self.put(base, Tag(0));
        self.put(base + WSIZE, Tag::pack(DSIZE, true));
        self.put(base + DSIZE, Tag::pack(DSIZE, true));
        self.put(base + DSIZE + WSIZE, Tag::EPILOGUE);
        self.free_list.reserve(self.arena.current_end());
        #[cfg(feature = "counters")]
        self.counters.account_extend(INIT_SIZE);

        self.prologue = Some(base + DSIZE);

        if let Err(err) = self.extend_heap(self.config.chunk_size()) {
            self.prologue = None;
            return Err(err);
        }

        log::debug!("heap initialized, arena end {:#x}", self.arena.current_end());
        Ok(())
    }

    /// Extend the arena with a free block of at least `bytes`,
    /// returning the free block that now ends at the epilogue.
    fn extend_heap(&mut self, bytes: usize) -> Result<usize, HeapError> {
        let size = bytes.next_multiple_of(ALIGNMENT);
        if size > Tag::MAX_SIZE {
            return Err(HeapError::SizeOverflow { requested: bytes });
        }

        let end = self.arena.current_end();
        if end.checked_add(size).map_or(true, |new_end| new_end > MAX_ARENA_SIZE) {
            return Err(HeapError::ArenaExhausted {
                requested: size,
                remaining: MAX_ARENA_SIZE.saturating_sub(end),
            });
        }

        let bp = self.arena.extend(size)?;
        self.free_list.reserve(self.arena.current_end());
        #[cfg(feature = "counters")]
        self.counters.account_extend(size);

        log::trace!("arena extended by {size} bytes to {:#x}", self.arena.current_end());

        // the new block's header replaces the old epilogue
        self.set_block(bp, size, false);
        self.put(bp + size - WSIZE, Tag::EPILOGUE);

        self.free_list.push_front(bp);
        Ok(self.coalesce(bp))
    }

    fn run_checks(&self, caller: &str) {
        let check = self.config.check();
        if check.is_enabled() && self.is_initialized() {
            log::debug!("{caller}: checking heap");
            _ = self.check_heap(check == CheckLevel::Verbose);
        }
    }

    /// Allocate a block with at least `size` bytes of payload.
    ///
    /// Returns `None` if `size` is zero or if the arena cannot grow to fit the request.
    /// See [`try_malloc`](Heap::try_malloc) to find out why an allocation failed.
    pub fn malloc(&mut self, size: usize) -> Option<Payload> {
        match self.try_malloc(size) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("malloc({size}) failed: {err}");
                None
            }
        }
    }

    /// Allocate a block with at least `size` bytes of payload.
    ///
    /// `Ok(None)` is returned for zero-sized requests.
    pub fn try_malloc(&mut self, size: usize) -> Result<Option<Payload>, HeapError> {
        self.run_checks("malloc");

        if size == 0 {
            return Ok(None);
        }
        if !self.is_initialized() {
            return Err(HeapError::Uninitialized);
        }

        let asize = adjusted_size(size)?;

        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => self.extend_heap(asize.max(self.config.chunk_size()))?,
        };

        self.place(bp, asize);
        Ok(Some(Payload::from_block(bp)))
    }

    /// Best-fit search of the free list for a block of at least `asize` bytes.
    ///
    /// Settles for the first candidate within `fit_threshold` of a perfect fit.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;

        for bp in self.free_list.iter() {
            let tag = self.header(bp);
            if tag.is_allocated() || tag.size() < asize {
                continue;
            }

            let surplus = tag.size() - asize;
            if best.map_or(true, |(_, best_surplus)| surplus < best_surplus) {
                best = Some((bp, surplus));

                if surplus <= self.config.fit_threshold() {
                    break;
                }
            }
        }

        best.map(|(bp, _)| bp)
    }

    /// Allocate `asize` bytes at the start of the free block `bp`,
    /// splitting off the remainder if it's at least `split_threshold` large.
    fn place(&mut self, bp: usize, asize: usize) {
        let csize = self.block_size(bp);
        debug_assert!(csize >= asize);

        let was_free = self.free_list.remove(bp);
        debug_assert!(was_free, "placing into {bp:#x} which isn't in the free list");

        if csize - asize >= self.config.split_threshold() {
            self.set_block(bp, asize, true);

            let rest = bp + asize;
            self.set_block(rest, csize - asize, false);
            self.free_list.push_front(rest);
            self.coalesce(rest);

            log::trace!("placed {asize} bytes at {bp:#x}, split off {} bytes", csize - asize);
        } else {
            self.set_block(bp, csize, true);

            log::trace!("placed {asize} bytes at {bp:#x} in a {csize} byte block");
        }

        #[cfg(feature = "counters")]
        self.counters.account_alloc(self.block_size(bp) - OVERHEAD);
    }

    /// Merge the free, listed block `bp` with any free neighbours.
    ///
    /// Returns the surviving block, which stays in the free list.
    /// Absorbed blocks are removed from the free list exactly once.
    fn coalesce(&mut self, bp: usize) -> usize {
        let prev_allocated = self.get(bp - DSIZE).is_allocated();
        let next = self.next_block(bp);
        let next_tag = self.header(next);
        let size = self.block_size(bp);

        match (prev_allocated, next_tag.is_allocated()) {
            (true, true) => bp,
            (true, false) => {
                self.free_list.remove(next);
                self.set_block(bp, size + next_tag.size(), false);
                bp
            }
            (false, true) => {
                let prev = self.prev_block(bp);
                self.free_list.remove(bp);
                self.set_block(prev, self.block_size(prev) + size, false);
                prev
            }
            (false, false) => {
                let prev = self.prev_block(bp);
                self.free_list.remove(next);
                self.free_list.remove(bp);
                self.set_block(prev, self.block_size(prev) + size + next_tag.size(), false);
                prev
            }
        }
    }

    /// Free a previously allocated block.
    ///
    /// `ptr` must have been returned by this heap and not freed since.
    /// Blocks which aren't currently allocated are ignored with a warning.
    pub fn free(&mut self, ptr: Payload) {
        self.run_checks("free");

        let bp = ptr.offset();
        if !self.owns(bp) {
            log::warn!("free({ptr}): not a block of this heap, ignoring");
            return;
        }

        let tag = self.header(bp);
        if !tag.is_allocated() {
            log::warn!("free({ptr}): block is already free, ignoring");
            return;
        }

        #[cfg(feature = "counters")]
        self.counters.account_dealloc(tag.size() - OVERHEAD);

        self.set_block(bp, tag.size(), false);
        self.free_list.push_front(bp);
        self.coalesce(bp);
    }

    /// Resize an allocation to at least `size` bytes of payload.
    ///
    /// - `size == 0` frees `ptr` (if any) and returns `None`.
    /// - `ptr == None` behaves as [`malloc`](Heap::malloc).
    /// - If the block is already large enough, `ptr` is returned unchanged.
    ///   Shrinking never splits the block.
    /// - Otherwise the block grows in place by absorbing a free predecessor,
    ///   a free successor, or both, in that order of preference. Absorbing the
    ///   predecessor moves the payload down to the predecessor's offset.
    /// - Failing that, the payload is moved to a fresh allocation and `ptr` is freed.
    ///
    /// Payload bytes are preserved up to the smaller of the old and new sizes.
    ///
    /// If `size` can't be represented by a block, `None` is returned and `ptr` stays allocated.
    ///
    /// # Panics
    /// Panics if the payload has to move and the arena cannot provide a new block,
    /// as continuing would lose the caller's data.
    pub fn realloc(&mut self, ptr: Option<Payload>, size: usize) -> Option<Payload> {
        if size == 0 {
            if let Some(ptr) = ptr {
                self.free(ptr);
            }
            return None;
        }

        let Some(ptr) = ptr else {
            return self.malloc(size);
        };

        let bp = ptr.offset();
        if !self.owns(bp) {
            log::warn!("realloc({ptr}, {size}): not a block of this heap, ignoring");
            return None;
        }

        let new_size = match adjusted_size(size) {
            Ok(new_size) => new_size,
            Err(err) => {
                log::warn!("realloc({ptr}, {size}) failed: {err}");
                return None;
            }
        };

        let csize = self.block_size(bp);
        if new_size <= csize {
            return Some(ptr);
        }

        let prev_tag = self.get(bp - DSIZE);
        let next = self.next_block(bp);
        let next_tag = self.header(next);
        let prev_free = !prev_tag.is_allocated();
        let next_free = !next_tag.is_allocated();

        let grown = if prev_free && csize + prev_tag.size() >= new_size {
            self.grow_down(bp, csize, prev_tag.size(), 0)
        } else if next_free && csize + next_tag.size() >= new_size {
            self.free_list.remove(next);
            self.set_block(bp, csize + next_tag.size(), true);
            bp
        } else if prev_free && next_free && csize + prev_tag.size() + next_tag.size() >= new_size {
            self.free_list.remove(next);
            self.grow_down(bp, csize, prev_tag.size(), next_tag.size())
        } else {
            return Some(self.relocate(ptr, size, csize));
        };

        #[cfg(feature = "counters")]
        self.counters.account_grow_in_place(csize - OVERHEAD, self.block_size(grown) - OVERHEAD);

        Some(Payload::from_block(grown))
    }

    /// Absorb the free predecessor (and `next_size` bytes of an already
    /// unlisted successor) into the allocated block at `bp`.
    fn grow_down(&mut self, bp: usize, csize: usize, prev_size: usize, next_size: usize) -> usize {
        let prev = bp - prev_size;
        self.free_list.remove(prev);

        // the ranges overlap whenever the payload is larger than the predecessor
        self.arena.bytes_mut().copy_within(bp..bp + csize - OVERHEAD, prev);
        self.set_block(prev, prev_size + csize + next_size, true);

        log::trace!("grew {bp:#x} down into {prev:#x}");
        prev
    }

    /// Move the payload of `ptr` into a fresh allocation of `size` bytes and free `ptr`.
    fn relocate(&mut self, ptr: Payload, size: usize, csize: usize) -> Payload {
        let new = match self.try_malloc(size) {
            Ok(Some(new)) => new,
            Ok(None) => unreachable!("relocation of {ptr} requested zero bytes"),
            Err(err) => {
                log::error!("realloc({ptr}, {size}): cannot relocate payload: {err}");
                panic!("realloc({ptr}, {size}): out of memory while relocating payload: {err}");
            }
        };

        let old = ptr.offset();
        self.arena.bytes_mut().copy_within(old..old + csize - OVERHEAD, new.offset());
        self.free(ptr);

        log::debug!("realloc moved {ptr} to {new}");
        new
    }

    /// The number of payload bytes available at `ptr`, at least as many as requested.
    pub fn usable_size(&self, ptr: Payload) -> usize {
        self.block_size(ptr.offset()) - OVERHEAD
    }

    /// The [`Span`] of arena offsets `ptr` may use.
    pub fn payload_span(&self, ptr: Payload) -> Span {
        Span::from_base_size(ptr.offset(), self.usable_size(ptr))
    }

    pub fn payload(&self, ptr: Payload) -> &[u8] {
        &self.arena.bytes()[self.payload_span(ptr).to_range()]
    }

    pub fn payload_mut(&mut self, ptr: Payload) -> &mut [u8] {
        let range = self.payload_span(ptr).to_range();
        &mut self.arena.bytes_mut()[range]
    }

    /// Iterate over every block in address order, excluding the prologue and epilogue.
    pub fn blocks(&self) -> Blocks<'_, A> {
        Blocks { heap: self, bp: self.prologue.map(|prologue| prologue + DSIZE) }
    }

    /// Iterate over the free blocks' offsets in free list order.
    pub fn free_list(&self) -> impl Iterator<Item = usize> + '_ {
        self.free_list.iter()
    }

    /// Wrap in [`HeapLock`], a mutex-locked wrapper struct using [`lock_api`].
    ///
    /// # Examples
    /// ```
    /// # use tagheap::*;
    /// use spin::Mutex;
    /// let heap = Heap::with_arena(VecArena::new()).unwrap();
    /// let heap = heap.lock::<Mutex<()>>();
    ///
    /// let a = heap.malloc(32).unwrap();
    /// heap.free(a);
    /// ```
    #[cfg(feature = "lock_api")]
    pub fn lock<R: lock_api::RawMutex>(self) -> HeapLock<R, A> {
        HeapLock::new(self)
    }
}

/// An iterator over the blocks of a [`Heap`] in address order.
///
/// This `struct` is created by [`Heap::blocks`]. See its documentation for more.
#[derive(Debug, Clone, Copy)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Blocks<'a, A: Arena> {
    heap: &'a Heap<A>,
    bp: Option<usize>,
}

impl<A: Arena> Iterator for Blocks<'_, A> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.bp?;
        let tag = self.heap.header(bp);

        // stop at the epilogue, or at anything that would run off the arena
        if tag.size() == 0 || bp + tag.size() > self.heap.arena.current_end() {
            self.bp = None;
            return None;
        }

        self.bp = Some(bp + tag.size());
        Some(BlockInfo { offset: bp, size: tag.size(), allocated: tag.is_allocated() })
    }
}
