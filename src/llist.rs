use alloc::vec::Vec;

use crate::{ALIGNMENT, MIN_BLOCK_SIZE};

/// No member, in either link field.
const NIL: u32 = u32::MAX >> 1;
/// Stored in `next` of a slot holding no member.
const VACANT: u32 = u32::MAX;
/// Set in `prev` when the member starts `ALIGNMENT` bytes into its slot.
const ODD: u32 = 1 << 31;

/// Largest arena the free list can address.
///
/// Links store `offset / ALIGNMENT` in 31 bits, with the top value reserved for none.
pub const MAX_ARENA_SIZE: usize = (NIL as usize).saturating_mul(ALIGNMENT);

/// Linkage of one free list member.
///
/// `prev == None` means the member is first and points back at the head.
/// `next == None` means the member is last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Link {
    pub next: Option<usize>,
    pub prev: Option<usize>,
}

/// Packed form of a [`Link`], one per `MIN_BLOCK_SIZE` of arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    next: u32,
    prev: u32,
}

impl Entry {
    const EMPTY: Self = Self { next: VACANT, prev: NIL };

    #[inline]
    fn is_vacant(self) -> bool {
        self.next == VACANT
    }

    #[inline]
    fn is_odd(self) -> bool {
        self.prev & ODD != 0
    }

    #[inline]
    fn link(self) -> Link {
        Link { next: decode(self.next), prev: decode(self.prev & !ODD) }
    }
}

#[inline]
fn encode(block: Option<usize>) -> u32 {
    match block {
        Some(block) => {
            debug_assert!(
                block < MAX_ARENA_SIZE,
                "block {block:#x} is beyond the addressable arena"
            );
            (block / ALIGNMENT) as u32
        }
        None => NIL,
    }
}

#[inline]
fn decode(word: u32) -> Option<usize> {
    (word != NIL).then(|| word as usize * ALIGNMENT)
}

/// Describes the explicit free list.
///
/// The list is:
///  * **Keyed by block offset**, links live in a side table rather than in free payloads
///  * **Anchored by a head** which isn't a block and isn't iterated over;
///    its `next` and `prev` are the first and last members
///  * **Doubly linked** to allow O(1) removal given only the member's offset
///  * **LIFO**, members are inserted at the front
///
/// Blocks are at least `MIN_BLOCK_SIZE` apart, so one 8-byte entry per `MIN_BLOCK_SIZE`
/// of arena suffices. The table costs half the arena's size at most.
/// Call [`FreeList::reserve`] whenever the arena grows.
///
/// This data structure is not thread-safe, use mutexes/locks to mutually exclude data access.
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    head: Link,
    entries: Vec<Entry>,
    len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { head: Link { next: None, prev: None }, entries: Vec::new(), len: 0 }
    }

    #[inline]
    fn slot(block: usize) -> usize {
        debug_assert!(block % ALIGNMENT == 0, "block {block:#x} is not aligned");
        block / MIN_BLOCK_SIZE
    }

    #[inline]
    fn is_odd(block: usize) -> bool {
        block % MIN_BLOCK_SIZE != 0
    }

    /// Makes room for blocks at any offset below `arena_end`.
    pub fn reserve(&mut self, arena_end: usize) {
        let slots = arena_end / MIN_BLOCK_SIZE + 1;
        if slots > self.entries.len() {
            self.entries.resize(slots, Entry::EMPTY);
        }
    }

    /// Forgets every member.
    pub fn clear(&mut self) {
        self.head = Link::default();
        self.entries.clear();
        self.len = 0;
    }

    /// Bytes held by the side table.
    #[inline]
    pub fn table_bytes(&self) -> usize {
        self.entries.len() * core::mem::size_of::<Entry>()
    }

    /// The head's own linkage: `next` is the first member, `prev` the last.
    #[inline]
    pub fn head(&self) -> Link {
        self.head
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the linkage of `block` if it's a member.
    #[inline]
    pub fn link(&self, block: usize) -> Option<Link> {
        self.entries
            .get(Self::slot(block))
            .filter(|entry| !entry.is_vacant() && entry.is_odd() == Self::is_odd(block))
            .map(|entry| entry.link())
    }

    #[inline]
    pub fn contains(&self, block: usize) -> bool {
        self.link(block).is_some()
    }

    fn set_link(&mut self, block: usize, link: Link) {
        let parity = if Self::is_odd(block) { ODD } else { 0 };
        self.entries[Self::slot(block)] =
            Entry { next: encode(link.next), prev: encode(link.prev) | parity };
    }

    fn set_next(&mut self, block: usize, next: Option<usize>) {
        match self.link(block) {
            Some(link) => self.set_link(block, Link { next, ..link }),
            None => unreachable!("free list member {block:#x} has no link"),
        }
    }

    fn set_prev(&mut self, block: usize, prev: Option<usize>) {
        match self.link(block) {
            Some(link) => self.set_link(block, Link { prev, ..link }),
            None => unreachable!("free list member {block:#x} has no link"),
        }
    }

    /// Inserts `block` at the front of the list.
    ///
    /// `block` must not already be a member.
    pub fn push_front(&mut self, block: usize) {
        debug_assert!(
            Self::slot(block) < self.entries.len(),
            "block {block:#x} is beyond the reserved arena"
        );
        debug_assert!(
            self.entries[Self::slot(block)].is_vacant(),
            "block {block:#x} shares its slot with a member"
        );

        let next = self.head.next;
        self.set_link(block, Link { next, prev: None });

        match next {
            Some(next) => self.set_prev(next, Some(block)),
            None => self.head.prev = Some(block),
        }
        self.head.next = Some(block);
        self.len += 1;
    }

    /// Unlinks `block` from the list, returning whether it was a member.
    ///
    /// Removing a non-member is a no-op, which keeps the head intact
    /// should a caller ever ask to remove something twice.
    pub fn remove(&mut self, block: usize) -> bool {
        let Some(Link { next, prev }) = self.link(block) else {
            return false;
        };

        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.head.next = next,
        }
        match next {
            Some(next) => self.set_prev(next, prev),
            None => self.head.prev = prev,
        }

        self.entries[Self::slot(block)] = Entry::EMPTY;
        self.len -= 1;
        true
    }

    /// Creates an iterator over the members, exclusive of the head.
    pub fn iter(&self) -> Iter<'_> {
        Iter { list: self, current: self.head.next }
    }
}

/// An iterator over the free list members in list order, excluding the head.
///
/// This `struct` is created by [`FreeList::iter`]. See its documentation for more.
#[derive(Debug, Clone, Copy)]
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a> {
    list: &'a FreeList,
    current: Option<usize>,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.list.link(current).and_then(|link| link.next);
        Some(current)
    }
}
