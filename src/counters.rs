//! Track allocation counters for a [`Heap`].

use crate::{Arena, Heap, OVERHEAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Counters {
    /// Number of active allocations.
    pub allocation_count: usize,
    /// Total number of allocations.
    pub total_allocation_count: u64,

    /// Sum of active allocations' usable sizes.
    pub allocated_bytes: usize,
    /// Sum of all allocations' maximum usable sizes.
    ///
    /// In-place reallocations' unchanged bytes are not recounted.
    pub total_allocated_bytes: u64,

    /// Number of payload bytes available in free blocks.
    pub available_bytes: usize,
    /// Number of free blocks.
    pub fragment_count: usize,

    /// Current size of the arena.
    pub claimed_bytes: usize,
    /// Number of times the arena was extended, including initialization.
    pub total_extend_count: u64,

    /// Bytes of free list bookkeeping held beside the arena.
    pub free_list_bytes: usize,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            total_allocation_count: 0,
            allocated_bytes: 0,
            total_allocated_bytes: 0,
            available_bytes: 0,
            fragment_count: 0,
            claimed_bytes: 0,
            total_extend_count: 0,
            free_list_bytes: 0,
        }
    }

    /// Returns the number of bytes unavailable due to boundary tags, sentinels and padding.
    pub const fn overhead_bytes(&self) -> usize {
        self.claimed_bytes - self.available_bytes - self.allocated_bytes
    }

    /// Returns the total number of allocated bytes freed.
    pub const fn total_freed_bytes(&self) -> u64 {
        self.total_allocated_bytes - self.allocated_bytes as u64
    }

    /// Returns the fraction of the arena holding allocated payload, between 0 and 1.
    pub fn utilization(&self) -> f64 {
        if self.claimed_bytes == 0 {
            0.0
        } else {
            self.allocated_bytes as f64 / self.claimed_bytes as f64
        }
    }

    pub(crate) fn account_alloc(&mut self, alloc_size: usize) {
        self.allocation_count += 1;
        self.allocated_bytes += alloc_size;

        self.total_allocation_count += 1;
        self.total_allocated_bytes += alloc_size as u64;
    }

    pub(crate) fn account_dealloc(&mut self, alloc_size: usize) {
        self.allocation_count -= 1;
        self.allocated_bytes -= alloc_size;
    }

    pub(crate) fn account_grow_in_place(&mut self, old_alloc_size: usize, new_alloc_size: usize) {
        self.allocated_bytes += new_alloc_size - old_alloc_size;
        self.total_allocated_bytes += (new_alloc_size - old_alloc_size) as u64;
    }

    pub(crate) fn account_extend(&mut self, extend_size: usize) {
        self.claimed_bytes += extend_size;
        self.total_extend_count += 1;
    }
}

impl<A: Arena> Heap<A> {
    /// Returns the heap's counters.
    ///
    /// `available_bytes` and `fragment_count` are computed by walking the free list.
    pub fn counters(&self) -> Counters {
        let mut counters = self.counters;
        counters.free_list_bytes = self.free_list.table_bytes();

        for bp in self.free_list.iter() {
            counters.available_bytes += self.block_size(bp) - OVERHEAD;
            counters.fragment_count += 1;
        }

        counters
    }
}
