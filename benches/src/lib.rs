use tagheap::{Arena, Heap, HeapConfig, Payload, VecArena, DEFAULT_ARENA_LIMIT};

pub const HEAP_SIZE: usize = DEFAULT_ARENA_LIMIT;

pub struct NamedConfig {
    pub name: &'static str,
    pub config_fn: fn() -> HeapConfig,
}

pub const NAMED_CONFIGS: &[NamedConfig] = &[
    NamedConfig { name: "Default", config_fn: HeapConfig::default },
    NamedConfig { name: "Best Fit", config_fn: best_fit },
    NamedConfig { name: "First Fit", config_fn: first_fit },
    NamedConfig { name: "Eager Split", config_fn: eager_split },
    NamedConfig { name: "Large Chunks", config_fn: large_chunks },
];

fn best_fit() -> HeapConfig {
    HeapConfig::default().with_fit_threshold(0)
}

fn first_fit() -> HeapConfig {
    HeapConfig::default().with_fit_threshold(usize::MAX)
}

fn eager_split() -> HeapConfig {
    HeapConfig::default().with_split_threshold(0)
}

fn large_chunks() -> HeapConfig {
    HeapConfig::default().with_chunk_size(1 << 16)
}

pub fn init_heap(config: HeapConfig) -> Heap<VecArena> {
    let mut heap = Heap::with_config(VecArena::with_limit(HEAP_SIZE), config);
    heap.init().expect("the initial chunk fits any benchmark arena");
    heap
}

/// Bias towards smaller values over larger ones.
///
/// Most of the generated sizes land within a few binary orders of magnitude
/// below the maximum.
pub fn generate_size(rng: &fastrand::Rng, max: usize) -> usize {
    let cap = rng.usize(16..max);
    rng.usize(4..cap)
}

/// An allocation that remembers its requested size.
#[derive(Debug, Clone, Copy)]
pub struct Allocation {
    pub ptr: Payload,
    pub size: usize,
}

impl Allocation {
    pub fn new<A: Arena>(heap: &mut Heap<A>, size: usize) -> Option<Self> {
        let ptr = heap.malloc(size)?;
        heap.payload_mut(ptr)[..size].fill(0xab);
        Some(Self { ptr, size })
    }

    /// Realloc to `new_size`, returning `false` if the heap couldn't do so without relocating
    /// into an exhausted arena.
    pub fn realloc<A: Arena>(&mut self, heap: &mut Heap<A>, new_size: usize) -> bool {
        // relocation failure is fatal, so only attempt what can succeed
        let needed = tagheap::adjusted_size(new_size)
            .map_or(usize::MAX, |size| size.max(heap.config().chunk_size()));
        let remaining = HEAP_SIZE - heap.arena().current_end();
        if needed > remaining && needed > heap.usable_size(self.ptr) {
            return false;
        }

        match heap.realloc(Some(self.ptr), new_size) {
            Some(ptr) => {
                self.ptr = ptr;
                self.size = new_size;
                true
            }
            None => false,
        }
    }

    pub fn free<A: Arena>(self, heap: &mut Heap<A>) {
        heap.free(self.ptr);
    }
}
