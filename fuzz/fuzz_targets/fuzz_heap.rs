#![no_main]

use tagheap::*;

use libfuzzer_sys::fuzz_target;

use libfuzzer_sys::arbitrary::Arbitrary;

#[derive(Arbitrary, Debug)]
enum Actions {
    /// Allocate memory with the given size
    Alloc { size: u16 },
    /// Free the ith allocation
    Free { index: u8 },
    /// Realloc the ith allocation
    Realloc { index: u8, new_size: u16 },
    /// Free the ith allocation through realloc
    ReallocZero { index: u8 },
}
use Actions::*;

#[derive(Arbitrary, Debug)]
struct Policy {
    chunk_size: u16,
    split_threshold: u16,
    fit_threshold: u16,
}

fuzz_target!(|data: (u32, Policy, Vec<Actions>)| {
    let (arena_limit, policy, actions) = data;

    let config = HeapConfig::default()
        .with_chunk_size(policy.chunk_size as usize)
        .with_split_threshold(policy.split_threshold as usize)
        .with_fit_threshold(policy.fit_threshold as usize);

    let limit = arena_limit as usize % (1 << 24);
    let mut heap = Heap::with_config(VecArena::with_limit(limit), config);
    if heap.init().is_err() {
        assert!(!heap.is_initialized());
        return;
    }

    let mut allocations: Vec<(Payload, usize, u8)> = vec![];

    for (step, action) in actions.into_iter().enumerate() {
        let fill = step as u8;

        match action {
            Alloc { size } => {
                let size = size as usize;

                if let Some(ptr) = heap.malloc(size) {
                    assert!(size != 0);
                    assert_eq!(ptr.offset() % ALIGNMENT, 0);
                    assert!(heap.usable_size(ptr) >= size);

                    heap.payload_mut(ptr)[..size].fill(fill);
                    allocations.push((ptr, size, fill));
                }
            }
            Free { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, size, fill) = allocations.swap_remove(index as usize);
                assert!(heap.payload(ptr)[..size].iter().all(|&b| b == fill));
                heap.free(ptr);
            }
            Realloc { index, new_size } => {
                if index as usize >= allocations.len() { continue; }
                if new_size == 0 { continue; }

                let (ptr, size, old_fill) = allocations[index as usize];
                let new_size = new_size as usize;

                // moving into an exhausted arena is fatal, only try what can't hit that
                let needed = adjusted_size(new_size).unwrap().max(heap.config().chunk_size());
                if new_size > heap.usable_size(ptr) && needed > limit - heap.arena().current_end() {
                    continue;
                }

                let ptr = heap.realloc(Some(ptr), new_size).unwrap();
                let kept = size.min(new_size);
                assert!(heap.payload(ptr)[..kept].iter().all(|&b| b == old_fill));

                heap.payload_mut(ptr)[..new_size].fill(fill);
                allocations[index as usize] = (ptr, new_size, fill);
            }
            ReallocZero { index } => {
                if index as usize >= allocations.len() { continue; }

                let (ptr, ..) = allocations.swap_remove(index as usize);
                assert_eq!(heap.realloc(Some(ptr), 0), None);
            }
        }

        let report = heap.check_heap(false);
        assert!(report.is_ok(), "{:?}", report.violations);

        let counters = heap.counters();
        assert_eq!(counters.allocation_count, allocations.len());
        assert_eq!(counters.claimed_bytes, heap.arena().current_end());
        assert!(counters.free_list_bytes <= counters.claimed_bytes / 2 + 8);
    }

    for (ptr, ..) in allocations {
        heap.free(ptr);
    }

    assert_eq!(heap.free_list().count(), 1);
    assert!(heap.check_heap(false).is_ok());
});
