use std::{
    fmt::Write,
    path::PathBuf,
    sync::{Arc, Barrier},
    time::{Duration, Instant},
};

use benches::{generate_size, init_heap, Allocation, NamedConfig, NAMED_CONFIGS};
use tagheap::{HeapLock, VecArena};

type SharedHeap = HeapLock<spin::Mutex<()>, VecArena>;

const TRIALS_AMOUNT: usize = 7;
const WARMUP: Duration = Duration::from_millis(2);
const DURATION: Duration = Duration::from_millis(200);
const RA_MAX_ALLOC_SIZES: &[usize] = &[1000, 3000, 10000, 30000];
const RA_MAX_REALLOC_SIZE_MULTI: usize = 3;
const RA_TARGET_MIN_ALLOCATIONS: usize = 300;

fn main() {
    let mut realloc = true;
    let mut thread_count = 1;
    let mut output_name = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-realloc" => realloc = false,
            "--thread-count" => {
                thread_count = args
                    .next()
                    .and_then(|arg| arg.parse::<usize>().ok())
                    .expect("expected number after --thread-count")
            }
            "--name" => output_name = Some(args.next().expect("expected string after --name")),
            "--help" => {
                println!(
                    r#"Random actions benchmark

Usage: cargo run --bin random_actions --release -- [OPTIONS]

Options:
  --name            The name of the output file [required].
  --no-realloc      Disables reallocation operations in the benchmark.
  --thread-count    Sets the number of threads sharing the heap. [default = 1]."#
                );
                return;
            }
            argument => panic!("unrecognized argument '{}'", argument),
        }
    }

    let Some(output_name) = output_name else {
        panic!("--name is required");
    };

    let cargo_manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let benchmark_results_dir = cargo_manifest_dir.join("../results");
    std::fs::create_dir_all(&benchmark_results_dir).unwrap();

    let mut csv = String::new();

    let sizes = RA_MAX_ALLOC_SIZES.iter().map(|i| i.to_string()).collect::<Vec<_>>();
    writeln!(csv, ",{}", sizes.join(",")).unwrap();

    for &NamedConfig { name, config_fn } in NAMED_CONFIGS {
        write!(csv, "{}", name).unwrap();

        for &max_alloc_size in RA_MAX_ALLOC_SIZES.iter() {
            eprintln!("benchmarking {} - max alloc size {}B ...", name, max_alloc_size);

            let score = (0..TRIALS_AMOUNT)
                .map(|_| {
                    let heap: SharedHeap = init_heap(config_fn()).lock();

                    let score = std::thread::scope(|scope| {
                        let barrier = Arc::new(Barrier::new(thread_count));
                        let mut handles = vec![];

                        for _ in 0..thread_count {
                            let barrier = barrier.clone();
                            let heap = &heap;
                            handles.push(scope.spawn(move || {
                                let run_immediately = Arc::new(Barrier::new(1));
                                random_actions(heap, max_alloc_size, run_immediately, WARMUP, realloc);
                                random_actions(heap, max_alloc_size, barrier, DURATION, realloc)
                            }));
                        }

                        handles.into_iter().map(|h| h.join().unwrap()).sum::<usize>()
                    });

                    assert!(heap.lock().check_heap(false).is_ok());
                    score
                })
                .sum::<usize>()
                / TRIALS_AMOUNT;

            write!(csv, ",{}", score).unwrap();
        }

        writeln!(csv).unwrap();
    }
    // remove the last newline.
    csv.pop();

    let csv_file_path = benchmark_results_dir.join(format!("{}.csv", output_name));
    std::fs::write(csv_file_path, csv).unwrap();
}

pub fn random_actions(
    heap: &SharedHeap,
    max_alloc_size: usize,
    barrier: Arc<Barrier>,
    duration: Duration,
    realloc: bool,
) -> usize {
    let mut score = 0;
    let mut v: Vec<Allocation> = Vec::with_capacity(100000);
    let rng = fastrand::Rng::new();

    let mut allocation_failure_count = 0usize;
    let mut reallocation_failure_count = 0usize;

    barrier.wait();
    let start = Instant::now();
    while start.elapsed() < duration {
        for _ in 0..100 {
            let action = rng.usize(0..=(5 + realloc as usize));

            // 1/7 - reallocate
            // 3/7 - if there are enough allocations, deallocate
            // 3/7 - if enough allocations else 6/7, allocate

            // this avoids staying close to zero allocations
            // while also avoiding growing the heap unboundedly

            if action == 6 {
                if !v.is_empty() {
                    let index = rng.usize(0..v.len());
                    let new_size = rng.usize(1..(max_alloc_size * RA_MAX_REALLOC_SIZE_MULTI));
                    if v[index].realloc(&mut *heap.lock(), new_size) {
                        score += 1;
                    } else {
                        reallocation_failure_count += 1;
                    }
                }
            } else if action < 3 || v.len() < RA_TARGET_MIN_ALLOCATIONS {
                let size = generate_size(&rng, max_alloc_size);
                if let Some(allocation) = Allocation::new(&mut *heap.lock(), size) {
                    v.push(allocation);
                    score += 1;
                } else {
                    allocation_failure_count += 1;
                }
            } else {
                let index = rng.usize(0..v.len());
                v.swap_remove(index).free(&mut *heap.lock());
                score += 1;
            }
        }
    }

    for allocation in v {
        allocation.free(&mut *heap.lock());
    }

    if allocation_failure_count != 0 {
        eprintln!("Allocation failure count: {}", allocation_failure_count);
    }
    if reallocation_failure_count != 0 {
        eprintln!("Reallocation failure count: {}", reallocation_failure_count);
    }

    score
}
