use std::{fmt::Write, path::PathBuf};

use benches::{generate_size, init_heap, Allocation, NAMED_CONFIGS};

const HE_MAX_ALLOC_SIZE: usize = 10000;
const HE_MAX_REALLOC_SIZE_MULTI: usize = 10;
const HE_ROUNDS: usize = 50;

fn main() {
    let cargo_manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let benchmark_results_dir = cargo_manifest_dir.join("../results");
    std::fs::create_dir_all(&benchmark_results_dir).unwrap();

    let mut csv = String::new();

    for named_config in NAMED_CONFIGS.iter() {
        write!(csv, "{},", named_config.name).unwrap();
    }

    csv.pop(); // remove trailing comma
    writeln!(csv).unwrap();

    for named_config in NAMED_CONFIGS.iter() {
        eprintln!("Benchmarking {}...", named_config.name);

        let efficiency = heap_efficiency((named_config.config_fn)());

        write!(csv, "{},", efficiency).unwrap();
    }
    csv.pop(); // remove trailing comma

    let csv_file_path = benchmark_results_dir.join("heap-efficiency.csv");
    std::fs::write(csv_file_path, csv).unwrap();
}

/// Fill the arena with random actions until it's exhausted,
/// returning the share of the arena holding live payload bytes as a percentage.
pub fn heap_efficiency(config: tagheap::HeapConfig) -> f64 {
    let rng = fastrand::Rng::with_seed(0x7a9);
    let mut used = 0;
    let mut total = 0;

    for _ in 0..HE_ROUNDS {
        let mut heap = init_heap(config);
        let mut v: Vec<Allocation> = Vec::with_capacity(100000);

        loop {
            match rng.usize(0..=9) {
                0..=4 => {
                    let size = generate_size(&rng, HE_MAX_ALLOC_SIZE);

                    if let Some(allocation) = Allocation::new(&mut heap, size) {
                        v.push(allocation);
                    } else {
                        break;
                    }
                }
                5 => {
                    if !v.is_empty() {
                        let index = rng.usize(0..v.len());
                        v.swap_remove(index).free(&mut heap);
                    }
                }
                6..=9 => {
                    if !v.is_empty() {
                        let index = rng.usize(0..v.len());
                        let new_size =
                            rng.usize(1..(HE_MAX_ALLOC_SIZE * HE_MAX_REALLOC_SIZE_MULTI));

                        if !v[index].realloc(&mut heap, new_size) {
                            break;
                        }
                    }
                }
                _ => unreachable!(),
            }
        }

        debug_assert!(heap.check_heap(false).is_ok());

        used += v.iter().map(|a| a.size).sum::<usize>();
        total += heap.counters().claimed_bytes;
    }

    used as f64 / total as f64 * 100.0
}
