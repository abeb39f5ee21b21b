// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Benchmarks for the WORAM crate.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Display;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};

use woram::{build_recursive_woram, Address, LocalMem, Memory, Result, SplitKind, WoramKind};

const CAPACITIES_TO_BENCHMARK: [usize; 2] = [64, 256];
const BLOCK_SIZE: usize = 64;
const NUM_RANDOM_OPERATIONS_TO_RUN: usize = 64;

/// Wraps the root leaf, counting every physical `load`/`store` the whole
/// recursive stack above it actually issues.
struct CountingMem {
    inner: LocalMem,
    reads: Rc<RefCell<u128>>,
    writes: Rc<RefCell<u128>>,
}

impl Memory for CountingMem {
    fn blocksize(&self) -> usize {
        self.inner.blocksize()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        *self.reads.borrow_mut() += 1;
        self.inner.load(index, out)
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        *self.writes.borrow_mut() += 1;
        self.inner.store(index, data)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }
}

/// One WORAM configuration to run every benchmark against, named for the
/// printed tables.
struct Scenario {
    name: &'static str,
    kind: fn(usize) -> WoramKind,
}

const SCENARIOS: [Scenario; 3] = [
    Scenario { name: "OneWrite", kind: |_| WoramKind::OneWrite },
    Scenario { name: "Det", kind: |capacity| WoramKind::Det((capacity / 2).max(1)) },
    Scenario { name: "Bmno", kind: |_| WoramKind::Bmno(3) },
];

fn build_stack(scenario: &Scenario, capacity: usize) -> (Box<dyn Memory>, Rc<RefCell<u128>>, Rc<RefCell<u128>>) {
    let reads = Rc::new(RefCell::new(0u128));
    let writes = Rc::new(RefCell::new(0u128));
    let backend_blocks = capacity * 30 + 200;
    let backend = Box::new(CountingMem {
        inner: LocalMem::new(BLOCK_SIZE, backend_blocks),
        reads: Rc::clone(&reads),
        writes: Rc::clone(&writes),
    }) as Box<dyn Memory>;

    let mut rng = StdRng::seed_from_u64(0);
    let kind = (scenario.kind)(capacity);
    let woram = build_recursive_woram(backend, capacity, &kind, &SplitKind::Plain, &mut rng)
        .expect("benchmark stack should build");
    (woram, reads, writes)
}

criterion_group!(
    benches,
    benchmark_initialization,
    benchmark_load,
    benchmark_store,
    benchmark_random_operations,
    print_load_header,
    count_accesses_on_load,
    print_store_header,
    count_accesses_on_store,
    print_random_operations_header,
    count_accesses_on_random_workload,
);
criterion_main!(benches);

fn benchmark_initialization(c: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        let mut group = c.benchmark_group(format!("{}_initialization", scenario.name));
        for capacity in CAPACITIES_TO_BENCHMARK.iter() {
            group.bench_with_input(
                BenchmarkId::from_parameter(Parameters { capacity: *capacity, block_size: BLOCK_SIZE }),
                capacity,
                |b, capacity| b.iter(|| build_stack(scenario, *capacity)),
            );
        }
    }
}

fn benchmark_load(c: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        let mut group = c.benchmark_group(format!("{}_load", scenario.name));
        for capacity in CAPACITIES_TO_BENCHMARK.iter() {
            let (mut woram, _, _) = build_stack(scenario, *capacity);
            woram.store(0, &[1u8; BLOCK_SIZE]).unwrap();
            let mut buf = vec![0u8; BLOCK_SIZE];
            group.bench_function(
                BenchmarkId::from_parameter(Parameters { capacity: *capacity, block_size: BLOCK_SIZE }),
                |b| b.iter(|| woram.load(black_box(0), &mut buf)),
            );
        }
    }
}

fn benchmark_store(c: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        let mut group = c.benchmark_group(format!("{}_store", scenario.name));
        for capacity in CAPACITIES_TO_BENCHMARK.iter() {
            let (mut woram, _, _) = build_stack(scenario, *capacity);
            group.bench_function(
                BenchmarkId::from_parameter(Parameters { capacity: *capacity, block_size: BLOCK_SIZE }),
                |b| b.iter(|| woram.store(black_box(0), black_box(&[2u8; BLOCK_SIZE]))),
            );
        }
    }
}

fn benchmark_random_operations(c: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        let mut group = c.benchmark_group(format!("{}_random_operations", scenario.name));
        for capacity in CAPACITIES_TO_BENCHMARK {
            let (mut woram, _, _) = build_stack(scenario, capacity);

            let indices = random_indices(capacity, NUM_RANDOM_OPERATIONS_TO_RUN);
            let loads = random_bools(NUM_RANDOM_OPERATIONS_TO_RUN);
            let values = random_values(capacity);

            let parameters = RandomOperationsParameters {
                capacity,
                block_size: BLOCK_SIZE,
                number_of_operations_to_run: NUM_RANDOM_OPERATIONS_TO_RUN,
            };
            group.bench_with_input(BenchmarkId::from_parameter(parameters), &parameters, |b, _| {
                b.iter(|| run_many_random_accesses(&mut woram, &indices, &loads, &values))
            });
        }
        group.finish();
    }
}

fn run_many_random_accesses(woram: &mut Box<dyn Memory>, indices: &[usize], loads: &[bool], values: &[u8]) {
    let mut buf = vec![0u8; BLOCK_SIZE];
    for (i, &index) in indices.iter().enumerate() {
        if loads[i] {
            woram.load(black_box(index), &mut buf).unwrap();
        } else {
            let start = index * BLOCK_SIZE;
            woram.store(black_box(index), black_box(&values[start..start + BLOCK_SIZE])).unwrap();
        }
    }
}

fn random_indices(capacity: usize, count: usize) -> Vec<usize> {
    let mut rng = thread_rng();
    (0..count).map(|_| rng.gen_range(0..capacity)).collect()
}

fn random_bools(count: usize) -> Vec<bool> {
    let mut values = vec![false; count];
    thread_rng().fill(&mut values[..]);
    values
}

fn random_values(capacity: usize) -> Vec<u8> {
    let mut values = vec![0u8; BLOCK_SIZE * capacity];
    thread_rng().fill(&mut values[..]);
    values
}

fn count_accesses_on_load(_: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        for capacity in CAPACITIES_TO_BENCHMARK {
            let (mut woram, reads, writes) = build_stack(scenario, capacity);
            woram.store(0, &[1u8; BLOCK_SIZE]).unwrap();
            *reads.borrow_mut() = 0;
            *writes.borrow_mut() = 0;

            let mut buf = vec![0u8; BLOCK_SIZE];
            woram.load(black_box(0), &mut buf).unwrap();

            print_table_row(scenario.name, capacity, *reads.borrow(), *writes.borrow());
        }
    }
}

fn count_accesses_on_store(_: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        for capacity in CAPACITIES_TO_BENCHMARK {
            let (mut woram, reads, writes) = build_stack(scenario, capacity);
            *reads.borrow_mut() = 0;
            *writes.borrow_mut() = 0;

            woram.store(black_box(0), black_box(&[2u8; BLOCK_SIZE])).unwrap();

            print_table_row(scenario.name, capacity, *reads.borrow(), *writes.borrow());
        }
    }
}

fn count_accesses_on_random_workload(_: &mut Criterion) {
    for scenario in SCENARIOS.iter() {
        for capacity in CAPACITIES_TO_BENCHMARK {
            let (mut woram, reads, writes) = build_stack(scenario, capacity);
            *reads.borrow_mut() = 0;
            *writes.borrow_mut() = 0;

            let indices = random_indices(capacity, NUM_RANDOM_OPERATIONS_TO_RUN);
            let loads = random_bools(NUM_RANDOM_OPERATIONS_TO_RUN);
            let values = random_values(capacity);
            run_many_random_accesses(&mut woram, &indices, &loads, &values);

            print_table_row(scenario.name, capacity, *reads.borrow(), *writes.borrow());
        }
    }
}

#[derive(Clone, Copy)]
struct Parameters {
    capacity: usize,
    block_size: usize,
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(Capacity: {} Blocksize: {})", self.capacity, self.block_size)
    }
}

#[derive(Clone, Copy)]
struct RandomOperationsParameters {
    capacity: usize,
    block_size: usize,
    number_of_operations_to_run: usize,
}

impl fmt::Display for RandomOperationsParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(Capacity: {} Blocksize: {}, Ops: {})",
            self.capacity, self.block_size, self.number_of_operations_to_run,
        )
    }
}

fn print_table_row<A: Display, B: Display, C: Display, D: Display>(s1: A, s2: B, s3: C, s4: D) {
    println!("{0: <15} | {1: <15} | {2: <15} | {3: <15}", s1, s2, s3, s4)
}

fn print_table_header() {
    print_table_row("Scenario", "Capacity", "Physical Reads", "Physical Writes");
}

fn print_load_header(_: &mut Criterion) {
    println!("Physical reads and writes incurred by 1 WORAM load:");
    print_table_header();
}

fn print_store_header(_: &mut Criterion) {
    println!();
    println!("Physical reads and writes incurred by 1 WORAM store:");
    print_table_header();
}

fn print_random_operations_header(_: &mut Criterion) {
    println!();
    println!(
        "Physical reads and writes incurred by {} random WORAM operations:",
        NUM_RANDOM_OPERATIONS_TO_RUN
    );
    print_table_header();
}
