// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! An example of loading an indexed database into a WORAM stack and then
//! updating it such that the physical write pattern does not reveal which
//! logical index changed.

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

use woram::{build_recursive_woram, LocalMem, Memory, SplitKind, WoramKind};

const BLOCK_SIZE: usize = 64;
const DB_SIZE: usize = 64;
// A stand-in for the indexed database you want to obliviously serve writes to.
const DATABASE: [[u8; BLOCK_SIZE]; DB_SIZE] = [[0; BLOCK_SIZE]; DB_SIZE];

fn main() -> woram::Result<()> {
    let mut rng = StdRng::from_rng(OsRng).expect("the OS RNG is available");

    let backend = Box::new(LocalMem::new(BLOCK_SIZE, DB_SIZE * 20)) as Box<dyn Memory>;
    let mut woram = build_recursive_woram(backend, DB_SIZE, &WoramKind::Bmno(3), &SplitKind::Plain, &mut rng)?;

    // Load DATABASE into woram.
    for (i, bytes) in DATABASE.iter().enumerate() {
        woram.store(i, bytes)?;
    }

    // Further writes to woram no longer reveal, to an observer of the
    // physical medium, which logical index was updated.
    let num_operations = 100;
    for _ in 0..num_operations {
        let random_index = rng.gen_range(0..DB_SIZE);
        let mut value = [0u8; BLOCK_SIZE];
        rng.fill(&mut value[..]);
        woram.store(random_index, &value)?;
    }

    Ok(())
}
