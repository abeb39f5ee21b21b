// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! A very simple demonstration of the use of a WORAM.

use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;

use woram::{build_recursive_woram, LocalMem, Memory, SplitKind, WoramKind};

fn main() -> woram::Result<()> {
    let mut rng = StdRng::from_rng(OsRng).expect("the OS RNG is available");

    let backend = Box::new(LocalMem::new(64, 1300)) as Box<dyn Memory>;
    let mut woram = build_recursive_woram(backend, 64, &WoramKind::Bmno(3), &SplitKind::Plain, &mut rng)?;

    woram.store(0, &[1u8; 64])?;
    let mut value = vec![0u8; 64];
    woram.load(0, &mut value)?;
    println!("{}", value[0]);
    Ok(())
}
