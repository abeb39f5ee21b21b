// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! A simple interactive demonstration of a WORAM-backed store.

use std::io::{self, Write};

use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;

use woram::{build_recursive_woram, LocalMem, Memory, SplitKind, WoramKind};

fn read_line(prompt: &str) -> Result<String, Box<dyn std::error::Error>> {
    print!("{prompt}\n> ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_number(prompt: &str) -> Result<usize, Box<dyn std::error::Error>> {
    loop {
        let line = read_line(prompt)?;
        match line.parse::<usize>() {
            Ok(number) => return Ok(number),
            Err(_) => println!("Expected a number. Try again."),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::from_rng(OsRng)?;

    let capacity = parse_number("How many 64-byte slots would you like to store?")?;

    let backend = Box::new(LocalMem::new(64, (capacity + 1) * 20)) as Box<dyn Memory>;
    let mut woram = build_recursive_woram(backend, capacity, &WoramKind::Bmno(3), &SplitKind::Plain, &mut rng)?;

    loop {
        let action = loop {
            let action = read_line("Enter an option (R or W):\nR) Read\nW) Write")?.to_uppercase();
            if action == "R" || action == "W" {
                break action;
            }
            println!("Try again.");
        };

        let address = parse_number("What address?")?;
        if address >= capacity {
            println!("Address out of range.");
            continue;
        }

        if action == "R" {
            let mut value = vec![0u8; 64];
            woram.load(address, &mut value)?;
            println!("Value at {address} is {}.", value[0]);
        } else {
            let value = parse_number("Value to write?")?;
            woram.store(address, &[(value % 256) as u8; 64])?;
            println!("Wrote value {value} to address {address}.");
        }
    }
}
