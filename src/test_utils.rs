// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Shared test and benchmark harness utilities.

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// Initializes a terminal logger at `Debug` level, once per process. Safe
/// to call from every test that wants to see `log::debug!`/`log::trace!`
/// output on failure; later calls are no-ops.
pub fn init_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = simplelog::TermLogger::init(
            simplelog::LevelFilter::Debug,
            simplelog::Config::default(),
            simplelog::TerminalMode::Mixed,
            simplelog::ColorChoice::Auto,
        );
    });
}

/// A `HashMap`-backed mirror of a logical index space, used as the
/// correctness oracle in random-workload tests: after every store, a read
/// of any index should match what this mirror last recorded for it, or a
/// caller-supplied default if nothing was ever stored there.
#[derive(Debug, Default)]
pub struct MirrorMap<V> {
    entries: std::collections::HashMap<usize, V>,
}

impl<V: Clone> MirrorMap<V> {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self {
            entries: std::collections::HashMap::new(),
        }
    }

    /// Records that `index` now holds `value`.
    pub fn put(&mut self, index: usize, value: V) {
        self.entries.insert(index, value);
    }

    /// Returns what is recorded for `index`, or `default` if nothing was
    /// ever stored there.
    pub fn get(&self, index: usize, default: V) -> V {
        self.entries.get(&index).cloned().unwrap_or(default)
    }
}
