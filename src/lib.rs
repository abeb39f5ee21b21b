// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! A write-only oblivious RAM (WORAM): a block-addressable storage stack
//! that, from the outside, behaves like a random-access block device of
//! fixed size and block width, but whose physical write pattern to the
//! backing medium is statistically independent of the logical access
//! sequence. Reads are not hidden — hence "write-only" — which admits
//! markedly cheaper constructions than a full ORAM.
//!
//! The stack is built from small, composable layers:
//!
//! - [`memory`] — the uniform [`Memory`] contract every layer implements,
//!   and the simplest leaf, [`LocalMem`].
//! - [`file_mem`] — [`FileMem`], a leaf backed by a pre-sized file.
//! - [`split`] — [`split::chunk_split`], partitioning one memory into two
//!   disjoint sub-memories that share a backend.
//! - [`pack`] — [`PackMem`], repacking many small logical blocks into
//!   fewer, larger backend blocks.
//! - [`crypto`] — [`crypto::CtrCrypt`] and [`crypto::RandCrypt`], the two
//!   AES wrappers the stack composes onto a backend.
//! - [`position_map`] — the [`PositionMap`] contract and its flat
//!   ([`LocalPosMap`]) and packed ([`position_map::PackPosMap`])
//!   realizations.
//! - [`woram`] — the write-only ORAM algorithms themselves
//!   ([`woram::det_woram::DetWoram`], [`woram::bmno::BmnoWoram`]), the
//!   degenerate base cases ([`woram::TrivialWoram`],
//!   [`woram::OneWriteWoram`]), the [`woram::trie_pos_map`] recursive
//!   position map, and the [`woram::recursive`] factory that assembles a
//!   full stack from a leaf memory and a logical size.
//! - [`nbd`] — the capability boundary ([`nbd::BlockDevice`]) an external
//!   network-block-device server would consume; the wire protocol itself
//!   is out of scope.
//!
//! Non-goals (spec scope, not an implementation shortcut): hiding read
//! access patterns, resisting active tampering, multi-client concurrency,
//! dynamic resizing, and durability under a crash mid-write.

#![warn(clippy::cargo, clippy::doc_markdown, missing_docs, rustdoc::all)]

pub mod bytenum;
pub mod crypto;
pub mod error;
pub mod file_mem;
pub mod memory;
pub mod nbd;
pub mod pack;
pub mod position_map;
pub mod split;
pub mod woram;

pub mod test_utils;

pub use crypto::{AesKey, CtrCrypt, RandCrypt};
pub use error::{Result, WoramError};
pub use file_mem::FileMem;
pub use memory::{Address, LocalMem, Memory};
pub use nbd::{BlockDevice, MemoryBlockDevice};
pub use pack::PackMem;
pub use position_map::{LocalPosMap, PackPosMap, PositionMap, PositionMapCommit};
pub use split::{chunk_split, OffsetMem};
pub use woram::recursive::{build_recursive_woram, SplitKind, WoramKind};
pub use woram::{CommitBackend, OneWriteWoram, PMWoram, PlainWoram, TrivialWoram};

#[cfg(test)]
mod tests {
    //! Crate-level integration tests exercising the end-to-end scenarios
    //! and universal invariants spec.md calls out, cutting across module
    //! boundaries in a way no single module's own tests do.

    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand::{Rng, RngCore};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// A `Memory` wrapper that counts every `store` into a shared counter,
    /// so a test can observe a backend's write trace without the wrapped
    /// algorithm exposing any instrumentation of its own.
    struct CountingMem<M> {
        inner: M,
        count: Rc<RefCell<usize>>,
    }

    impl<M: Memory> Memory for CountingMem<M> {
        fn blocksize(&self) -> usize {
            self.inner.blocksize()
        }
        fn size(&self) -> usize {
            self.inner.size()
        }
        fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
            self.inner.load(index, out)
        }
        fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
            *self.count.borrow_mut() += 1;
            self.inner.store(index, data)
        }
        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }
    }

    /// Scenario 4: a `PMWoram<OneWriteWoram<LocalMem>, LocalPosMap>` of
    /// logical size 10 accepts exactly 10 stores and then fails.
    #[test]
    fn onewrite_pmworam_exhausts_at_declared_capacity() {
        let backend = LocalMem::new(16, 100);
        let plain = OneWriteWoram::new(backend, 10);
        let posmap = LocalPosMap::new(10, plain.pmax());
        let mut woram = PMWoram::new(plain, posmap);

        for i in 0..10usize {
            woram.store(i, &[(i + 1) as u8; 16]).unwrap();
        }
        for i in 0..10usize {
            let mut buf = vec![0u8; 16];
            woram.load(i, &mut buf).unwrap();
            assert_eq!(buf, vec![(i + 1) as u8; 16]);
        }
        assert!(woram.store(0, &[0xAA; 16]).is_err());
    }

    /// Scenario 5: a `DetWoram` with `N=8`, `H=16` performs a total of
    /// `floor(8/16 * 8) = 4` long-term rewrites across 7 fresh stores plus
    /// one re-store of an already-written index — a count fixed by time,
    /// not by which indices or values were written.
    #[test]
    fn det_woram_long_term_rewrite_count_is_deterministic() {
        use woram::det_woram::DetWoram;

        let counter = Rc::new(RefCell::new(0usize));
        let longterm = CountingMem {
            inner: LocalMem::new(16, 8),
            count: Rc::clone(&counter),
        };
        let holding = LocalMem::new(16, 16);
        let plain = DetWoram::new(longterm, holding);
        let posmap = LocalPosMap::new(8, plain.pmax());
        let mut woram = PMWoram::new(plain, posmap);

        for i in 0..7usize {
            woram.store(i, &[(i + 1) as u8; 16]).unwrap();
        }
        woram.store(3, &[0xAAu8; 16]).unwrap();

        assert_eq!(*counter.borrow(), 4);
    }

    /// Property 7: a `PMWoram` over any `PlainWoram` (here, a fully
    /// recursive BMNO-backed stack assembled by the factory) is a correct
    /// `Memory` satisfying read-your-writes (property 1).
    #[test]
    fn recursive_bmno_stack_is_read_your_writes_correct() {
        let mut rng = StdRng::seed_from_u64(11);
        let backend = Box::new(LocalMem::new(16, 400)) as Box<dyn Memory>;
        let mut woram =
            build_recursive_woram(backend, 30, &WoramKind::Bmno(3), &SplitKind::Plain, &mut rng).unwrap();

        let mut mirror: HashMap<usize, [u8; 16]> = HashMap::new();
        let mut workload_rng = StdRng::seed_from_u64(12);
        for _ in 0..500 {
            let index = workload_rng.gen_range(0..30);
            let mut value = [0u8; 16];
            workload_rng.fill_bytes(&mut value);
            woram.store(index, &value).unwrap();
            mirror.insert(index, value);
        }
        for (index, value) in &mirror {
            let mut buf = [0u8; 16];
            woram.load(*index, &mut buf).unwrap();
            assert_eq!(&buf, value, "mismatch at index {index}");
        }
    }

    /// Property 8 (statistical): two equal-length logical write sequences
    /// over a `DetWoram`, differing in every index and value written,
    /// produce identical per-store long-term-rewrite counts — the backend
    /// write trace's shape depends only on elapsed time, never on the
    /// workload.
    #[test]
    fn det_woram_write_trace_is_independent_of_workload() {
        use woram::det_woram::DetWoram;

        fn trace_of(values: &[(usize, u8)]) -> Vec<usize> {
            let counter = Rc::new(RefCell::new(0usize));
            let longterm = CountingMem {
                inner: LocalMem::new(16, 6),
                count: Rc::clone(&counter),
            };
            let holding = LocalMem::new(16, 10);
            let plain = DetWoram::new(longterm, holding);
            let posmap = LocalPosMap::new(6, plain.pmax());
            let mut woram = PMWoram::new(plain, posmap);

            let mut trace = Vec::new();
            let mut previous = 0usize;
            for &(index, value) in values {
                woram.store(index, &[value; 16]).unwrap();
                let current = *counter.borrow();
                trace.push(current - previous);
                previous = current;
            }
            trace
        }

        let workload_a: Vec<(usize, u8)> = (0..20).map(|i| (i % 6, i as u8)).collect();
        let workload_b: Vec<(usize, u8)> = (0..20).map(|i| ((i * 5 + 1) % 6, (255 - i) as u8)).collect();

        assert_eq!(trace_of(&workload_a), trace_of(&workload_b));
    }

    /// Property 10: `load`/`store` through a trie position map correctly
    /// routes distinct logical indices to independent leaves, whether or
    /// not they were reached through a warm path/read cache.
    #[test]
    fn trie_position_map_routes_distinct_indices_independently() {
        use woram::trie_pos_map::TriePositionMap;
        use woram::OneWriteWoram;

        let k = 4;
        let size = 10;
        let pmax = 500;
        // A generous upper bound on the trie's actual internal-node count
        // (20, for k=4/size=10): the node backend only needs to be at
        // least that large, and the pointer width is driven by `pmax + 1`
        // either way, so overestimating here is harmless.
        let numnodes_upper_bound = 64;
        let ptrwidth = bytenum::bytelen((numnodes_upper_bound.max(pmax + 1)) as u64).max(1);
        let blocksize = k * ptrwidth;
        let backend = OneWriteWoram::new(LocalMem::new(blocksize, numnodes_upper_bound * 20), numnodes_upper_bound);
        let mut trie = TriePositionMap::new(backend, k, size, pmax);

        trie.store(3, 70).unwrap();
        trie.store(7, 420).unwrap();
        assert_eq!(trie.load(3).unwrap(), 70);
        assert_eq!(trie.load(7).unwrap(), 420);
        assert_eq!(trie.load(0).unwrap(), trie.nptr());
    }

    /// An end-to-end stack exercising every non-`PlainWoram`-internal
    /// layer at once: a `CtrCrypt`-wrapped split, each half packed.
    #[test]
    fn pack_over_crypt_split_over_local_mem_round_trips() {
        let backend = LocalMem::new(32, 8);
        let (a, b) = crypto::ctr_crypt_split(backend, 4, 4, AesKey::Key128([0x11; 16]));
        let mut packed_a = PackMem::new(a, 8, 16);
        let mut packed_b = PackMem::new(b, 8, 16);

        for i in 0..16usize {
            packed_a.store(i, &[i as u8; 8]).unwrap();
        }
        for i in 0..16usize {
            packed_b.store(i, &[(200 - i) as u8; 8]).unwrap();
        }

        let mut buf = vec![0u8; 8];
        packed_a.load(5, &mut buf).unwrap();
        assert_eq!(buf, vec![5u8; 8]);
        packed_b.load(5, &mut buf).unwrap();
        assert_eq!(buf, vec![195u8; 8]);
    }
}
