// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Repacking many small logical blocks into fewer, larger backend blocks.

use crate::error::Result;
use crate::memory::{Address, Memory};

/// Packs `floor(backend.blocksize() / blocksize)` logical blocks of
/// `blocksize` bytes into each backend block. Maintains exactly one
/// read-cache and one write-cache backend block, so that a run of stores
/// to the same outer block costs one backend write no matter how many
/// inner slots are touched.
pub struct PackMem<M> {
    backend: M,
    blocksize: usize,
    size: usize,
    perblock: usize,
    read_cache: Vec<u8>,
    read_index: Option<Address>,
    write_cache: Vec<u8>,
    write_index: Option<Address>,
    write_dirty: bool,
}

impl<M: Memory> PackMem<M> {
    /// Packs `size` logical blocks of `blocksize` bytes onto `backend`.
    /// `blocksize` must divide evenly into (or equal) `backend.blocksize()`.
    pub fn new(backend: M, blocksize: usize, size: usize) -> Self {
        let outer = backend.blocksize();
        assert!(
            blocksize > 0 && outer % blocksize == 0,
            "pack blocksize {blocksize} must evenly divide the backend blocksize {outer}"
        );
        let perblock = outer / blocksize;
        let backblocks = size.div_ceil(perblock);
        assert!(
            backend.size() >= backblocks,
            "backend has only {} blocks, need {backblocks} to fit {size} packed blocks",
            backend.size()
        );
        Self {
            backend,
            blocksize,
            size,
            perblock,
            read_cache: vec![0u8; outer],
            read_index: None,
            write_cache: vec![0u8; outer],
            write_index: None,
            write_dirty: false,
        }
    }

    /// Direct access to the wrapped backend, bypassing the pack caches.
    /// Used by [`crate::woram::recursive::RecursivePackPosMap`] to reach a
    /// [`crate::woram::CommitBackend`] nested two layers down (`PackPosMap`
    /// -> `PackMem` -> the recursive WORAM itself).
    pub(crate) fn backend_mut(&mut self) -> &mut M {
        &mut self.backend
    }

    fn slot(&self, index: Address) -> (Address, usize, usize) {
        let outer = index / self.perblock;
        let start = (index % self.perblock) * self.blocksize;
        (outer, start, start + self.blocksize)
    }
}

impl<M: Memory> Memory for PackMem<M> {
    fn blocksize(&self) -> usize {
        self.blocksize
    }

    fn size(&self) -> usize {
        self.size
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        let (outer, start, end) = self.slot(index);

        if self.write_index == Some(outer) {
            out.copy_from_slice(&self.write_cache[start..end]);
            return Ok(());
        }

        if self.read_index != Some(outer) {
            self.backend.load(outer, &mut self.read_cache)?;
            self.read_index = Some(outer);
        }
        out.copy_from_slice(&self.read_cache[start..end]);
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        let (outer, start, end) = self.slot(index);

        if self.write_index != Some(outer) {
            if self.write_dirty {
                self.backend
                    .store(self.write_index.expect("write_dirty implies a write index"), &self.write_cache)?;
                self.write_dirty = false;
            }
            if self.read_index == Some(outer) {
                self.write_cache.copy_from_slice(&self.read_cache);
                self.read_index = None;
            } else {
                self.backend.load(outer, &mut self.write_cache)?;
            }
            self.write_index = Some(outer);
        }
        self.write_cache[start..end].copy_from_slice(data);
        self.write_dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.write_dirty {
            self.backend
                .store(self.write_index.expect("write_dirty implies a write index"), &self.write_cache)?;
            self.write_dirty = false;
        }
        self.backend.flush()
    }

    fn good(&self) -> bool {
        self.backend.good()
    }
}
