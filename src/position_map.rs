// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Mapping a logical index to the backend position that currently holds it.

use crate::bytenum::{bytelen, getnum, storenum};
use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};
use crate::pack::PackMem;

/// Maps `{0..size()-1}` to `[0, pmax()] ∪ {nptr()}`. Every fresh
/// `PositionMap` starts every entry at `nptr()`, meaning "no position
/// assigned yet".
pub trait PositionMap {
    /// The number of logical indices this map covers.
    fn size(&self) -> usize;

    /// The largest valid position value.
    fn pmax(&self) -> usize;

    /// The sentinel meaning "no position assigned yet", always `pmax() + 1`.
    fn nptr(&self) -> usize {
        self.pmax() + 1
    }

    /// Returns the position stored for `index`, or `nptr()`.
    fn load(&mut self, index: Address) -> Result<usize>;

    /// Records that `index` now lives at `pos`, which must be `<= pmax()`.
    fn store(&mut self, index: Address, pos: usize) -> Result<()>;

    /// Flushes any buffered state to the backing store.
    fn flush(&mut self) -> Result<()>;

    /// Exposes this position map's [`PositionMapCommit`] capability, if it
    /// has one. Most implementations (`LocalPosMap`, a `PackPosMap` over a
    /// `DetWoram`) return `None`: their backing WORAM already runs its full
    /// housekeeping inside `store`/`load`. A position map recursively backed
    /// by a `BMNORec` overrides this so that a caller — namely
    /// [`crate::woram::bmno::BmnoWoram::store`] — can drive that backing
    /// WORAM's housekeeping rhythm even on rounds where this position map's
    /// own value didn't change.
    fn as_commit(&mut self) -> Option<&mut dyn PositionMapCommit> {
        None
    }
}

/// Allows a recursive [`PositionMap`] (one backed by another WORAM's
/// write-only housekeeping) to perform that housekeeping without an
/// accompanying logical write. Implemented only by position maps whose
/// backing WORAM needs it (the BMNO recursive case); everything else is a
/// no-op.
pub trait PositionMapCommit: PositionMap {
    /// Performs one round of housekeeping writes with no corresponding
    /// logical store.
    fn commit(&mut self) -> Result<()>;
}

impl PositionMap for Box<dyn PositionMap> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn pmax(&self) -> usize {
        (**self).pmax()
    }

    fn load(&mut self, index: Address) -> Result<usize> {
        (**self).load(index)
    }

    fn store(&mut self, index: Address, pos: usize) -> Result<()> {
        (**self).store(index, pos)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// A trivial, in-RAM [`PositionMap`]: a plain array initialized to `nptr()`.
#[derive(Debug, Clone)]
pub struct LocalPosMap {
    pmax: usize,
    entries: Vec<usize>,
}

impl LocalPosMap {
    /// Creates a map of `size` entries, each allowed to hold positions in
    /// `[0, pmax]`.
    pub fn new(size: usize, pmax: usize) -> Self {
        let nptr = pmax + 1;
        Self {
            pmax,
            entries: vec![nptr; size],
        }
    }
}

impl PositionMap for LocalPosMap {
    fn size(&self) -> usize {
        self.entries.len()
    }

    fn pmax(&self) -> usize {
        self.pmax
    }

    fn load(&mut self, index: Address) -> Result<usize> {
        WoramError::check_range(index, self.size().saturating_sub(1))?;
        Ok(self.entries[index])
    }

    fn store(&mut self, index: Address, pos: usize) -> Result<()> {
        WoramError::check_range(index, self.size().saturating_sub(1))?;
        WoramError::check_range(pos, self.pmax)?;
        self.entries[index] = pos;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A [`PositionMap`] packed into a backing [`Memory`](crate::memory::Memory)
/// via a [`PackMem`]. Each position is serialized into `ceil(bitlen(nptr)/8)`
/// bytes using the host-endianness-aware encoding in [`crate::bytenum`].
pub struct PackPosMap<M> {
    pack: PackMem<M>,
    pmax: usize,
    ptrsize: usize,
}

/// The number of backend blocks a [`PackPosMap`] needs to store `size`
/// positions up to `pmax`, given a backend block width of `blocksize`.
pub fn pack_pos_map_backend_blocks(blocksize: usize, size: usize, pmax: usize) -> usize {
    let ptrsize = bytelen((pmax + 1) as u64).max(1);
    let perblock = blocksize / ptrsize;
    size.div_ceil(perblock)
}

impl<M: crate::memory::Memory> PackPosMap<M> {
    /// Wraps `backend` as a position map of `size` entries with positions
    /// in `[0, pmax]`. A fresh backend reads as all-zero, which would
    /// otherwise decode as the (valid) position `0` rather than `nptr()`, so
    /// every entry is explicitly primed to `nptr()` up front.
    pub fn new(backend: M, size: usize, pmax: usize) -> Self {
        let ptrsize = bytelen((pmax + 1) as u64).max(1);
        let mut pack = PackMem::new(backend, ptrsize, size);
        let mut nptr_buf = vec![0u8; ptrsize];
        storenum(&mut nptr_buf, (pmax + 1) as u64);
        for i in 0..size {
            pack.store(i, &nptr_buf).expect("priming a fresh PackPosMap backend cannot fail");
        }
        Self { pack, pmax, ptrsize }
    }

    /// Direct access to the wrapped backend, bypassing the pack cache. Used
    /// by [`crate::woram::recursive::RecursivePackPosMap`] to reach a
    /// [`crate::woram::CommitBackend`] backend.
    pub(crate) fn backend_mut(&mut self) -> &mut M {
        self.pack.backend_mut()
    }
}

impl<M: crate::memory::Memory> PositionMap for PackPosMap<M> {
    fn size(&self) -> usize {
        self.pack.size()
    }

    fn pmax(&self) -> usize {
        self.pmax
    }

    fn load(&mut self, index: Address) -> Result<usize> {
        let mut buf = vec![0u8; self.ptrsize];
        self.pack.load(index, &mut buf)?;
        Ok(getnum(&buf) as usize)
    }

    fn store(&mut self, index: Address, pos: usize) -> Result<()> {
        WoramError::check_range(pos, self.pmax)?;
        let mut buf = vec![0u8; self.ptrsize];
        storenum(&mut buf, pos as u64);
        self.pack.store(index, &buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.pack.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalMem;

    #[test]
    fn local_pos_map_starts_at_nptr() {
        let mut map = LocalPosMap::new(10, 99);
        for i in 0..10 {
            assert_eq!(map.load(i).unwrap(), map.nptr());
        }
    }

    #[test]
    fn local_pos_map_read_your_writes() {
        let mut map = LocalPosMap::new(4, 20);
        map.store(2, 7).unwrap();
        assert_eq!(map.load(2).unwrap(), 7);
        assert_eq!(map.load(0).unwrap(), map.nptr());
    }

    #[test]
    fn pack_pos_map_round_trips_through_backend() {
        let pmax = 1000;
        let size = 50;
        let blocksize = 64;
        let backend_blocks = pack_pos_map_backend_blocks(blocksize, size, pmax);
        let backend = LocalMem::new(blocksize, backend_blocks);
        let mut map = PackPosMap::new(backend, size, pmax);

        for i in 0..size {
            assert_eq!(map.load(i).unwrap(), map.nptr());
        }
        map.store(10, 500).unwrap();
        map.store(11, 999).unwrap();
        assert_eq!(map.load(10).unwrap(), 500);
        assert_eq!(map.load(11).unwrap(), 999);
        assert_eq!(map.load(12).unwrap(), map.nptr());
    }

    #[test]
    fn pack_pos_map_rejects_out_of_range_position() {
        let backend = LocalMem::new(64, 4);
        let mut map = PackPosMap::new(backend, 10, 50);
        assert!(map.store(0, 51).is_err());
    }
}
