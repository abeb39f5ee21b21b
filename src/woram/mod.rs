// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Write-only oblivious RAM: a [`Memory`] whose physical write pattern is
//! independent of the logical access sequence.
//!
//! A [`PlainWoram`] is the position-map-free core of a WORAM algorithm: it
//! knows how to load a block given its backend position, and how to store
//! a block given a [`PositionMap`] to consult (and to write back to).
//! [`PMWoram`] promotes any `PlainWoram` + `PositionMap` pair into a full
//! [`Memory`], which is the "WORAM is-a Memory" contract spec.md names.

pub mod bmno;
pub mod det_woram;
pub mod recursive;
pub mod trie_pos_map;

use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};
use crate::position_map::PositionMap;

/// Implemented by a WORAM that can perform one round of its own
/// housekeeping writes with no corresponding logical store — the same
/// shape as [`PlainWoram::dummy_write`], but for WORAMs (namely
/// [`bmno::BmnoWoram`]) that own their position map internally and so
/// implement [`Memory`] directly rather than `PlainWoram`. A
/// [`crate::position_map::PackPosMap`] wrapping such a WORAM exposes this
/// through [`crate::position_map::PositionMapCommit`] via
/// [`recursive::RecursivePackPosMap`], letting a parent WORAM's own
/// housekeeping rhythm drive it even on ticks where the mapped position
/// didn't change.
pub trait CommitBackend {
    /// Performs one round of housekeeping writes with no corresponding
    /// logical store.
    fn commit(&mut self) -> Result<()>;
}

/// The position-map-free core of a write-only ORAM algorithm. Not meant to
/// be used on its own — pair it with a [`PositionMap`] via [`PMWoram`].
pub trait PlainWoram {
    /// The width, in bytes, of every block.
    fn blocksize(&self) -> usize;

    /// The number of logical indices this WORAM covers.
    fn size(&self) -> usize;

    /// The largest valid backend position.
    fn pmax(&self) -> usize;

    /// The sentinel position meaning "never written", always `pmax() + 1`.
    fn nptr(&self) -> usize {
        self.pmax() + 1
    }

    /// Reads the block last stored at `position`. `index` is informational
    /// for algorithms that don't need it (e.g. [`OneWriteWoram`]).
    fn load(&mut self, index: Address, position: usize, out: &mut [u8]) -> Result<()>;

    /// Stores `data` logically at `index`, consulting (and possibly
    /// updating housekeeping state in) `posmap`. Returns the backend
    /// position the caller must then record in `posmap` for `index`.
    fn store(&mut self, index: Address, data: &[u8], posmap: &mut dyn PositionMap) -> Result<usize>;

    /// Performs a write with no corresponding logical store, for
    /// algorithms whose write pattern must look the same whether or not
    /// every logical write actually changes anything.
    fn dummy_write(&mut self, posmap: &mut dyn PositionMap) -> Result<()>;

    /// Flushes any buffered state to the backing store.
    fn flush(&mut self) -> Result<()>;
}

/// Promotes a [`PlainWoram`] `W` paired with a [`PositionMap`] `P` into a
/// full [`Memory`]: `load` looks up the position and delegates, `store`
/// delegates and then records the position the backend chose.
pub struct PMWoram<W, P> {
    backend: W,
    posmap: P,
}

impl<W: PlainWoram, P: PositionMap> PMWoram<W, P> {
    /// Pairs `backend` with `posmap`. `posmap`'s `pmax()` must be at least
    /// `backend`'s, so every position the backend can produce has
    /// somewhere to be recorded.
    pub fn new(backend: W, posmap: P) -> Self {
        assert!(
            posmap.pmax() >= backend.pmax(),
            "position map pmax {} is too small for backend pmax {}",
            posmap.pmax(),
            backend.pmax()
        );
        Self { backend, posmap }
    }

    /// Consumes `self`, returning the backend and position map.
    pub fn into_parts(self) -> (W, P) {
        (self.backend, self.posmap)
    }
}

impl<W: PlainWoram, P: PositionMap> Memory for PMWoram<W, P> {
    fn blocksize(&self) -> usize {
        self.backend.blocksize()
    }

    fn size(&self) -> usize {
        self.backend.size()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        let pos = self.posmap.load(index)?;
        let pos = if pos == self.posmap.nptr() {
            self.backend.nptr()
        } else {
            WoramError::check_range(pos, self.backend.pmax())?;
            pos
        };
        self.backend.load(index, pos, out)
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        let pos = self.backend.store(index, data, &mut self.posmap)?;
        WoramError::check_range(pos, self.backend.pmax())?;
        self.posmap.store(index, pos)
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()?;
        self.posmap.flush()
    }
}

/// A `PlainWoram` that appends every store to the next free backend slot
/// and never rewrites anything. `load`/`store` ignore `index`; `store`
/// ignores the position map entirely. Used as the base case of the
/// recursive WORAM factory and as BMNO's holding area.
pub struct OneWriteWoram<M> {
    backend: M,
    size: usize,
    nextpos: usize,
}

impl<M: Memory> OneWriteWoram<M> {
    /// Wraps `backend`, presenting a logical size of `size` (which need
    /// not equal `backend.size()` — the backend is the housekeeping
    /// budget, not the logical capacity).
    pub fn new(backend: M, size: usize) -> Self {
        Self {
            backend,
            size,
            nextpos: 0,
        }
    }

    /// The largest number of stores this instance can ever accept.
    pub fn maxwrites(&self) -> usize {
        self.backend.size()
    }

    /// How many stores remain before this instance is exhausted.
    pub fn remaining_writes(&self) -> usize {
        self.maxwrites() - self.nextpos
    }
}

impl<M: Memory> PlainWoram for OneWriteWoram<M> {
    fn blocksize(&self) -> usize {
        self.backend.blocksize()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn pmax(&self) -> usize {
        self.backend.size() - 1
    }

    fn nptr(&self) -> usize {
        self.backend.size()
    }

    fn load(&mut self, _index: Address, position: usize, out: &mut [u8]) -> Result<()> {
        if position == self.nptr() {
            out.iter_mut().for_each(|b| *b = 0);
            return Ok(());
        }
        self.backend.load(position, out)
    }

    fn store(&mut self, _index: Address, data: &[u8], _posmap: &mut dyn PositionMap) -> Result<usize> {
        if self.nextpos >= self.maxwrites() {
            return Err(WoramError::LengthError(
                "too many writes in OneWriteWoram".to_string(),
            ));
        }
        self.backend.store(self.nextpos, data)?;
        let pos = self.nextpos;
        self.nextpos += 1;
        Ok(pos)
    }

    fn dummy_write(&mut self, _posmap: &mut dyn PositionMap) -> Result<()> {
        if self.nextpos >= self.maxwrites() {
            return Err(WoramError::LengthError(
                "too many writes in OneWriteWoram".to_string(),
            ));
        }
        let zero = vec![0u8; self.blocksize()];
        self.backend.store(self.nextpos, &zero)?;
        self.nextpos += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }
}

/// A `Memory` that rewrites every backend position on every store — the
/// target index gets the new data, every other index gets its own data
/// written back unchanged — so the physical write pattern (always "touch
/// everything") reveals nothing about which index was logically written.
/// The simplest possible write-only ORAM, at the cost of `O(size())` work
/// per store.
pub struct TrivialWoram<M> {
    backend: M,
    size: usize,
}

impl<M: Memory> TrivialWoram<M> {
    /// Wraps `backend`, presenting a logical size of `size`, which must be
    /// at most `backend.size()`.
    pub fn new(backend: M, size: usize) -> Self {
        assert!(
            backend.size() >= size,
            "TrivialWoram backend needs at least {size} blocks, has {}",
            backend.size()
        );
        Self { backend, size }
    }
}

impl<M: Memory> Memory for TrivialWoram<M> {
    fn blocksize(&self) -> usize {
        self.backend.blocksize()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        self.backend.load(index, out)
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        let mut temp = vec![0u8; self.blocksize()];
        for curpos in 0..self.size {
            if curpos == index {
                self.backend.store(curpos, data)?;
            } else {
                self.backend.load(curpos, &mut temp)?;
                self.backend.store(curpos, &temp)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.backend.flush()
    }

    fn good(&self) -> bool {
        self.backend.good()
    }
}
