// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Assembling a full [`Memory`] stack from a flat backend and a logical
//! size: pick a WORAM algorithm, split the backend between its payload and
//! its position map, and recurse on the position map until the packed
//! result fits in a single backend block.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bytenum::bytelen;
use crate::crypto::{ctr_crypt_split, rand_crypt_split, AesKey, CRYPTBLOCK};
use crate::error::Result;
use crate::memory::{Address, Memory};
use crate::position_map::{pack_pos_map_backend_blocks, PackPosMap, PositionMap, PositionMapCommit};
use crate::split::chunk_split;

use super::bmno::{self, BmnoWoram};
use super::det_woram::DetWoram;
use super::{CommitBackend, OneWriteWoram, PMWoram, PlainWoram, TrivialWoram};

/// Which write-only ORAM algorithm to use for one level of the recursion.
pub enum WoramKind {
    /// A [`DetWoram`] with the given holding-area size.
    Det(usize),
    /// A [`OneWriteWoram`].
    OneWrite,
    /// A [`BmnoWoram`] with the given rewrite count `K`. Self-contained: no
    /// external position map is built for this level.
    Bmno(usize),
}

/// Whether (and how) to encrypt the split between a level's payload and its
/// position-map backing store.
pub enum SplitKind {
    /// No encryption, just address translation.
    Plain,
    /// [`crate::crypto::CtrCrypt`] on both halves.
    Ctr(AesKey),
    /// [`crate::crypto::RandCrypt`] on the first half only.
    Rand(AesKey),
}

fn apply_split(
    backend: Box<dyn Memory>,
    x: usize,
    y: usize,
    kind: &SplitKind,
    rng: &mut StdRng,
) -> (Box<dyn Memory>, Box<dyn Memory>) {
    match kind {
        SplitKind::Plain => {
            let (a, b) = chunk_split(backend, x, y);
            (Box::new(a), Box::new(b))
        }
        SplitKind::Ctr(key) => {
            let (a, b) = ctr_crypt_split(backend, x, y, key.clone());
            (Box::new(a), Box::new(b))
        }
        SplitKind::Rand(key) => {
            let sub_rng = StdRng::from_rng(&mut *rng).expect("reseeding from an StdRng cannot fail");
            let (a, b) = rand_crypt_split(backend, x, y, key.clone(), sub_rng);
            (Box::new(a), Box::new(b))
        }
    }
}

/// Builds a full [`Memory`] of logical size `size` on top of `backend`,
/// using `kind` as the WORAM algorithm and `split` to divide `backend`
/// between payload and (for `Det`/`OneWrite`) position-map storage.
pub fn build_recursive_woram(
    backend: Box<dyn Memory>,
    size: usize,
    kind: &WoramKind,
    split: &SplitKind,
    rng: &mut StdRng,
) -> Result<Box<dyn Memory>> {
    match kind {
        WoramKind::Bmno(k) => build_bmno_level(backend, size, *k, rng),
        WoramKind::Det(holding) => {
            let payload_blocks = size + holding;
            let total = backend.size();
            assert!(
                total > payload_blocks,
                "backend has only {total} blocks, need more than {payload_blocks} for a Det level"
            );
            let posmap_blocks = total - payload_blocks;
            let (payload_region, posmap_region) = apply_split(backend, payload_blocks, posmap_blocks, split, rng);
            let (longterm, holding_mem) = chunk_split(payload_region, size, *holding);
            let plain = DetWoram::new(Box::new(longterm) as Box<dyn Memory>, Box::new(holding_mem) as Box<dyn Memory>);
            let pmax = plain.pmax();
            let posmap = build_recursive_posmap(posmap_region, size, pmax, kind, split, rng)?;
            Ok(Box::new(PMWoram::new(plain, posmap)))
        }
        WoramKind::OneWrite => {
            let total = backend.size();
            assert!(total > size, "backend has only {total} blocks, need more than {size} for a OneWrite level");
            let posmap_blocks = total - size;
            let (payload_region, posmap_region) = apply_split(backend, size, posmap_blocks, split, rng);
            let plain = OneWriteWoram::new(payload_region, size);
            let pmax = plain.pmax();
            let posmap = build_recursive_posmap(posmap_region, size, pmax, kind, split, rng)?;
            Ok(Box::new(PMWoram::new(plain, posmap)))
        }
    }
}

/// Embeds a [`BmnoWoram`] directly — it owns its position map internally,
/// so unlike the other kinds there is nothing to recurse into. The metadata
/// area is allocated fresh in RAM rather than carved out of `backend`: BMNO
/// metadata records are narrower than a typical payload block, and packing
/// them into a slice of `backend` would need `backend`'s blocksize to
/// divide evenly by the metadata record width, which this factory does not
/// require of its caller.
fn build_bmno_level(backend: Box<dyn Memory>, size: usize, k: usize, rng: &mut StdRng) -> Result<Box<dyn Memory>> {
    let stashlen = bmno::default_stashlen(size);
    assert!(
        backend.size() > stashlen,
        "backend has only {} blocks, need more than {stashlen} for a BMNO stash",
        backend.size()
    );
    let indbytes = bytelen(size as u64).max(1);
    let meta_len = indbytes + CRYPTBLOCK;
    let primary_blocks = backend.size();
    let meta = crate::memory::LocalMem::new(meta_len, primary_blocks);
    let posmap = crate::position_map::LocalPosMap::new(size, primary_blocks - stashlen - 1);
    let sub_rng = StdRng::from_rng(&mut *rng).expect("reseeding from an StdRng cannot fail");
    let bmno = BmnoWoram::new_recursive(meta, backend, posmap, k, sub_rng);
    Ok(Box::new(bmno))
}

/// Builds the position map for a `Det`/`OneWrite` level: a [`PackPosMap`]
/// wrapping either a [`TrivialWoram`] base case (once the packed map fits
/// in one backend block) or another full recursive WORAM, one level down,
/// whose own logical size is the number of packed blocks needed here.
///
/// Recurses with the same algorithm `kind` as the level above rather than a
/// fixed choice: a `Det` level's position map is restored on every logical
/// store, and a [`OneWriteWoram`] sized to exactly this level's own backend
/// would exhaust its write budget almost immediately under that load. Only
/// the holding-area size (for `Det`) is rescaled to the smaller backend this
/// level actually has.
fn build_recursive_posmap(
    backend: Box<dyn Memory>,
    size: usize,
    pmax: usize,
    kind: &WoramKind,
    split: &SplitKind,
    rng: &mut StdRng,
) -> Result<Box<dyn PositionMap>> {
    let blocksize = backend.blocksize();
    let backend_blocks_needed = pack_pos_map_backend_blocks(blocksize, size, pmax);

    if backend_blocks_needed <= 1 {
        let trivial = TrivialWoram::new(backend, backend_blocks_needed.max(1));
        return Ok(Box::new(PackPosMap::new(Box::new(trivial) as Box<dyn Memory>, size, pmax)));
    }

    let inner_kind = match kind {
        WoramKind::Det(_) => WoramKind::Det((backend_blocks_needed / 2).max(1)),
        WoramKind::OneWrite => WoramKind::OneWrite,
        WoramKind::Bmno(k) => WoramKind::Bmno(*k),
    };
    let inner = build_recursive_woram(backend, backend_blocks_needed, &inner_kind, split, rng)?;
    Ok(Box::new(PackPosMap::new(inner, size, pmax)))
}

/// A [`PositionMap`] that is really a [`PackPosMap`] wrapping another
/// WORAM's own write-only housekeeping — namely a [`BmnoWoram`] serving as
/// the position map one level up the recursion. Delegates
/// [`PositionMap`] directly, and additionally exposes
/// [`PositionMapCommit`] by reaching through [`PackPosMap::backend_mut`]
/// into the wrapped [`CommitBackend`], so the WORAM above it can run this
/// map's backing WORAM's housekeeping on ticks where the mapped position
/// itself didn't change.
pub struct RecursivePackPosMap<M> {
    inner: PackPosMap<M>,
}

impl<M: Memory + CommitBackend> RecursivePackPosMap<M> {
    /// Wraps `backend` (which must also implement [`CommitBackend`]) as a
    /// position map of `size` entries with positions in `[0, pmax]`.
    pub fn new(backend: M, size: usize, pmax: usize) -> Self {
        Self {
            inner: PackPosMap::new(backend, size, pmax),
        }
    }
}

impl<M: Memory + CommitBackend> PositionMap for RecursivePackPosMap<M> {
    fn size(&self) -> usize {
        self.inner.size()
    }

    fn pmax(&self) -> usize {
        self.inner.pmax()
    }

    fn load(&mut self, index: Address) -> Result<usize> {
        self.inner.load(index)
    }

    fn store(&mut self, index: Address, pos: usize) -> Result<()> {
        self.inner.store(index, pos)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn as_commit(&mut self) -> Option<&mut dyn PositionMapCommit> {
        Some(self)
    }
}

impl<M: Memory + CommitBackend> PositionMapCommit for RecursivePackPosMap<M> {
    fn commit(&mut self) -> Result<()> {
        self.inner.backend_mut().commit()
    }
}
