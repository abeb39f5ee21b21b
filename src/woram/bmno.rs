// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! The BMNO write-only ORAM: every logical store rewrites `k` independent,
//! uniformly random primary-area slots (evicting one stash entry into
//! whichever of them looks unoccupied, and otherwise just re-randomizing
//! the slot's ciphertext), so the physical write trace is `k` positions
//! drawn from the same distribution no matter which index or value was
//! written. Unlike [`super::det_woram::DetWoram`], BMNO owns its own
//! [`PositionMap`] internally rather than having one threaded in by a
//! [`super::PMWoram`] — the routing decision ("where does a stashed entry
//! finally land?") is made inside `store`, so there is no useful position
//! for an external caller to record.

use rand::{CryptoRng, Rng, RngCore};

use crate::bytenum::{bitlen, bytelen, getnum, storenum};
use crate::crypto::{AesKey, CbcCodec, CRYPTBLOCK};
use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};
use crate::position_map::PositionMap;

use super::CommitBackend;

/// `60 + ceil(log2(size))`, the stash capacity spec.md §3 prescribes for a
/// BMNO covering `size` logical indices.
pub fn default_stashlen(size: usize) -> usize {
    let log2 = if size <= 1 { 0 } else { bitlen((size - 1) as u64) as usize };
    60 + log2
}

/// A write-only ORAM backed by a `primary` area of encrypted blocks, a
/// parallel `meta` area recording which logical index (if any) occupies
/// each primary slot and under which IV, and a bounded in-memory `stash` of
/// entries not yet placed in `primary`.
///
/// `Meta` and `Primary` are both raw [`Memory`] backends; `meta`'s
/// blocksize must be exactly `indexbytes + 16` (an index field sized to
/// `size`, plus a 16-byte IV), and `meta.size()` must equal `primary.size()`
/// (one record per primary slot, including the slots reserved for the
/// final stash dump in [`Memory::flush`]).
pub struct BmnoWoram<Meta, Primary, P, R> {
    meta: Meta,
    primary: Primary,
    posmap: P,
    cipher: Option<CbcCodec>,
    rng: R,
    stash: Vec<(usize, Vec<u8>)>,
    stashlen: usize,
    size: usize,
    pmax: usize,
    k: usize,
    indbytes: usize,
    meta_len: usize,
}

impl<Meta: Memory, Primary: Memory, P: PositionMap, R: RngCore + CryptoRng> BmnoWoram<Meta, Primary, P, R> {
    /// Builds a standalone BMNO that encrypts its own primary area under
    /// `key`. `posmap`'s size must equal the logical size of this WORAM
    /// (`posmap.size()`), and its `pmax` must be at least `primary.size() -
    /// stashlen - 1`.
    pub fn new(meta: Meta, primary: Primary, posmap: P, k: usize, key: AesKey, rng: R) -> Self {
        Self::build(meta, primary, posmap, k, Some(CbcCodec::new(&key)), rng)
    }

    /// Builds a BMNO that stores primary-area blocks in the clear, relying
    /// on an outer layer (a [`crate::crypto::CtrCrypt`]/[`crate::crypto::RandCrypt`]
    /// wrapped around whatever backend eventually holds `primary`) for
    /// confidentiality. Used when this BMNO instance is itself serving as
    /// the backing WORAM of a recursive [`PositionMap`] — see
    /// [`CommitBackend`].
    pub fn new_recursive(meta: Meta, primary: Primary, posmap: P, k: usize, rng: R) -> Self {
        Self::build(meta, primary, posmap, k, None, rng)
    }

    fn build(meta: Meta, primary: Primary, posmap: P, k: usize, cipher: Option<CbcCodec>, rng: R) -> Self {
        let size = posmap.size();
        let stashlen = default_stashlen(size);
        assert!(
            primary.size() > stashlen,
            "primary area of {} blocks is too small to reserve a stash of {stashlen}",
            primary.size()
        );
        let pmax = primary.size() - stashlen - 1;
        assert!(
            posmap.pmax() >= pmax,
            "internal position map pmax {} is too small for primary pmax {pmax}",
            posmap.pmax()
        );
        // spec.md §9 open question: the rejection-sampling loop in `sample_positions`
        // only terminates if there are at least `k` distinct positions to draw from.
        assert!(
            k >= 1 && k <= pmax + 1,
            "k={k} random rewrites per store must satisfy 1 <= k <= pmax+1={}",
            pmax + 1
        );
        let indbytes = bytelen(size as u64).max(1);
        let meta_len = indbytes + CRYPTBLOCK;
        assert_eq!(
            meta.blocksize(),
            meta_len,
            "meta backend blocksize must be {meta_len} ({indbytes} index bytes + a {CRYPTBLOCK}-byte IV)"
        );
        assert_eq!(
            meta.size(),
            primary.size(),
            "one metadata record is kept per primary slot, including the stash-dump region"
        );
        Self {
            meta,
            primary,
            posmap,
            cipher,
            rng,
            stash: Vec::with_capacity(stashlen),
            stashlen,
            size,
            pmax,
            k,
            indbytes,
            meta_len,
        }
    }

    /// The configured stash capacity, `60 + ceil(log2(size))`.
    pub fn stashlen(&self) -> usize {
        self.stashlen
    }

    /// The number of entries currently waiting in the stash. Exposed for
    /// the stash-bound fuzz test in spec.md §8.
    pub fn stash_occupancy(&self) -> usize {
        self.stash.len()
    }

    fn stash_find(&self, index: usize) -> Option<usize> {
        self.stash.iter().position(|(i, _)| *i == index)
    }

    fn stash_put(&mut self, index: usize, data: Vec<u8>) -> Result<()> {
        if let Some(i) = self.stash_find(index) {
            self.stash[i].1 = data;
            return Ok(());
        }
        if self.stash.len() >= self.stashlen {
            return Err(WoramError::LengthError(format!(
                "BMNO stash overflowed its capacity of {}",
                self.stashlen
            )));
        }
        self.stash.push((index, data));
        Ok(())
    }

    fn read_meta(&mut self, pos: usize) -> Result<(usize, [u8; CRYPTBLOCK])> {
        let mut buf = vec![0u8; self.meta_len];
        self.meta.load(pos, &mut buf)?;
        let ind = getnum(&buf[..self.indbytes]) as usize;
        let mut iv = [0u8; CRYPTBLOCK];
        iv.copy_from_slice(&buf[self.indbytes..]);
        Ok((ind, iv))
    }

    fn write_meta(&mut self, pos: usize, ind: usize, iv: &[u8; CRYPTBLOCK]) -> Result<()> {
        let mut buf = vec![0u8; self.meta_len];
        storenum(&mut buf[..self.indbytes], ind as u64);
        buf[self.indbytes..].copy_from_slice(iv);
        self.meta.store(pos, &buf)
    }

    /// Draws `k` distinct positions from `[0, pmax]` by rejection sampling.
    fn sample_positions(&mut self) -> Vec<usize> {
        let mut chosen = Vec::with_capacity(self.k);
        while chosen.len() < self.k {
            let candidate = self.rng.gen_range(0..=self.pmax);
            if !chosen.contains(&candidate) {
                chosen.push(candidate);
            }
        }
        chosen
    }

    fn encrypt_block(&self, iv: &[u8; CRYPTBLOCK], plain: &[u8], out: &mut [u8]) {
        match &self.cipher {
            Some(c) => c.encrypt(iv, plain, out),
            None => out.copy_from_slice(plain),
        }
    }

    fn decrypt_block(&self, iv: &[u8; CRYPTBLOCK], ctext: &[u8], out: &mut [u8]) {
        match &self.cipher {
            Some(c) => c.decrypt(iv, ctext, out),
            None => out.copy_from_slice(ctext),
        }
    }

    fn read_primary(&mut self, pos: usize, out: &mut [u8]) -> Result<()> {
        let (_, iv) = self.read_meta(pos)?;
        let mut ctext = vec![0u8; self.primary.blocksize()];
        self.primary.load(pos, &mut ctext)?;
        self.decrypt_block(&iv, &ctext, out);
        Ok(())
    }

    /// The per-store housekeeping: `k` random rewrites, each either
    /// evicting one stash entry into a stale-looking slot or re-randomizing
    /// a live one. Shared by [`Memory::store`] and [`CommitBackend::commit`]
    /// so that a tick with nothing new to place still produces the same
    /// physical write pattern as one that does.
    fn k_rewrite_round(&mut self) -> Result<()> {
        let positions = self.sample_positions();
        for p in positions {
            let (ind, iv) = self.read_meta(p)?;
            let occupant_stale = ind >= self.size || self.posmap.load(ind)? != p;

            if !self.stash.is_empty() && occupant_stale {
                let (idx_s, blk_s) = self.stash.pop().expect("just checked non-empty");
                let mut iv_new = [0u8; CRYPTBLOCK];
                self.rng.fill_bytes(&mut iv_new);
                let mut ctext = vec![0u8; self.primary.blocksize()];
                self.encrypt_block(&iv_new, &blk_s, &mut ctext);
                self.primary.store(p, &ctext)?;
                self.write_meta(p, idx_s, &iv_new)?;
                self.posmap.store(idx_s, p)?;
            } else {
                let mut ctext = vec![0u8; self.primary.blocksize()];
                self.primary.load(p, &mut ctext)?;
                let mut plain = vec![0u8; self.primary.blocksize()];
                self.decrypt_block(&iv, &ctext, &mut plain);
                let mut iv_new = [0u8; CRYPTBLOCK];
                self.rng.fill_bytes(&mut iv_new);
                self.encrypt_block(&iv_new, &plain, &mut ctext);
                self.primary.store(p, &ctext)?;
                self.write_meta(p, ind, &iv_new)?;
            }
        }
        if let Some(commit) = self.posmap.as_commit() {
            commit.commit()?;
        }
        Ok(())
    }
}

impl<Meta: Memory, Primary: Memory, P: PositionMap, R: RngCore + CryptoRng> Memory for BmnoWoram<Meta, Primary, P, R> {
    fn blocksize(&self) -> usize {
        self.primary.blocksize()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        if let Some(i) = self.stash_find(index) {
            out.copy_from_slice(&self.stash[i].1);
            return Ok(());
        }
        let pos = self.posmap.load(index)?;
        if pos == self.posmap.nptr() {
            out.iter_mut().for_each(|b| *b = 0);
            return Ok(());
        }
        self.read_primary(pos, out)
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        self.stash_put(index, data.to_vec())?;
        self.k_rewrite_round()
    }

    fn flush(&mut self) -> Result<()> {
        // Spec.md §9 open question: this dump does not update the position
        // map, so the stash's final contents are only recoverable by a
        // caller that already knows this is the last operation. Treat
        // `flush` as end-of-life, exactly as spec.md §4.9 prescribes.
        let dumped = std::mem::take(&mut self.stash);
        let primary_size = self.primary.size();
        let mut ctext = vec![0u8; self.primary.blocksize()];
        for (i, (_, block)) in dumped.into_iter().enumerate() {
            let pos = primary_size - 1 - i;
            let mut iv = [0u8; CRYPTBLOCK];
            self.rng.fill_bytes(&mut iv);
            self.encrypt_block(&iv, &block, &mut ctext);
            self.primary.store(pos, &ctext)?;
        }
        self.primary.flush()?;
        self.meta.flush()?;
        self.posmap.flush()
    }
}

impl<Meta: Memory, Primary: Memory, P: PositionMap, R: RngCore + CryptoRng> CommitBackend for BmnoWoram<Meta, Primary, P, R> {
    fn commit(&mut self) -> Result<()> {
        self.k_rewrite_round()
    }
}
