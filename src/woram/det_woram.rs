// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! The deterministic WORAM: a long-term area holding one "true" copy of
//! every index, and a holding area that every store appends to in a fixed
//! round-robin order. A position is a `(holding slot, bit index, bit
//! value)` triple: loading compares the named bit of the long-term copy
//! against the recorded value, and falls back to holding only on mismatch.
//! Periodic housekeeping rewrites ("long-term writes") keep the long-term
//! area from falling further and further behind the holding area.

use crate::bytenum::{bitlen, bitmask, get_bit, mismatch_bit};
use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};
use crate::position_map::PositionMap;

use super::PlainWoram;

/// Packs a holding-area slot, a bit index into a block, and that bit's
/// recorded value into one position integer, and back out again. Field
/// widths are derived once at construction from the holding area's size
/// and the block width, rather than fixed at compile time.
#[derive(Debug, Clone, Copy)]
pub struct DWPointer {
    holdsize: usize,
    blockbits: usize,
    hold_bits: u32,
    bind_bits: u32,
}

impl DWPointer {
    /// Builds the field-width layout for a holding area of `holdsize`
    /// blocks, each `blocksize_bytes` bytes wide.
    pub fn new(holdsize: usize, blocksize_bytes: usize) -> Self {
        assert!(holdsize >= 1, "holding area must have at least one block");
        let blockbits = blocksize_bytes * 8;
        Self {
            holdsize,
            blockbits,
            hold_bits: bitlen((holdsize - 1) as u64),
            bind_bits: bitlen((blockbits - 1) as u64),
        }
    }

    /// The largest position value this layout can represent.
    pub fn pmax(&self) -> usize {
        self.build(self.holdsize - 1, self.blockbits - 1, 1)
    }

    /// Extracts the holding-area slot from a packed position.
    pub fn get_hold(&self, ptr: usize) -> usize {
        ptr >> (self.bind_bits + 1)
    }

    /// Extracts the bit index from a packed position.
    pub fn get_bind(&self, ptr: usize) -> usize {
        (ptr >> 1) & (bitmask(self.bind_bits) as usize)
    }

    /// Extracts the recorded bit value from a packed position.
    pub fn get_bitval(&self, ptr: usize) -> u8 {
        (ptr & 1) as u8
    }

    /// Packs a holding slot, bit index, and bit value into one position.
    pub fn build(&self, hold: usize, bind: usize, bitval: u8) -> usize {
        (((hold << self.bind_bits) | bind) << 1) | (bitval as usize)
    }
}

/// A `PlainWoram` with a long-term area (one slot per logical index) and a
/// holding area (a fixed-size ring every store appends to).
pub struct DetWoram<LT, H> {
    longterm: LT,
    longpos: usize,
    holding: H,
    holdpos: usize,
    ptr: DWPointer,
}

impl<LT: Memory, H: Memory> DetWoram<LT, H> {
    /// Pairs a long-term area with a holding area; both must share a
    /// blocksize, and both must have at least one block.
    pub fn new(longterm: LT, holding: H) -> Self {
        assert!(
            longterm.size() >= 1 && holding.size() >= 1,
            "long-term and holding areas must each have at least one block"
        );
        assert_eq!(
            longterm.blocksize(),
            holding.blocksize(),
            "long-term and holding blocksizes must match"
        );
        let ptr = DWPointer::new(holding.size(), longterm.blocksize());
        Self {
            longterm,
            longpos: 0,
            holding,
            holdpos: 0,
            ptr,
        }
    }

    /// The number of blocks in the holding area.
    pub fn holdsize(&self) -> usize {
        self.holding.size()
    }

    /// Rewrites however many long-term slots are needed so that the
    /// long-term area's progress stays proportional to the holding area's:
    /// after `holdpos` has advanced to a `(holdpos+1)/holdsize` fraction of
    /// a lap, the long-term area should have made the same fractional
    /// progress through its own, larger, lap.
    fn ltws(&mut self, posmap: &mut dyn PositionMap) -> Result<()> {
        let target = (self.holdpos as u128 + 1) * self.longterm.size() as u128 / self.holding.size() as u128;
        let num_ltw = target as usize - self.longpos;
        let mut temp = vec![0u8; self.blocksize()];
        for _ in 0..num_ltw {
            let pos = posmap.load(self.longpos)?;
            let pos = if pos == posmap.nptr() { self.nptr() } else { pos };
            self.load(self.longpos, pos, &mut temp)?;
            self.longterm.store(self.longpos, &temp)?;
            self.longpos += 1;
            if self.longpos == self.longterm.size() {
                self.longpos = 0;
            }
        }
        Ok(())
    }
}

impl<LT: Memory, H: Memory> PlainWoram for DetWoram<LT, H> {
    fn blocksize(&self) -> usize {
        self.longterm.blocksize()
    }

    fn size(&self) -> usize {
        self.longterm.size()
    }

    fn pmax(&self) -> usize {
        self.ptr.pmax()
    }

    fn load(&mut self, index: Address, position: usize, out: &mut [u8]) -> Result<()> {
        WoramError::check_range(index, self.size() - 1)?;
        self.longterm.load(index, out)?;
        if position != self.nptr() && get_bit(out, self.ptr.get_bind(position)) != self.ptr.get_bitval(position) {
            self.holding.load(self.ptr.get_hold(position), out)?;
        }
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8], posmap: &mut dyn PositionMap) -> Result<usize> {
        self.ltws(posmap)?;

        let mut temp = vec![0u8; self.blocksize()];
        self.longterm.load(index, &mut temp)?;
        let mut diffpos = mismatch_bit(&temp, data);
        if diffpos == self.blocksize() * 8 {
            diffpos = 0;
        }
        let diffbit = get_bit(data, diffpos);
        let newpos = self.ptr.build(self.holdpos, diffpos, diffbit);

        self.holding.store(self.holdpos, data)?;
        self.holdpos += 1;
        if self.holdpos == self.holding.size() {
            self.holdpos = 0;
        }

        Ok(newpos)
    }

    fn dummy_write(&mut self, posmap: &mut dyn PositionMap) -> Result<()> {
        self.ltws(posmap)?;
        let zero = vec![0u8; self.blocksize()];
        self.holding.store(self.holdpos, &zero)?;
        self.holdpos += 1;
        if self.holdpos == self.holding.size() {
            self.holdpos = 0;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.longterm.flush()?;
        self.holding.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LocalMem;
    use crate::position_map::LocalPosMap;
    use crate::woram::PMWoram;

    #[test]
    fn dwpointer_build_roundtrips() {
        let ptr = DWPointer::new(5, 16);
        for hold in 0..5 {
            for bind in [0usize, 1, 64, 127] {
                for bitval in [0u8, 1] {
                    let packed = ptr.build(hold, bind, bitval);
                    assert_eq!(ptr.get_hold(packed), hold);
                    assert_eq!(ptr.get_bind(packed), bind);
                    assert_eq!(ptr.get_bitval(packed), bitval);
                }
            }
        }
    }

    #[test]
    fn dwpointer_pmax_is_reachable() {
        let ptr = DWPointer::new(3, 4);
        let pmax = ptr.pmax();
        assert_eq!(ptr.get_hold(pmax), 2);
        assert_eq!(ptr.get_bind(pmax), 31);
        assert_eq!(ptr.get_bitval(pmax), 1);
    }

    #[test]
    fn det_woram_through_pmworam_round_trips() {
        let longterm = LocalMem::new(16, 4);
        let holding = LocalMem::new(16, 3);
        let plain = DetWoram::new(longterm, holding);
        let posmap = LocalPosMap::new(4, plain.pmax());
        let mut woram = PMWoram::new(plain, posmap);

        let mut buf = vec![0u8; 16];
        woram.load(0, &mut buf).unwrap();
        assert_eq!(buf, vec![0u8; 16]);

        woram.store(1, &[7u8; 16]).unwrap();
        woram.load(1, &mut buf).unwrap();
        assert_eq!(buf, vec![7u8; 16]);

        woram.store(2, &[9u8; 16]).unwrap();
        woram.load(1, &mut buf).unwrap();
        assert_eq!(buf, vec![7u8; 16], "earlier writes must survive later ones");
        woram.load(2, &mut buf).unwrap();
        assert_eq!(buf, vec![9u8; 16]);
    }

    #[test]
    fn det_woram_survives_many_writes_past_holding_capacity() {
        let longterm = LocalMem::new(8, 4);
        let holding = LocalMem::new(8, 2);
        let plain = DetWoram::new(longterm, holding);
        let posmap = LocalPosMap::new(4, plain.pmax());
        let mut woram = PMWoram::new(plain, posmap);

        for round in 0u8..10 {
            for idx in 0..4 {
                woram.store(idx, &[round.wrapping_add(idx as u8); 8]).unwrap();
            }
        }
        let mut buf = vec![0u8; 8];
        for idx in 0..4usize {
            woram.load(idx, &mut buf).unwrap();
            assert_eq!(buf, vec![9u8.wrapping_add(idx as u8); 8]);
        }
    }
}
