// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! The uniform block-addressable storage contract, and the simplest leaf
//! implementation of it.

use crate::error::{Result, WoramError};

/// The numeric type used to index into a [`Memory`] and to size it.
pub type Address = usize;

/// An addressable collection of `size()` fixed-width blocks. Every layer of
/// the WORAM stack — leaves, transformers, and the WORAM algorithms
/// themselves once promoted via `PMWoram` — implements this trait.
///
/// `blocksize()` and `size()` are fixed for the life of the object: no
/// implementation may change what either method returns after construction.
pub trait Memory {
    /// The width, in bytes, of every block in this memory.
    fn blocksize(&self) -> usize;

    /// The number of addressable blocks.
    fn size(&self) -> usize;

    /// Reads the block at `index` into `out`, which must be exactly
    /// `blocksize()` bytes.
    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()>;

    /// Writes `data`, which must be exactly `blocksize()` bytes, to `index`.
    fn store(&mut self, index: Address, data: &[u8]) -> Result<()>;

    /// Forces any buffered state down to the backing store. A no-op unless
    /// the implementation (transitively) backs onto persistent storage.
    fn flush(&mut self) -> Result<()>;

    /// Whether this memory is still usable. Only meaningful for leaves that
    /// can fail irrecoverably (e.g. `FileMem` after a short I/O); every
    /// other layer defers to its backend.
    fn good(&self) -> bool {
        true
    }

    /// Checks that `index` is a valid address, for use by implementations.
    fn check_index(&self, index: Address) -> Result<()> {
        if self.size() == 0 {
            return Err(WoramError::OutOfRange { value: index, max: 0 });
        }
        WoramError::check_range(index, self.size() - 1)
    }
}

impl Memory for Box<dyn Memory> {
    fn blocksize(&self) -> usize {
        (**self).blocksize()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        (**self).load(index, out)
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        (**self).store(index, data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn good(&self) -> bool {
        (**self).good()
    }
}

/// A leaf [`Memory`] backed by an in-process `Vec` of blocks.
#[derive(Debug, Clone)]
pub struct LocalMem {
    blocksize: usize,
    blocks: Vec<Box<[u8]>>,
}

impl LocalMem {
    /// Creates a new `LocalMem` of `size` blocks of `blocksize` bytes each,
    /// all initialized to zero.
    pub fn new(blocksize: usize, size: usize) -> Self {
        let blocks = (0..size)
            .map(|_| vec![0u8; blocksize].into_boxed_slice())
            .collect();
        Self { blocksize, blocks }
    }
}

impl Memory for LocalMem {
    fn blocksize(&self) -> usize {
        self.blocksize
    }

    fn size(&self) -> usize {
        self.blocks.len()
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        log::trace!("LocalMem physical read -- {index}");
        out.copy_from_slice(&self.blocks[index]);
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        log::trace!("LocalMem physical write -- {index}");
        self.blocks[index].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
