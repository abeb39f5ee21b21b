// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! A leaf [`Memory`] backed by a file, for use outside of process memory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Result, WoramError};
use crate::memory::{Address, Memory};

/// A [`Memory`] that seeks and reads/writes exactly one block per
/// operation on an already-open file. The file must be pre-sized to at
/// least `size * blocksize` bytes; `FileMem` never grows it.
#[derive(Debug)]
pub struct FileMem {
    file: File,
    blocksize: usize,
    size: usize,
    good: bool,
}

impl FileMem {
    /// Wraps `file`, which must already be at least `size * blocksize`
    /// bytes long and open for both reading and writing.
    pub fn new(file: File, blocksize: usize, size: usize) -> Result<Self> {
        let needed = (blocksize as u64) * (size as u64);
        let actual = file.metadata()?.len();
        if actual < needed {
            return Err(WoramError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("file is too small: need at least {needed} bytes, have {actual}"),
            )));
        }
        Ok(Self {
            file,
            blocksize,
            size,
            good: true,
        })
    }

    fn offset(&self, index: Address) -> u64 {
        (index * self.blocksize) as u64
    }
}

impl Memory for FileMem {
    fn blocksize(&self) -> usize {
        self.blocksize
    }

    fn size(&self) -> usize {
        self.size
    }

    fn load(&mut self, index: Address, out: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        debug_assert_eq!(out.len(), self.blocksize);
        log::trace!("FileMem physical read -- {index}");
        let offset = self.offset(index);
        let result = (|| -> std::io::Result<()> {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(out)
        })();
        if let Err(e) = result {
            self.good = false;
            return Err(WoramError::IoError(e));
        }
        Ok(())
    }

    fn store(&mut self, index: Address, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        debug_assert_eq!(data.len(), self.blocksize);
        log::trace!("FileMem physical write -- {index}");
        let offset = self.offset(index);
        let result = (|| -> std::io::Result<()> {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(data)
        })();
        if let Err(e) = result {
            self.good = false;
            return Err(WoramError::IoError(e));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data().map_err(|e| {
            self.good = false;
            WoramError::IoError(e)
        })
    }

    fn good(&self) -> bool {
        self.good
    }
}
