// This source code is dual-licensed under either the MIT license or the
// Apache License, Version 2.0, at your option.

//! Error types shared by every layer of the WORAM stack.

use thiserror::Error;

/// Errors raised by a [`Memory`](crate::memory::Memory), [`PositionMap`](crate::position_map::PositionMap),
/// or WORAM operation.
#[derive(Debug, Error)]
pub enum WoramError {
    /// An index or position fell outside its declared bound.
    #[error("index or position {value} out of range [0, {max}]")]
    OutOfRange {
        /// The offending value.
        value: usize,
        /// The largest valid value.
        max: usize,
    },

    /// A fixed-capacity buffer (the BMNO stash, a trie path) would have
    /// overflowed its declared bound.
    #[error("{0}")]
    LengthError(String),

    /// A [`CtrCrypt`](crate::crypto::CtrCrypt) backend received a
    /// non-sequential write.
    #[error("non-sequential write at index {index}, expected {expected}")]
    InvalidAccess {
        /// The index that was actually written.
        index: usize,
        /// The index that sequential-write order required.
        expected: usize,
    },

    /// A leaf [`Memory`](crate::memory::Memory) backed by persistent storage
    /// failed to complete a read, write, or sync.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A handshake or negotiation magic value did not match what was
    /// expected.
    #[error("{0}")]
    MismatchError(String),
}

impl WoramError {
    /// Builds an [`WoramError::OutOfRange`], checking `value <= max` first.
    pub fn check_range(value: usize, max: usize) -> Result<(), WoramError> {
        if value > max {
            Err(WoramError::OutOfRange { value, max })
        } else {
            Ok(())
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WoramError>;
