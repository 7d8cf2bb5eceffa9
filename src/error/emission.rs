//! This module contains errors pertaining to the emission of instruction
//! batches.

use thiserror::Error;

/// Errors that occur while instructions are being emitted and frozen into an
/// [`crate::program::InstructionBatch`].
///
/// All of these represent contract violations on the part of the emitting
/// compiler rather than properties of the program being analysed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The offset of label `{name}` was set more than once")]
    LabelAlreadySet { name: String },

    #[error("A jump references label `{name}` but its offset was never set")]
    UnresolvedLabel { name: String },

    #[error("Label `{name}` points at offset {offset} in a batch of {available} instructions")]
    LabelOutOfBounds {
        name:      String,
        offset:    u32,
        available: usize,
    },

    #[error("The emitted batch exceeds the maximum of {available} instructions")]
    BatchTooLarge { available: u32 },
}

/// The result type for methods that may have emission errors.
pub type Result<T> = std::result::Result<T, Error>;
