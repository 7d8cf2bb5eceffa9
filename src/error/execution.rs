//! This module contains errors pertaining to the abstract execution of an
//! instruction batch.

use thiserror::Error;

use crate::error::{container, emission};

/// Errors that occur during the execution of a program by the
/// [`crate::machine::Machine`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("No generator could be resolved for the call to `{method}`")]
    UnresolvedCallTarget { method: String },

    #[error("No generator is registered under the name `{name}` at version {version}")]
    UnresolvedGenerator { name: String, version: u32 },

    #[error("The static initializer of `{type_name}` could not be loaded")]
    UnresolvedStaticInitializer { type_name: String },

    #[error("Emission of the instructions for `{name}` failed: {source}")]
    GeneratorEmission {
        name:   String,
        source: emission::Error,
    },

    #[error("The variable `{name}` was read before it was assigned")]
    UndefinedVariable { name: String },

    #[error("Argument slot {requested} was requested but only {available} slots are bound")]
    ArgumentSlotOutOfBounds { requested: usize, available: usize },

    #[error("Arguments were initialized twice for the same call")]
    ArgumentsReinitialized,

    #[error("{provided} argument values were bound to a frame expecting {expected}")]
    ArgumentCountMismatch { expected: usize, provided: usize },

    #[error("A call to `{method}` requires a receiver but none was provided")]
    MissingReceiver { method: String },

    #[error("The return value register was read but no call has returned a value")]
    NoReturnValue,

    #[error("A jump targets offset {requested} in a batch of {available} instructions")]
    JumpOutOfBounds { requested: u32, available: usize },

    #[error("A jump references a label whose offset was never resolved")]
    UnresolvedJumpTarget,

    #[error("Execution exceeded the limit of {limit} instructions")]
    StepLimitExceeded { limit: usize },

    #[error("The call stack exceeded the maximum depth of {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("A native delegate faulted: {message}")]
    NativeFault { message: String },

    #[error("Execution was stopped by the watchdog")]
    StoppedByWatchdog,
}

impl Error {
    /// Constructs a [`Error::NativeFault`] with the provided `message`.
    pub fn native_fault(message: impl Into<String>) -> Self {
        Self::NativeFault {
            message: message.into(),
        }
    }
}

/// An execution error with an associated instruction offset.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have execution errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, offset: u32) -> Self::Located {
        container::Located {
            location: offset,
            payload:  self,
        }
    }
}
