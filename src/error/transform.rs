//! This module contains errors pertaining to the transformation engine and
//! its execution views.

use thiserror::Error;

/// Errors that occur while applying transformations through an
/// [`crate::view::ExecutionView`].
///
/// Note that a view _aborting_ is not an error. Aborts are expected,
/// recoverable outcomes recorded on the view itself; the errors here are
/// contract violations in the use of the editing protocol.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The view was aborted twice")]
    AbortedTwice,

    #[error("The view was committed twice")]
    CommittedTwice,

    #[error("An aborted view cannot be committed")]
    CommitAfterAbort,

    #[error("Another view in this clone lineage has already been committed")]
    LineageAlreadyCommitted,

    #[error("A committed view can no longer be mutated")]
    MutatedAfterCommit,

    #[error("The shifting provider of an executed block was set twice")]
    ShiftProviderAlreadySet,

    #[error("Block {block} carries no provider for structural edits")]
    MissingBlockProvider { block: u32 },
}

/// The result type for methods that may have transformation errors.
pub type Result<T> = std::result::Result<T, Error>;
