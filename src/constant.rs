//! This module contains constants that are needed throughout the codebase.

/// The argument slot that is reserved for the call receiver.
pub const RECEIVER_SLOT: usize = 0;

/// The reserved variable name under which the call receiver is bound in a
/// call frame.
pub const RECEIVER_NAME: &str = "this";

/// The prefix that marks an instance identifier as synthetic.
///
/// Synthetic identifiers are assigned by the machine at instance creation
/// time and may later be upgraded to a non-synthetic hint exactly once.
pub const SYNTHETIC_ID_PREFIX: &str = "$";

/// The default maximum number of instructions that the machine will execute
/// in a single run.
///
/// This bounds execution in the presence of cyclic jumps that the host's
/// predicate resolution never breaks out of.
pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

/// The default maximum depth of the call-context stack.
///
/// Mutually recursive generators would otherwise grow the context arena
/// without bound.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// The default number of loop iterations the machine will wait before polling
/// the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;
