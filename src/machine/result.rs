//! This module contains the stable handles used to address the machine's
//! arenas, and the [`AnalyzingResult`] that freezes those arenas once a run
//! has finished.

use crate::{
    instance::Instance,
    machine::{block::ExecutedBlock, context::CallContext},
};

/// A stable handle addressing a [`CallContext`] in the analysis arenas.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContextId(u32);

impl ContextId {
    /// Constructs a handle for the context at `index`.
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Gets the arena index the handle addresses.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A stable handle addressing an [`ExecutedBlock`].
///
/// Handles at or past the end of the result's block arena address blocks
/// that exist only inside one [`crate::view::ExecutionView`], created there
/// by speculative call insertion.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BlockId(u32);

impl BlockId {
    /// Constructs a handle for the block at `index`.
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Gets the arena index the handle addresses.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable handle addressing an [`Instance`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(u32);

impl InstanceId {
    /// Constructs a handle for the instance at `index`.
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Gets the arena index the handle addresses.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The frozen result of one machine run.
///
/// The result owns the arenas of contexts, blocks and instances that the
/// machine built while executing. It is shared read-only — typically behind
/// an [`std::rc::Rc`] — between every [`crate::view::ExecutionView`] built
/// over it; views never mutate it.
#[derive(Clone, Debug)]
pub struct AnalyzingResult {
    contexts:      Vec<CallContext>,
    blocks:        Vec<ExecutedBlock>,
    instances:     Vec<Instance>,
    entry_context: ContextId,
    return_value:  Option<InstanceId>,
}

impl AnalyzingResult {
    /// Constructs a result from the machine's arenas.
    pub(crate) fn new(
        contexts: Vec<CallContext>,
        blocks: Vec<ExecutedBlock>,
        instances: Vec<Instance>,
        entry_context: ContextId,
        return_value: Option<InstanceId>,
    ) -> Self {
        Self {
            contexts,
            blocks,
            instances,
            entry_context,
            return_value,
        }
    }

    /// Gets the context addressed by `id`.
    #[must_use]
    pub fn context(&self, id: ContextId) -> &CallContext {
        &self.contexts[id.index()]
    }

    /// Gets the block addressed by `id`.
    ///
    /// Returns [`None`] for handles addressing view-local blocks, which do
    /// not live in the shared result.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&ExecutedBlock> {
        self.blocks.get(id.index())
    }

    /// Gets the instance addressed by `id`.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.instances[id.index()]
    }

    /// Gets all contexts created during the run, in creation order.
    #[must_use]
    pub fn contexts(&self) -> &[CallContext] {
        &self.contexts
    }

    /// Gets all executed blocks created during the run, in creation order.
    #[must_use]
    pub fn blocks(&self) -> &[ExecutedBlock] {
        &self.blocks
    }

    /// Gets all instances created during the run, in creation order.
    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Gets the context in which execution began.
    #[must_use]
    pub fn entry_context(&self) -> &CallContext {
        self.context(self.entry_context)
    }

    /// Gets the handle of the context in which execution began.
    #[must_use]
    pub fn entry_context_id(&self) -> ContextId {
        self.entry_context
    }

    /// Gets the value returned by the entry point, if it returned one.
    #[must_use]
    pub fn return_value(&self) -> Option<InstanceId> {
        self.return_value
    }

    /// Finds the first instance whose identifier equals `id`.
    #[must_use]
    pub fn instance_named(&self, id: &str) -> Option<InstanceId> {
        self.instances
            .iter()
            .position(|instance| instance.id() == id)
            .map(InstanceId::new)
    }

    /// Iterates the executed blocks of the context addressed by `id`, in
    /// execution order, following the shared (non-overridden) links.
    pub fn blocks_of(&self, id: ContextId) -> impl Iterator<Item = BlockId> + '_ {
        let mut cursor = self.context(id).first_block();
        std::iter::from_fn(move || {
            let current = cursor?;
            cursor = self.block(current).and_then(ExecutedBlock::next);
            Some(current)
        })
    }
}
