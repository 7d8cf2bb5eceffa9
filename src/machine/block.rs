//! This module contains the definition of the [`ExecutedBlock`], the unit of
//! edit and removal granularity recorded by the machine as execution
//! proceeds.

use std::{cell::OnceCell, ops::Range, rc::Rc};

use crate::{
    error::transform,
    machine::result::{BlockId, ContextId, InstanceId},
    transform::{CallTransformProvider, DynBlockTransformProvider},
};

/// An instance affected by the instructions of one executed block, together
/// with the provider through which the effect can be removed from the
/// source.
#[derive(Clone, Debug)]
struct AffectedInstance {
    instance:        InstanceId,
    remove_provider: Option<Rc<dyn CallTransformProvider>>,
}

/// A node in the per-context, doubly-linked list of executed instruction
/// spans.
///
/// A block records a contiguous span of instructions that actually ran
/// within one call context and shared one
/// [`crate::program::InstructionInfo`]. Blocks are created by the machine
/// and never mutated after the run, with one exception: an
/// [`crate::view::ExecutionView`] may locally override the `next`/`previous`
/// links through its copy-on-write maps, leaving the shared links here
/// untouched.
#[derive(Clone, Debug)]
pub struct ExecutedBlock {
    /// The context within which the instructions ran.
    context: ContextId,

    /// The info shared by the instructions of the block.
    info_index: u32,

    /// The half-open span of instruction offsets that ran.
    instructions: Range<u32>,

    /// The block executed before this one in the same context.
    previous: Option<BlockId>,

    /// The block executed after this one in the same context.
    next: Option<BlockId>,

    /// The instances the block's instructions touched.
    affected: Vec<AffectedInstance>,

    /// The block-level provider used for shifting the block and inserting
    /// calls around it. Set at most once.
    shift_provider: OnceCell<DynBlockTransformProvider>,
}

impl ExecutedBlock {
    /// Constructs a new block for the instruction at `start` executing in
    /// `context` under the info at `info_index`.
    pub(crate) fn new(context: ContextId, info_index: u32, start: u32) -> Self {
        Self {
            context,
            info_index,
            instructions: start..start + 1,
            previous: None,
            next: None,
            affected: Vec::new(),
            shift_provider: OnceCell::new(),
        }
    }

    /// Gets the context within which this block executed.
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Gets the index of the info shared by the block's instructions.
    #[must_use]
    pub fn info_index(&self) -> u32 {
        self.info_index
    }

    /// Gets the span of instruction offsets the block covers.
    #[must_use]
    pub fn instructions(&self) -> Range<u32> {
        self.instructions.clone()
    }

    /// Gets the block executed before this one in the same context, in the
    /// shared (non-overridden) list.
    #[must_use]
    pub fn previous(&self) -> Option<BlockId> {
        self.previous
    }

    /// Gets the block executed after this one in the same context, in the
    /// shared (non-overridden) list.
    #[must_use]
    pub fn next(&self) -> Option<BlockId> {
        self.next
    }

    /// Checks whether the block's instructions touched `instance`.
    #[must_use]
    pub fn affects(&self, instance: InstanceId) -> bool {
        self.affected.iter().any(|entry| entry.instance == instance)
    }

    /// Gets the instances the block's instructions touched, in first-touch
    /// order.
    pub fn affected_instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        let mut seen = Vec::new();
        self.affected.iter().filter_map(move |entry| {
            if seen.contains(&entry.instance) {
                None
            } else {
                seen.push(entry.instance);
                Some(entry.instance)
            }
        })
    }

    /// Gets the removal providers this block contributes for `instance`.
    ///
    /// Returns [`None`] if the block affects the instance through at least
    /// one effect that carries no provider — in which case the instance
    /// cannot be removed from the source at all — and the (possibly empty)
    /// list of providers otherwise.
    #[must_use]
    pub fn remove_providers(
        &self,
        instance: InstanceId,
    ) -> Option<Vec<Rc<dyn CallTransformProvider>>> {
        let mut providers = Vec::new();
        for entry in &self.affected {
            if entry.instance != instance {
                continue;
            }
            match &entry.remove_provider {
                Some(provider) => providers.push(provider.clone()),
                None => return None,
            }
        }

        Some(providers)
    }

    /// Gets the block-level provider used for shifting this block, if one
    /// has been attached.
    #[must_use]
    pub fn shift_provider(&self) -> Option<&DynBlockTransformProvider> {
        self.shift_provider.get()
    }

    /// Attaches the block-level `provider` used for shifting this block.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a provider has already been attached. The shifting
    /// provider of a block is fixed once set.
    pub fn set_shift_provider(&self, provider: DynBlockTransformProvider) -> transform::Result<()> {
        self.shift_provider
            .set(provider)
            .map_err(|_| transform::Error::ShiftProviderAlreadySet)
    }

    /// Extends the block's instruction span to cover the instruction at
    /// `offset`.
    pub(crate) fn extend_to(&mut self, offset: u32) {
        self.instructions.end = offset + 1;
    }

    /// Records that the block's instructions touched `instance`, removable
    /// through `remove_provider` if one is given.
    ///
    /// Duplicate records of the same instance through the same provider are
    /// collapsed.
    pub(crate) fn record_affected(
        &mut self,
        instance: InstanceId,
        remove_provider: Option<Rc<dyn CallTransformProvider>>,
    ) {
        let duplicate = self.affected.iter().any(|entry| {
            entry.instance == instance
                && match (&entry.remove_provider, &remove_provider) {
                    (Some(existing), Some(new)) => Rc::ptr_eq(existing, new),
                    (None, None) => true,
                    _ => false,
                }
        });
        if duplicate {
            return;
        }

        self.affected.push(AffectedInstance {
            instance,
            remove_provider,
        });
    }

    /// Links `block` as the successor of this one in the shared list.
    pub(crate) fn set_next(&mut self, block: BlockId) {
        self.next = Some(block);
    }

    /// Links `block` as the predecessor of this one in the shared list.
    pub(crate) fn set_previous(&mut self, block: BlockId) {
        self.previous = Some(block);
    }
}
