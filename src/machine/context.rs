//! This module contains the definition of the [`CallContext`], one
//! activation record in the machine's call stack, and of the [`Arguments`]
//! bound into it.

use std::{collections::HashMap, rc::Rc};

use crate::{
    constant::RECEIVER_SLOT,
    error::execution::Error,
    loader::{TypeInfo, VersionedName},
    machine::result::{BlockId, ContextId, InstanceId},
    program::{Instruction, InstructionBatch, VariableName},
};

/// The fixed-size argument slots of one call.
///
/// Slot [`crate::constant::RECEIVER_SLOT`] holds the receiver. The slots
/// must be initialized exactly once, before the call executes its first
/// instruction; initializing them again is a contract violation.
#[derive(Clone, Debug)]
pub struct Arguments {
    slots:          Vec<InstanceId>,
    type_arguments: Vec<TypeInfo>,
    expected:       usize,
    initialized:    bool,
}

impl Arguments {
    /// Constructs argument storage expecting `slot_count` slots, the
    /// receiver included.
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots:          Vec::new(),
            type_arguments: Vec::new(),
            expected:       slot_count,
            initialized:    false,
        }
    }

    /// Constructs the empty, already-initialized argument storage used by
    /// the entry context, which has neither receiver nor arguments.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            slots:          Vec::new(),
            type_arguments: Vec::new(),
            expected:       0,
            initialized:    true,
        }
    }

    /// Binds the `receiver` into slot 0 and the `values` into the remaining
    /// slots, together with the call's `type_arguments`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the arguments have already been initialized, or if
    /// the number of provided values does not match the expected slot
    /// count.
    pub fn initialize(
        &mut self,
        receiver: InstanceId,
        values: &[InstanceId],
        type_arguments: Vec<TypeInfo>,
    ) -> Result<(), Error> {
        if self.initialized {
            return Err(Error::ArgumentsReinitialized);
        }
        let provided = values.len() + 1;
        if provided != self.expected {
            return Err(Error::ArgumentCountMismatch {
                expected: self.expected,
                provided,
            });
        }

        self.slots.reserve(provided);
        self.slots.push(receiver);
        self.slots.extend_from_slice(values);
        self.type_arguments = type_arguments;
        self.initialized = true;

        Ok(())
    }

    /// Gets the instance bound into the slot at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no slot exists at `index`.
    pub fn slot(&self, index: usize) -> Result<InstanceId, Error> {
        self.slots.get(index).copied().ok_or(Error::ArgumentSlotOutOfBounds {
            requested: index,
            available: self.slots.len(),
        })
    }

    /// Gets the receiver bound into slot 0, if the call has one.
    #[must_use]
    pub fn receiver(&self) -> Option<InstanceId> {
        self.slots.get(RECEIVER_SLOT).copied()
    }

    /// Gets the type arguments of the call.
    #[must_use]
    pub fn type_arguments(&self) -> &[TypeInfo] {
        &self.type_arguments
    }

    /// Gets the number of bound slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if no slots are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Checks whether the arguments have been initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// One activation record in the machine's call stack.
///
/// A context owns the variable frame and program counter of one invocation
/// of a generator's instructions. Contexts are created by the machine, form
/// a stack through their caller handles, and live for the duration of the
/// analysis result.
#[derive(Clone, Debug)]
pub struct CallContext {
    id:              ContextId,
    name:            VersionedName,
    caller:          Option<ContextId>,
    call_block:      Option<BlockId>,
    batch:           Rc<InstructionBatch>,
    program_counter: u32,
    variables:       HashMap<VariableName, InstanceId>,
    arguments:       Arguments,
    first_block:     Option<BlockId>,
    last_block:      Option<BlockId>,
    yields_receiver: bool,
    depth:           usize,
}

impl CallContext {
    /// Constructs a new context executing `batch` under the generator
    /// `name`.
    ///
    /// `call_block` is the executed block in the caller that contains the
    /// call instruction which created this context; it anchors the context
    /// for the ordering queries of the transformation engine.
    #[allow(clippy::too_many_arguments)] // Construction happens in exactly one place.
    pub(crate) fn new(
        id: ContextId,
        name: VersionedName,
        caller: Option<ContextId>,
        call_block: Option<BlockId>,
        batch: Rc<InstructionBatch>,
        arguments: Arguments,
        yields_receiver: bool,
        depth: usize,
    ) -> Self {
        Self {
            id,
            name,
            caller,
            call_block,
            batch,
            program_counter: 0,
            variables: HashMap::new(),
            arguments,
            first_block: None,
            last_block: None,
            yields_receiver,
            depth,
        }
    }

    /// Gets the handle of this context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Gets the name of the generator whose instructions this context
    /// executes.
    #[must_use]
    pub fn name(&self) -> &VersionedName {
        &self.name
    }

    /// Gets the handle of the calling context, if this is not the entry
    /// context.
    #[must_use]
    pub fn caller(&self) -> Option<ContextId> {
        self.caller
    }

    /// Gets the block in the caller that contains the call which created
    /// this context.
    #[must_use]
    pub fn call_block(&self) -> Option<BlockId> {
        self.call_block
    }

    /// Gets the instruction batch this context executes.
    #[must_use]
    pub fn batch(&self) -> &Rc<InstructionBatch> {
        &self.batch
    }

    /// Gets the current program counter.
    #[must_use]
    pub fn program_counter(&self) -> u32 {
        self.program_counter
    }

    /// Gets the instance bound to `name` in this frame, if any.
    #[must_use]
    pub fn variable(&self, name: &VariableName) -> Option<InstanceId> {
        self.variables.get(name).copied()
    }

    /// Gets the arguments bound into this context.
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Gets the head of this context's executed-block list.
    #[must_use]
    pub fn first_block(&self) -> Option<BlockId> {
        self.first_block
    }

    /// Gets the tail of this context's executed-block list.
    #[must_use]
    pub fn last_block(&self) -> Option<BlockId> {
        self.last_block
    }

    /// Gets the depth of this context in the call stack, with the entry
    /// context at depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Checks whether returning from this context yields the receiver, as
    /// constructor calls do.
    #[must_use]
    pub fn yields_receiver(&self) -> bool {
        self.yields_receiver
    }

    /// Gets the instruction the program counter points at, if execution has
    /// not run off the end of the batch.
    pub(crate) fn next_instruction(&self) -> Option<&Instruction> {
        self.batch.instruction(self.program_counter)
    }

    /// Binds `name` to `instance` in this frame.
    pub(crate) fn set_variable(&mut self, name: VariableName, instance: InstanceId) {
        self.variables.insert(name, instance);
    }

    /// Advances the program counter past the current instruction.
    pub(crate) fn step(&mut self) {
        self.program_counter += 1;
    }

    /// Moves the program counter to `offset`.
    pub(crate) fn jump_to(&mut self, offset: u32) {
        self.program_counter = offset;
    }

    /// Records `block` as the newest block in this context's history list.
    pub(crate) fn push_block(&mut self, block: BlockId) {
        if self.first_block.is_none() {
            self.first_block = Some(block);
        }
        self.last_block = Some(block);
    }
}
