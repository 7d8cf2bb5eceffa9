//! This module contains the [`InstructionEmitter`], the two-phase builder
//! through which the external compiler produces instruction batches.
//!
//! Emission is accumulate-then-freeze: the emitter gathers instructions,
//! infos and labels, and [`InstructionEmitter::emitted_instructions`]
//! resolves every referenced label and freezes the result into an immutable
//! [`InstructionBatch`]. A frozen batch can later be spliced into another
//! emission with [`InstructionEmitter::insert_instructions`], which is how
//! cached generator output is replayed instead of re-run.

use std::rc::Rc;

use crate::{
    error::emission::{Error, Result},
    loader::{Literal, MethodDescriptor, TypeInfo},
    program::{
        CallInstruction,
        Instruction,
        InstructionBatch,
        InstructionInfo,
        Label,
        NativeFunction,
        VariableName,
        INSTRUCTION_BATCH_MAX_SIZE,
    },
    transform::{BlockTransformProvider, CallTransformProvider},
};

/// The accumulating half of the two-phase batch emission.
///
/// Instructions emitted after a call to [`Self::begin_block`] share one
/// [`InstructionInfo`] and therefore form one editable block when they are
/// executed.
#[derive(Debug)]
pub struct InstructionEmitter {
    /// The instructions accumulated so far.
    instructions: Vec<Instruction>,

    /// The infos referenced by the accumulated instructions.
    infos: Vec<InstructionInfo>,

    /// For each instruction, the index of its info.
    info_indices: Vec<u32>,

    /// Every label created by or spliced into this emitter.
    labels: Vec<Label>,
}

impl InstructionEmitter {
    /// Constructs a new, empty emitter.
    ///
    /// Instructions emitted before the first call to [`Self::begin_block`]
    /// share an anonymous info with no comment and no provider.
    #[must_use]
    pub fn new() -> Self {
        let infos = vec![InstructionInfo::default()];
        Self {
            instructions: Vec::new(),
            infos,
            info_indices: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// Starts a new editable block.
    ///
    /// All instructions emitted until the next call to this method share an
    /// info carrying the provided `comment` and `block_provider`.
    pub fn begin_block(
        &mut self,
        comment: Option<String>,
        block_provider: Option<Rc<dyn BlockTransformProvider>>,
    ) {
        self.infos.push(InstructionInfo::new(comment, block_provider));
    }

    /// Emits an instruction binding `target` to a fresh instance described
    /// by the literal `value`.
    pub fn assign_literal(&mut self, target: VariableName, value: Literal) {
        self.push(Instruction::AssignLiteral { target, value });
    }

    /// Emits an instruction binding `target` to the instance bound to
    /// `source`.
    pub fn assign(&mut self, target: VariableName, source: VariableName) {
        self.push(Instruction::Assign { target, source });
    }

    /// Emits an instruction binding `target` to argument slot `slot` of the
    /// executing frame.
    pub fn assign_argument(&mut self, target: VariableName, slot: usize) {
        self.push(Instruction::AssignArgument { target, slot });
    }

    /// Emits an instruction binding `target` to the value of the most
    /// recently returned call.
    pub fn assign_return_value(&mut self, target: VariableName) {
        self.push(Instruction::AssignReturnValue { target });
    }

    /// Emits a call to `method` with the provided `receiver` and
    /// `arguments`.
    ///
    /// The returned builder allows attaching a [`CallTransformProvider`] and
    /// type arguments to the emitted call.
    pub fn call(
        &mut self,
        method: MethodDescriptor,
        receiver: Option<VariableName>,
        arguments: Vec<VariableName>,
    ) -> CallBuilder<'_> {
        self.push(Instruction::Call(CallInstruction {
            method,
            receiver,
            arguments,
            type_arguments: Vec::new(),
            provider: None,
        }));
        let index = self.instructions.len() - 1;
        CallBuilder {
            emitter: self,
            index,
        }
    }

    /// Emits a return from the current context, optionally publishing the
    /// instance bound to `value`.
    pub fn ret(&mut self, value: Option<VariableName>) {
        self.push(Instruction::Return { value });
    }

    /// Emits a synchronous invocation of the provided native `function`.
    pub fn direct_invoke(&mut self, function: NativeFunction) {
        self.push(Instruction::DirectInvoke { function });
    }

    /// Creates a new unresolved label called `name` for use with the jump
    /// emission methods.
    pub fn create_label(&mut self, name: impl Into<String>) -> Label {
        let label = Label::new(name);
        self.labels.push(label.clone());
        label
    }

    /// Resolves `label` to the offset of the next instruction to be
    /// emitted.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the label has already been resolved.
    pub fn mark_label(&mut self, label: &Label) -> Result<()> {
        let offset = u32::try_from(self.instructions.len()).map_err(|_| Error::BatchTooLarge {
            available: INSTRUCTION_BATCH_MAX_SIZE,
        })?;
        label.set_offset(offset)
    }

    /// Emits an unconditional jump to `target`.
    pub fn jump(&mut self, target: Label) {
        self.push(Instruction::Jump { target });
    }

    /// Emits a jump to `target` that is taken when the host decides the
    /// instance bound to `condition` is true.
    pub fn conditional_jump(&mut self, condition: VariableName, target: Label) {
        self.push(Instruction::ConditionalJump { condition, target });
    }

    /// Emits an instruction that does nothing.
    pub fn nop(&mut self) {
        self.push(Instruction::Nop);
    }

    /// Gets the number of instructions emitted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks if no instructions have been emitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Splices the instructions of a previously frozen `batch` into this
    /// emission.
    ///
    /// The batch's labels are re-created at their shifted offsets and jumps
    /// are rewritten to reference the re-created labels, so the spliced code
    /// behaves exactly as it did in its original batch.
    #[allow(clippy::missing_panics_doc)] // Fresh labels cannot already be set.
    pub fn insert_instructions(&mut self, batch: &InstructionBatch) {
        let base = self.instructions.len() as u32;
        let info_base = self.infos.len() as u32;
        self.infos.extend(batch.infos().iter().cloned());

        let mapped: Vec<(Label, Label)> = batch
            .labels()
            .iter()
            .map(|label| {
                let shifted = Label::new(label.name());
                if let Some(offset) = label.offset() {
                    shifted
                        .set_offset(offset + base)
                        .expect("A freshly created label cannot already be set");
                }
                (label.clone(), shifted)
            })
            .collect();
        let remap = |label: &Label| {
            mapped
                .iter()
                .find(|(original, _)| original.is_same(label))
                .map_or_else(|| label.clone(), |(_, shifted)| shifted.clone())
        };

        for (offset, instruction) in batch.instructions().iter().enumerate() {
            let instruction = match instruction {
                Instruction::Jump { target } => Instruction::Jump {
                    target: remap(target),
                },
                Instruction::ConditionalJump { condition, target } => {
                    Instruction::ConditionalJump {
                        condition: condition.clone(),
                        target:    remap(target),
                    }
                }
                other => other.clone(),
            };
            self.instructions.push(instruction);
            self.info_indices.push(info_base + batch.info_index(offset as u32));
        }

        self.labels.extend(mapped.into_iter().map(|(_, shifted)| shifted));
    }

    /// Freezes the accumulated instructions into an [`InstructionBatch`].
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if a jump references a label that was never resolved,
    /// if a label resolves outside the batch, or if the batch exceeds
    /// [`INSTRUCTION_BATCH_MAX_SIZE`] instructions.
    pub fn emitted_instructions(self) -> Result<InstructionBatch> {
        let available = self.instructions.len();
        if u32::try_from(available).is_err() {
            return Err(Error::BatchTooLarge {
                available: INSTRUCTION_BATCH_MAX_SIZE,
            });
        }

        for instruction in &self.instructions {
            let target = match instruction {
                Instruction::Jump { target } => target,
                Instruction::ConditionalJump { target, .. } => target,
                _ => continue,
            };
            match target.offset() {
                None => {
                    return Err(Error::UnresolvedLabel {
                        name: target.name().to_string(),
                    });
                }
                // A label may point just past the last instruction, which
                // ends the context when jumped to.
                Some(offset) if offset as usize > available => {
                    return Err(Error::LabelOutOfBounds {
                        name: target.name().to_string(),
                        offset,
                        available,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(InstructionBatch::from_parts(
            self.instructions,
            self.infos,
            self.info_indices,
            self.labels,
        ))
    }

    /// Pushes `instruction` under the info that is currently being emitted.
    #[allow(clippy::cast_possible_truncation)] // Info count is bounded by instruction count.
    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
        self.info_indices.push(self.infos.len() as u32 - 1);
    }
}

impl Default for InstructionEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// A builder for decorating a freshly emitted call instruction.
#[derive(Debug)]
pub struct CallBuilder<'a> {
    emitter: &'a mut InstructionEmitter,
    index:   usize,
}

impl CallBuilder<'_> {
    /// Attaches the transform provider of the call site to the emitted
    /// call.
    #[must_use]
    pub fn with_provider(mut self, provider: Rc<dyn CallTransformProvider>) -> Self {
        if let Instruction::Call(call) = &mut self.emitter.instructions[self.index] {
            call.provider = Some(provider);
        }
        self
    }

    /// Attaches type arguments to the emitted call.
    #[must_use]
    pub fn with_type_arguments(mut self, type_arguments: Vec<TypeInfo>) -> Self {
        if let Instruction::Call(call) = &mut self.emitter.instructions[self.index] {
            call.type_arguments = type_arguments;
        }
        self
    }
}
