//! This module contains the program representation executed by the machine:
//! the [`Instruction`] variants, the per-instruction [`InstructionInfo`]
//! metadata, and the frozen [`InstructionBatch`] together with its emission
//! utilities.

pub mod emitter;
pub mod label;

use std::{fmt::Debug, rc::Rc};

use itertools::Itertools;

pub use self::{emitter::InstructionEmitter, label::Label};
use crate::{
    error::execution,
    loader::{Literal, MethodDescriptor, TypeInfo},
    machine::DirectContext,
    transform::{BlockTransformProvider, CallTransformProvider},
};

/// The maximum number of instructions in a single batch.
///
/// Instruction offsets are stored as [`u32`], so a batch can never address
/// more instructions than this. The limit is validated when the batch is
/// frozen.
pub const INSTRUCTION_BATCH_MAX_SIZE: u32 = u32::MAX;

/// An identifier for a variable within one call frame.
///
/// Variable names are value-equal by name. The receiver of a call is bound
/// under the reserved name returned by [`Self::receiver`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VariableName(String);

impl VariableName {
    /// Constructs a new variable name from the provided `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gets the name under which the call receiver is bound in every frame.
    #[must_use]
    pub fn receiver() -> Self {
        Self(crate::constant::RECEIVER_NAME.to_string())
    }

    /// Gets the textual name of the variable.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VariableName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The signature of a host-supplied native delegate.
///
/// Native delegates run synchronously against the current call context
/// through the scoped [`DirectContext`] facade; they never push a context of
/// their own.
pub type NativeFn = dyn Fn(&mut DirectContext<'_>) -> execution::Result<()>;

/// A named, cloneable handle to a host-supplied native delegate.
///
/// The delegate captures whatever context it needs explicitly; the machine
/// passes no ambient state beyond the [`DirectContext`].
#[derive(Clone)]
pub struct NativeFunction {
    name:     Rc<str>,
    function: Rc<NativeFn>,
}

impl NativeFunction {
    /// Constructs a new native function called `name` wrapping the provided
    /// delegate.
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(&mut DirectContext<'_>) -> execution::Result<()> + 'static,
    ) -> Self {
        let name: String = name.into();
        let function: Rc<NativeFn> = Rc::new(function);
        Self {
            name: Rc::from(name),
            function,
        }
    }

    /// Gets the name of the native function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the delegate against the provided `context`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the delegate faults, which terminates the run.
    pub(crate) fn invoke(&self, context: &mut DirectContext<'_>) -> execution::Result<()> {
        (self.function)(context)
    }
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish_non_exhaustive()
    }
}

/// The payload of a call instruction.
///
/// Calls cover constructor, instance and static dispatch; the distinction
/// lives in the [`MethodDescriptor`]'s kind. A call optionally carries the
/// [`CallTransformProvider`] that the external editing layer attached to the
/// call site when the instruction was emitted.
#[derive(Clone, Debug)]
pub struct CallInstruction {
    pub(crate) method:         MethodDescriptor,
    pub(crate) receiver:       Option<VariableName>,
    pub(crate) arguments:      Vec<VariableName>,
    pub(crate) type_arguments: Vec<TypeInfo>,
    pub(crate) provider:       Option<Rc<dyn CallTransformProvider>>,
}

impl CallInstruction {
    /// Gets the descriptor of the called method.
    #[must_use]
    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Gets the variable holding the call receiver, for calls that read
    /// their receiver from the calling frame.
    #[must_use]
    pub fn receiver(&self) -> Option<&VariableName> {
        self.receiver.as_ref()
    }

    /// Gets the variables holding the call arguments.
    #[must_use]
    pub fn arguments(&self) -> &[VariableName] {
        &self.arguments
    }

    /// Gets the type arguments of the call.
    #[must_use]
    pub fn type_arguments(&self) -> &[TypeInfo] {
        &self.type_arguments
    }

    /// Gets the transform provider attached to the call site, if any.
    #[must_use]
    pub fn provider(&self) -> Option<&Rc<dyn CallTransformProvider>> {
        self.provider.as_ref()
    }
}

/// One instruction in the program representation.
///
/// Instructions are immutable once emitted. They operate on the variables of
/// the current call frame; values never move between frames except through
/// arguments and the return-value register.
#[derive(Clone, Debug)]
pub enum Instruction {
    /// Binds `target` to a fresh instance describing `value`.
    AssignLiteral {
        target: VariableName,
        value:  Literal,
    },

    /// Binds `target` to the instance currently bound to `source`.
    Assign {
        target: VariableName,
        source: VariableName,
    },

    /// Binds `target` to the instance in argument slot `slot` of the current
    /// frame. Slot 0 holds the receiver.
    AssignArgument { target: VariableName, slot: usize },

    /// Binds `target` to the value of the most recently returned call.
    AssignReturnValue { target: VariableName },

    /// Dispatches a call, pushing a new call context.
    Call(CallInstruction),

    /// Returns from the current context, optionally publishing `value` to
    /// the return-value register of the caller.
    Return { value: Option<VariableName> },

    /// Unconditionally moves the program counter to the labelled offset.
    Jump { target: Label },

    /// Moves the program counter to the labelled offset when the host
    /// decides that the instance bound to `condition` is true.
    ConditionalJump {
        condition: VariableName,
        target:    Label,
    },

    /// Synchronously invokes a host-supplied native delegate against the
    /// current context without pushing a call context.
    DirectInvoke { function: NativeFunction },

    /// Does nothing.
    Nop,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::AssignLiteral { target, value } => write!(f, "{target} = {value}"),
            Instruction::Assign { target, source } => write!(f, "{target} = {source}"),
            Instruction::AssignArgument { target, slot } => write!(f, "{target} = arg[{slot}]"),
            Instruction::AssignReturnValue { target } => write!(f, "{target} = retval"),
            Instruction::Call(call) => {
                let arguments = call.arguments.iter().join(", ");
                match &call.receiver {
                    Some(receiver) => {
                        write!(f, "call {}.{}({arguments})", receiver, call.method.name())
                    }
                    None => write!(f, "call {}({arguments})", call.method.name()),
                }
            }
            Instruction::Return { value: Some(value) } => write!(f, "return {value}"),
            Instruction::Return { value: None } => write!(f, "return"),
            Instruction::Jump { target } => write!(f, "jump {target}"),
            Instruction::ConditionalJump { condition, target } => {
                write!(f, "jump-if {condition} {target}")
            }
            Instruction::DirectInvoke { function } => write!(f, "native {}", function.name()),
            Instruction::Nop => write!(f, "nop"),
        }
    }
}

/// Metadata shared by the instructions of one editable block.
///
/// Consecutive instructions that reference the same info belong to the same
/// source-level statement and are recorded into the same
/// [`crate::machine::block::ExecutedBlock`] when they run.
#[derive(Clone, Debug, Default)]
pub struct InstructionInfo {
    /// A comment describing the originating source, if the compiler supplied
    /// one.
    comment: Option<String>,

    /// The block-level transform provider attached by the external editing
    /// layer, if any.
    block_provider: Option<Rc<dyn BlockTransformProvider>>,
}

impl InstructionInfo {
    /// Constructs a new instruction info with the provided `comment` and
    /// `block_provider`.
    #[must_use]
    pub fn new(
        comment: Option<String>,
        block_provider: Option<Rc<dyn BlockTransformProvider>>,
    ) -> Self {
        Self {
            comment,
            block_provider,
        }
    }

    /// Gets the comment attached to this info, if any.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Gets the block-level transform provider attached to this info, if
    /// any.
    #[must_use]
    pub fn block_provider(&self) -> Option<&Rc<dyn BlockTransformProvider>> {
        self.block_provider.as_ref()
    }
}

/// A frozen, ordered sequence of instructions with resolved jump labels.
///
/// # Immutability
///
/// A batch is produced by [`InstructionEmitter::emitted_instructions`] and
/// never changes afterwards. The machine shares batches between call
/// contexts through [`Rc`], and the emitter can splice a frozen batch into a
/// new emission via [`InstructionEmitter::insert_instructions`] to replay
/// cached generator output.
///
/// # Jump Resolution
///
/// Every label referenced by a jump in the batch is guaranteed to be
/// resolved to an in-bounds instruction offset. This is validated when the
/// batch is frozen.
#[derive(Clone, Debug)]
pub struct InstructionBatch {
    /// The sequence of instructions.
    instructions: Vec<Instruction>,

    /// The infos referenced by the instructions.
    infos: Vec<InstructionInfo>,

    /// For each instruction, the index of its info in `infos`.
    info_indices: Vec<u32>,

    /// The labels that resolve into this batch, kept for rendering.
    labels: Vec<Label>,
}

impl InstructionBatch {
    /// Constructs a new batch from parts prepared by the emitter.
    pub(crate) fn from_parts(
        instructions: Vec<Instruction>,
        infos: Vec<InstructionInfo>,
        info_indices: Vec<u32>,
        labels: Vec<Label>,
    ) -> Self {
        Self {
            instructions,
            infos,
            info_indices,
            labels,
        }
    }

    /// Gets the number of instructions in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks if the batch contains no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the instruction at `offset`, if it exists.
    #[must_use]
    pub fn instruction(&self, offset: u32) -> Option<&Instruction> {
        self.instructions.get(offset as usize)
    }

    /// Gets the index of the info describing the instruction at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is out of bounds for the batch. This is a
    /// programmer bug, as offsets are only produced by in-bounds iteration.
    #[must_use]
    pub fn info_index(&self, offset: u32) -> u32 {
        self.info_indices[offset as usize]
    }

    /// Gets the info describing the instruction at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is out of bounds for the batch. This is a
    /// programmer bug, as offsets are only produced by in-bounds iteration.
    #[must_use]
    pub fn info(&self, offset: u32) -> &InstructionInfo {
        &self.infos[self.info_indices[offset as usize] as usize]
    }

    /// Gets the instructions of the batch.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Gets the infos of the batch.
    #[must_use]
    pub fn infos(&self) -> &[InstructionInfo] {
        &self.infos
    }

    /// Gets the labels resolving into the batch.
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

/// Renders the batch one instruction per line, prefixed by the comment of
/// its info (whenever the info changes) and by any label pointing at that
/// line.
///
/// This rendering is a debugging aid, not a persisted format.
impl std::fmt::Display for InstructionBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut previous_info = None;
        for (offset, instruction) in self.instructions.iter().enumerate() {
            let info_index = self.info_indices[offset];
            if previous_info != Some(info_index) {
                if let Some(comment) = self.infos[info_index as usize].comment() {
                    writeln!(f, "; {comment}")?;
                }
                previous_info = Some(info_index);
            }

            for label in &self.labels {
                if label.offset() == Some(offset as u32) {
                    writeln!(f, "{}:", label.name())?;
                }
            }

            writeln!(f, "  {instruction}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        loader::{Literal, MethodDescriptor, TypeInfo},
        program::{InstructionEmitter, VariableName},
    };

    #[test]
    fn groups_instructions_by_info() -> anyhow::Result<()> {
        let mut emitter = InstructionEmitter::new();
        emitter.begin_block(Some("var x = new Foo()".into()), None);
        emitter.call(
            MethodDescriptor::constructor(TypeInfo::new("Foo")),
            None,
            vec![],
        );
        emitter.assign_return_value(VariableName::new("x"));
        emitter.begin_block(Some("log(x)".into()), None);
        emitter.call(
            MethodDescriptor::static_method(TypeInfo::new("Log"), "log"),
            None,
            vec![VariableName::new("x")],
        );
        let batch = emitter.emitted_instructions()?;

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.info_index(0), batch.info_index(1));
        assert_ne!(batch.info_index(1), batch.info_index(2));

        Ok(())
    }

    #[test]
    fn renders_comments_and_labels() -> anyhow::Result<()> {
        let mut emitter = InstructionEmitter::new();
        emitter.begin_block(Some("loop forever".into()), None);
        let top = emitter.create_label("top");
        emitter.mark_label(&top)?;
        emitter.assign_literal(VariableName::new("flag"), Literal::Boolean(true));
        emitter.jump(top.clone());
        let batch = emitter.emitted_instructions()?;

        let rendered = batch.to_string();
        assert!(rendered.contains("; loop forever"));
        assert!(rendered.contains("top:"));
        assert!(rendered.contains("jump top"));

        Ok(())
    }
}
