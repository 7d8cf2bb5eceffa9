//! This module contains the interfaces through which the host supplies
//! programs to the machine, together with the descriptor types those
//! interfaces exchange.
//!
//! The machine never inspects source text or host types directly. Everything
//! it knows about the program under analysis arrives through a [`Loader`]
//! (which maps names to instruction generators) and a [`MachineSettings`]
//! (which answers the questions only the host type system can answer, such
//! as which type describes a literal).

use std::{fmt::Debug, rc::Rc};

use crate::{error::emission, program::InstructionEmitter};

/// A `(name, version)` key identifying an instruction generator for dispatch
/// and batch caching.
///
/// Equality and hashing are structural over both components. Two generators
/// that share a name are distinct as long as their versions differ, which is
/// what allows the loader to hand out re-compiled method bodies without
/// invalidating unrelated cache entries.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionedName {
    name:    String,
    version: u32,
}

impl VersionedName {
    /// Constructs a new versioned name from the provided `name` and
    /// `version`.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        let name = name.into();
        Self { name, version }
    }

    /// Gets the name component of the key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the version component of the key.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl std::fmt::Display for VersionedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A descriptor for a host type.
///
/// The machine treats types as opaque names. All semantic questions about
/// them are delegated back to the host through [`MachineSettings`] and
/// [`Loader`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TypeInfo {
    name: String,
}

impl TypeInfo {
    /// Constructs a new type descriptor for the type called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { name }
    }

    /// Gets the name of the described type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The kind of a method as far as dispatch is concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MethodKind {
    /// A constructor. Executing the call allocates the receiver instance.
    Constructor,

    /// An instance method. The receiver is read from a variable in the
    /// calling frame.
    Instance,

    /// A static method. The receiver is the per-type shared instance.
    Static,
}

/// A descriptor for a callable method, as emitted into call instructions by
/// the external compiler.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDescriptor {
    name:                  String,
    declaring_type:        TypeInfo,
    kind:                  MethodKind,
    needs_dynamic_resolve: bool,
}

impl MethodDescriptor {
    /// Constructs a descriptor for the constructor of `declaring_type`.
    #[must_use]
    pub fn constructor(declaring_type: TypeInfo) -> Self {
        let name = format!("{}::new", declaring_type.name());
        Self {
            name,
            declaring_type,
            kind: MethodKind::Constructor,
            needs_dynamic_resolve: false,
        }
    }

    /// Constructs a descriptor for the statically dispatched instance method
    /// `name` on `declaring_type`.
    pub fn instance_method(declaring_type: TypeInfo, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            kind: MethodKind::Instance,
            needs_dynamic_resolve: false,
        }
    }

    /// Constructs a descriptor for the instance method `name` on
    /// `declaring_type` that needs dynamic resolving, such as a virtual
    /// method.
    ///
    /// Dynamic resolving means that the machine resolves the call target
    /// using the _runtime_ type of the receiver instance rather than the
    /// declaring type recorded here.
    pub fn virtual_method(declaring_type: TypeInfo, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            kind: MethodKind::Instance,
            needs_dynamic_resolve: true,
        }
    }

    /// Constructs a descriptor for the static method `name` on
    /// `declaring_type`.
    pub fn static_method(declaring_type: TypeInfo, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type,
            kind: MethodKind::Static,
            needs_dynamic_resolve: false,
        }
    }

    /// Gets the name of the method.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the type on which the method is declared.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeInfo {
        &self.declaring_type
    }

    /// Gets the dispatch kind of the method.
    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Checks whether the call target must be resolved against the runtime
    /// type of the receiver.
    #[must_use]
    pub fn needs_dynamic_resolve(&self) -> bool {
        self.needs_dynamic_resolve
    }
}

/// A literal value as it appears in the program representation.
///
/// The machine does not compute with literal values. It only needs to carry
/// them so that the host can describe their types and decide predicate truth.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Literal {
    /// A boolean literal.
    Boolean(bool),

    /// An integral literal.
    Integer(i64),

    /// A textual literal.
    Text(String),

    /// The null literal.
    Null,
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Boolean(value) => write!(f, "{value}"),
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::Text(value) => write!(f, "{value:?}"),
            Literal::Null => write!(f, "null"),
        }
    }
}

/// The interface to an object that can emit the instruction sequence for one
/// method body.
///
/// Generators are resolved by name through the [`Loader`] and their output is
/// cached by the machine, so `emit` must be deterministic for a given
/// generator instance.
pub trait InstructionGenerator
where
    Self: Debug,
{
    /// Emits the instructions of this generator into the provided `emitter`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the instructions cannot be emitted, which is a bug
    /// in the emitting compiler rather than in the program under analysis.
    fn emit(&self, emitter: &mut InstructionEmitter) -> emission::Result<()>;
}

/// A dynamically dispatched [`InstructionGenerator`].
pub type DynInstructionGenerator = Rc<dyn InstructionGenerator>;

/// The interface through which the machine resolves names to instruction
/// generators.
pub trait Loader
where
    Self: Debug,
{
    /// Gets the versioned name of the generator at which execution begins.
    #[must_use]
    fn entry_point(&self) -> VersionedName;

    /// Resolves the generator name for a call to `method` given the
    /// statically known `argument_info`, where slot 0 describes the
    /// receiver.
    ///
    /// For methods that need dynamic resolving the machine substitutes the
    /// runtime type of the receiver instance into slot 0 before calling
    /// this.
    ///
    /// Returns [`None`] if no target can be resolved, which is fatal for the
    /// run.
    #[must_use]
    fn resolve_call_name(
        &self,
        method: &MethodDescriptor,
        argument_info: &[TypeInfo],
    ) -> Option<VersionedName>;

    /// Gets the instruction generator registered under `name`.
    ///
    /// Returns [`None`] if the name resolves to no generator, which is fatal
    /// for the run.
    #[must_use]
    fn generator(&self, name: &VersionedName) -> Option<DynInstructionGenerator>;

    /// Resolves the name of the static initializer of `type_info`, if the
    /// type has one.
    ///
    /// The machine runs the initializer before the first call that touches
    /// the type's shared instance.
    #[must_use]
    fn resolve_static_initializer(&self, type_info: &TypeInfo) -> Option<VersionedName>;
}

/// A dynamically dispatched [`Loader`].
pub type DynLoader = Rc<dyn Loader>;

/// The interface through which the machine asks the host the questions that
/// only the host type system can answer.
pub trait MachineSettings
where
    Self: Debug,
{
    /// Gets the type descriptor for the provided `literal`.
    #[must_use]
    fn literal_info(&self, literal: &Literal) -> TypeInfo;

    /// Gets the type descriptor for the shared instance that represents the
    /// type called `type_name` in static calls.
    #[must_use]
    fn shared_instance_info(&self, type_name: &str) -> TypeInfo;

    /// Decides whether the provided predicate `instance` is true for the
    /// purposes of a conditional jump.
    #[must_use]
    fn is_true(&self, instance: &crate::instance::Instance) -> bool;

    /// Called once immediately before the machine starts interpreting the
    /// entry point.
    fn before_interpretation(&self) {}

    /// Called once after the machine has finished interpreting, regardless
    /// of whether interpretation succeeded.
    fn after_interpretation(&self) {}
}

/// A dynamically dispatched [`MachineSettings`].
pub type DynMachineSettings = Rc<dyn MachineSettings>;
