//! This library implements an abstract execution analysis of
//! dependency-injection wiring code. It simulates execution of a compiled
//! program representation to discover which objects were created and called,
//! and lets a caller apply *source-consistent* edits driven by that
//! execution trace — validated against what actually ran, not against what
//! the source merely looks like.
//!
//! # How it Works
//!
//! From a very high level, the analysis and editing process is performed as
//! follows:
//!
//! 1. The external compiler emits the program as an
//!    [`program::InstructionBatch`] through an
//!    [`program::InstructionEmitter`], attaching transform providers for
//!    the call sites and blocks it wants to keep editable.
//! 2. The [`machine::Machine`] interprets the batches, dispatching calls
//!    through the host's [`loader::Loader`] and recording every
//!    call context, executed block and instance into an
//!    [`machine::result::AnalyzingResult`].
//! 3. A consumer builds one or more [`view::ExecutionView`]s over the
//!    result and applies [`transform::Transformation`]s through them. Views
//!    are speculative: structural changes are copy-on-write overrides local
//!    to the view, and each view is either committed or aborted.
//!
//! # Basic Usage
//!
//! ```
//! use std::rc::Rc;
//!
//! use wiring_analyzer::{
//!     loader::{
//!         InstructionGenerator, Literal, Loader, MachineSettings, MethodDescriptor, TypeInfo,
//!         VersionedName,
//!     },
//!     machine::Config,
//!     program::{InstructionEmitter, VariableName},
//!     view::ExecutionView,
//!     watchdog::LazyWatchdog,
//! };
//!
//! // The entry point builds a component: `var service = new Service()`.
//! #[derive(Debug)]
//! struct EntryBody;
//!
//! impl InstructionGenerator for EntryBody {
//!     fn emit(
//!         &self,
//!         emitter: &mut InstructionEmitter,
//!     ) -> wiring_analyzer::error::emission::Result<()> {
//!         emitter.begin_block(Some("var service = new Service()".into()), None);
//!         emitter.call(
//!             MethodDescriptor::constructor(TypeInfo::new("Service")),
//!             None,
//!             vec![],
//!         );
//!         emitter.assign_return_value(VariableName::new("service"));
//!         Ok(())
//!     }
//! }
//!
//! // The constructor body does nothing observable.
//! #[derive(Debug)]
//! struct EmptyBody;
//!
//! impl InstructionGenerator for EmptyBody {
//!     fn emit(
//!         &self,
//!         emitter: &mut InstructionEmitter,
//!     ) -> wiring_analyzer::error::emission::Result<()> {
//!         emitter.ret(None);
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct DemoLoader;
//!
//! impl Loader for DemoLoader {
//!     fn entry_point(&self) -> VersionedName {
//!         VersionedName::new("entry", 0)
//!     }
//!
//!     fn resolve_call_name(
//!         &self,
//!         method: &MethodDescriptor,
//!         _argument_info: &[TypeInfo],
//!     ) -> Option<VersionedName> {
//!         Some(VersionedName::new(method.name(), 0))
//!     }
//!
//!     fn generator(&self, name: &VersionedName) -> Option<Rc<dyn InstructionGenerator>> {
//!         match name.name() {
//!             "entry" => Some(Rc::new(EntryBody)),
//!             "Service::new" => Some(Rc::new(EmptyBody)),
//!             _ => None,
//!         }
//!     }
//!
//!     fn resolve_static_initializer(&self, _type_info: &TypeInfo) -> Option<VersionedName> {
//!         None
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct DemoSettings;
//!
//! impl MachineSettings for DemoSettings {
//!     fn literal_info(&self, literal: &Literal) -> TypeInfo {
//!         TypeInfo::new(format!("literal:{literal}"))
//!     }
//!
//!     fn shared_instance_info(&self, type_name: &str) -> TypeInfo {
//!         TypeInfo::new(type_name)
//!     }
//!
//!     fn is_true(&self, _instance: &wiring_analyzer::instance::Instance) -> bool {
//!         false
//!     }
//! }
//!
//! let machine = wiring_analyzer::new(
//!     Rc::new(DemoLoader),
//!     Rc::new(DemoSettings),
//!     Config::default(),
//!     LazyWatchdog.in_rc(),
//! )
//! .unwrap();
//! let result = Rc::new(machine.run().unwrap());
//!
//! // The created instance took its identifier from the assignment.
//! let service = result.instance_named("service").unwrap();
//! assert_eq!(result.instance(service).info().name(), "Service");
//!
//! // An execution view over the result supports speculative editing. The
//! // constructor call carried no provider, so the instance is not
//! // removable.
//! let mut view = ExecutionView::new(result);
//! assert!(!view.can_remove(service));
//! view.abort("nothing to edit").unwrap();
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod constant;
pub mod error;
pub mod instance;
pub mod loader;
pub mod machine;
pub mod program;
pub mod transform;
pub mod view;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use machine::{result::AnalyzingResult, Config, Machine};
pub use view::ExecutionView;

use crate::{
    loader::{DynLoader, DynMachineSettings},
    watchdog::DynWatchdog,
};

/// Constructs a new [`Machine`] that analyses the program reachable from
/// the `loader`'s entry point.
///
/// # Errors
///
/// Returns [`Err`] if the entry point's generator cannot be resolved or
/// fails to emit its instructions.
pub fn new(
    loader: DynLoader,
    settings: DynMachineSettings,
    config: Config,
    watchdog: DynWatchdog,
) -> error::Result<Machine> {
    Machine::new(loader, settings, config, watchdog).map_err(Into::into)
}
