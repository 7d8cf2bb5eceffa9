//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::{collections::HashMap, fmt, rc::Rc};

use wiring_analyzer::{
    error::{emission, transform},
    loader::{
        DynInstructionGenerator,
        InstructionGenerator,
        Literal,
        Loader,
        MachineSettings,
        MethodDescriptor,
        TypeInfo,
        VersionedName,
    },
    machine::{result::AnalyzingResult, Config, Machine},
    program::InstructionEmitter,
    transform::{
        BlockTransformProvider,
        CallDescription,
        CallTransformProvider,
        DynTransformation,
        TransformProvider,
        Transformation,
    },
    view::ExecutionView,
    watchdog::{DynWatchdog, LazyWatchdog},
};

/// The key under which [`RecordingTransformation`]s accumulate their labels
/// in a view's data.
pub const APPLIED_LOG_KEY: &str = "applied-log";

/// An instruction generator wrapping a closure, so test programs can be
/// written inline.
pub struct FnGenerator {
    name: &'static str,
    body: Box<dyn Fn(&mut InstructionEmitter) -> emission::Result<()>>,
}

impl fmt::Debug for FnGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator").field("name", &self.name).finish_non_exhaustive()
    }
}

impl InstructionGenerator for FnGenerator {
    fn emit(&self, emitter: &mut InstructionEmitter) -> emission::Result<()> {
        (self.body)(emitter)
    }
}

/// Wraps `body` into a dynamically dispatched generator called `name`.
#[allow(unused)] // It is actually
pub fn generator(
    name: &'static str,
    body: impl Fn(&mut InstructionEmitter) -> emission::Result<()> + 'static,
) -> DynInstructionGenerator {
    Rc::new(FnGenerator {
        name,
        body: Box::new(body),
    })
}

/// A loader over a fixed table of generators, with optional dynamic-dispatch
/// targets and static initializers.
#[derive(Debug)]
pub struct ScriptLoader {
    generators:      HashMap<VersionedName, DynInstructionGenerator>,
    initializers:    HashMap<String, VersionedName>,
    dynamic_targets: HashMap<(String, String), VersionedName>,
    unresolved:      Vec<String>,
}

impl ScriptLoader {
    /// Constructs a loader whose entry point is the provided generator.
    #[allow(unused)] // It is actually
    pub fn new(entry: DynInstructionGenerator) -> Self {
        let mut generators = HashMap::new();
        generators.insert(VersionedName::new("entry", 0), entry);
        Self {
            generators,
            initializers: HashMap::new(),
            dynamic_targets: HashMap::new(),
            unresolved: Vec::new(),
        }
    }

    /// Registers `generator` under `name` at version 0.
    #[allow(unused)] // It is actually
    pub fn with_generator(mut self, name: &str, generator: DynInstructionGenerator) -> Self {
        self.generators.insert(VersionedName::new(name, 0), generator);
        self
    }

    /// Registers the static initializer of the type called `type_name` as
    /// the generator called `initializer`.
    #[allow(unused)] // It is actually
    pub fn with_initializer(mut self, type_name: &str, initializer: &str) -> Self {
        self.initializers
            .insert(type_name.to_string(), VersionedName::new(initializer, 0));
        self
    }

    /// Registers `target` as the dynamically resolved callee of `method`
    /// when the receiver's runtime type is `runtime_type`.
    #[allow(unused)] // It is actually
    pub fn with_dynamic_target(mut self, method: &str, runtime_type: &str, target: &str) -> Self {
        self.dynamic_targets.insert(
            (method.to_string(), runtime_type.to_string()),
            VersionedName::new(target, 0),
        );
        self
    }

    /// Makes calls to `method` unresolvable, for failure-path tests.
    #[allow(unused)] // It is actually
    pub fn with_unresolvable(mut self, method: &str) -> Self {
        self.unresolved.push(method.to_string());
        self
    }
}

impl Loader for ScriptLoader {
    fn entry_point(&self) -> VersionedName {
        VersionedName::new("entry", 0)
    }

    fn resolve_call_name(
        &self,
        method: &MethodDescriptor,
        argument_info: &[TypeInfo],
    ) -> Option<VersionedName> {
        if method.needs_dynamic_resolve() {
            if let Some(runtime) = argument_info.first() {
                let key = (method.name().to_string(), runtime.name().to_string());
                if let Some(name) = self.dynamic_targets.get(&key) {
                    return Some(name.clone());
                }
            }
        }
        if self.unresolved.iter().any(|name| name == method.name()) {
            return None;
        }

        Some(VersionedName::new(method.name(), 0))
    }

    fn generator(&self, name: &VersionedName) -> Option<DynInstructionGenerator> {
        self.generators.get(name).cloned()
    }

    fn resolve_static_initializer(&self, type_info: &TypeInfo) -> Option<VersionedName> {
        self.initializers.get(type_info.name()).cloned()
    }
}

/// Settings that answer type questions nominally: literals are typed by
/// their shape, shared instances carry a `shared:` prefix, and only the
/// `true` boolean literal is truthy.
#[derive(Debug)]
pub struct TestSettings;

impl MachineSettings for TestSettings {
    fn literal_info(&self, literal: &Literal) -> TypeInfo {
        match literal {
            Literal::Boolean(true) => TypeInfo::new("bool#true"),
            Literal::Boolean(false) => TypeInfo::new("bool#false"),
            Literal::Integer(_) => TypeInfo::new("int"),
            Literal::Text(_) => TypeInfo::new("string"),
            Literal::Null => TypeInfo::new("null"),
        }
    }

    fn shared_instance_info(&self, type_name: &str) -> TypeInfo {
        TypeInfo::new(format!("shared:{type_name}"))
    }

    fn is_true(&self, instance: &wiring_analyzer::instance::Instance) -> bool {
        instance.info().name() == "bool#true"
    }
}

/// Runs the program described by `loader` with default configuration.
#[allow(unused)] // It is actually
pub fn run(loader: ScriptLoader) -> anyhow::Result<Rc<AnalyzingResult>> {
    run_with(loader, Config::default(), LazyWatchdog.in_rc())
}

/// Runs the program described by `loader` with the provided `config` and
/// `watchdog`.
#[allow(unused)] // It is actually
pub fn run_with(
    loader: ScriptLoader,
    config: Config,
    watchdog: DynWatchdog,
) -> anyhow::Result<Rc<AnalyzingResult>> {
    let machine = Machine::new(Rc::new(loader), Rc::new(TestSettings), config, watchdog)?;

    Ok(Rc::new(machine.run()?))
}

/// A transformation that records its label into the view's data when
/// applied, so tests can observe what was applied and in which order.
#[derive(Debug)]
pub struct RecordingTransformation {
    pub label: String,
}

impl Transformation for RecordingTransformation {
    fn apply(&self, view: &mut ExecutionView) -> transform::Result<()> {
        let mut log = view
            .data::<Vec<String>>(APPLIED_LOG_KEY)
            .map(|entries| (*entries).clone())
            .unwrap_or_default();
        log.push(self.label.clone());
        view.set_data(APPLIED_LOG_KEY, Rc::new(log));

        Ok(())
    }
}

/// Reads the labels recorded into `view` by [`RecordingTransformation`]s.
#[allow(unused)] // It is actually
pub fn applied_log(view: &ExecutionView) -> Vec<String> {
    view.data::<Vec<String>>(APPLIED_LOG_KEY)
        .map(|entries| (*entries).clone())
        .unwrap_or_default()
}

fn recording(label: String) -> DynTransformation {
    Rc::new(RecordingTransformation { label })
}

/// A call-site provider whose transformations record themselves.
#[derive(Debug)]
pub struct RecordingCallProvider {
    label: String,
}

impl TransformProvider for RecordingCallProvider {
    fn remove(&self) -> DynTransformation {
        recording(format!("remove:{}", self.label))
    }
}

impl CallTransformProvider for RecordingCallProvider {
    fn remove_argument(&self, index: usize) -> DynTransformation {
        recording(format!("remove-argument:{}:{index}", self.label))
    }

    fn rewrite_argument(&self, index: usize, source: &str) -> DynTransformation {
        recording(format!("rewrite-argument:{}:{index}:{source}", self.label))
    }

    fn append_argument(&self, source: &str) -> DynTransformation {
        recording(format!("append-argument:{}:{source}", self.label))
    }

    fn is_optional_argument(&self, _index: usize) -> bool {
        false
    }

    fn set_optional_argument(&self, index: usize, optional: bool) -> DynTransformation {
        recording(format!("set-optional:{}:{index}:{optional}", self.label))
    }
}

/// Constructs a recording call provider labelled `label`.
#[allow(unused)] // It is actually
pub fn call_provider(label: &str) -> Rc<dyn CallTransformProvider> {
    Rc::new(RecordingCallProvider {
        label: label.to_string(),
    })
}

/// A block provider whose transformations record themselves.
#[derive(Debug)]
pub struct RecordingBlockProvider {
    label: String,
}

impl TransformProvider for RecordingBlockProvider {
    fn remove(&self) -> DynTransformation {
        recording(format!("remove-block:{}", self.label))
    }
}

impl BlockTransformProvider for RecordingBlockProvider {
    fn shift_before(&self, _pivot: &dyn BlockTransformProvider) -> DynTransformation {
        recording(format!("shift-before:{}", self.label))
    }

    fn shift_behind(&self, _pivot: &dyn BlockTransformProvider) -> DynTransformation {
        recording(format!("shift-behind:{}", self.label))
    }

    fn prepend_call(&self, call: &CallDescription) -> DynTransformation {
        recording(format!("prepend-call:{}:{}", self.label, call.method()))
    }

    fn append_call(&self, call: &CallDescription) -> DynTransformation {
        recording(format!("append-call:{}:{}", self.label, call.method()))
    }
}

/// Constructs a recording block provider labelled `label`.
#[allow(unused)] // It is actually
pub fn block_provider(label: &str) -> Rc<dyn BlockTransformProvider> {
    Rc::new(RecordingBlockProvider {
        label: label.to_string(),
    })
}
