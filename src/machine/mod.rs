//! This module contains the [`Machine`], the call-stack interpreter that
//! drives the fetch/execute loop over instruction batches and records the
//! contexts, blocks and instances that make up an [`AnalyzingResult`].

pub mod block;
pub mod context;
pub mod result;

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{
    constant::{DEFAULT_MAX_CALL_DEPTH, DEFAULT_STEP_LIMIT, RECEIVER_NAME},
    error::{
        container::Locatable,
        execution::{self, Error},
    },
    instance::Instance,
    loader::{DynLoader, DynMachineSettings, MethodKind, TypeInfo, VersionedName},
    machine::{
        block::ExecutedBlock,
        context::{Arguments, CallContext},
        result::{AnalyzingResult, BlockId, ContextId, InstanceId},
    },
    program::{CallInstruction, Instruction, InstructionBatch, InstructionEmitter, VariableName},
    watchdog::DynWatchdog,
};

/// The interpreter that simulates execution of the program under analysis.
///
/// One machine performs one run: it resolves the loader's entry point,
/// executes instructions against a stack of [`CallContext`]s, and records
/// every context, executed block and instance into arenas that
/// [`Self::consume`] freezes into the final [`AnalyzingResult`].
///
/// The machine is in the *running* state while a current context exists and
/// has a next instruction, and becomes *exhausted* — terminally — once the
/// entry context runs out of instructions.
#[derive(Debug)]
pub struct Machine {
    /// The loader through which generator names resolve to instructions.
    loader: DynLoader,

    /// The host's answers to type-system questions.
    settings: DynMachineSettings,

    /// The configuration of the machine.
    config: Config,

    /// A watchdog that gets polled at intervals to check whether the run
    /// needs to exit.
    watchdog: DynWatchdog,

    /// Every call context created during the run.
    contexts: Vec<CallContext>,

    /// Every executed block created during the run.
    blocks: Vec<ExecutedBlock>,

    /// Every instance created during the run.
    instances: Vec<Instance>,

    /// Frozen batches keyed by generator name, so re-dispatch to the same
    /// generator replays the cached batch instead of re-running emission.
    batch_cache: HashMap<VersionedName, Rc<InstructionBatch>>,

    /// The per-type shared instances used as static-call receivers.
    shared_instances: HashMap<String, InstanceId>,

    /// The types whose static initializers have already been considered.
    initialized_types: HashSet<String>,

    /// The context currently executing; [`None`] once the run is
    /// exhausted.
    current: Option<ContextId>,

    /// The context in which execution began.
    entry: ContextId,

    /// The value published by the most recently returned call.
    return_register: Option<InstanceId>,

    /// The number of instructions executed so far.
    steps: usize,
}

impl Machine {
    /// Constructs a new machine, resolving the loader's entry point and
    /// preparing its root call context with zero arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the entry point's generator cannot be resolved or
    /// fails to emit.
    pub fn new(
        loader: DynLoader,
        settings: DynMachineSettings,
        config: Config,
        watchdog: DynWatchdog,
    ) -> execution::Result<Self> {
        let entry_name = loader.entry_point();
        let entry = ContextId::new(0);
        let mut machine = Self {
            loader,
            settings,
            config,
            watchdog,
            contexts: Vec::new(),
            blocks: Vec::new(),
            instances: Vec::new(),
            batch_cache: HashMap::new(),
            shared_instances: HashMap::new(),
            initialized_types: HashSet::new(),
            current: Some(entry),
            entry,
            return_register: None,
            steps: 0,
        };

        let batch = machine.batch_for(&entry_name, 0)?;
        machine.contexts.push(CallContext::new(
            entry,
            entry_name,
            None,
            None,
            batch,
            Arguments::empty(),
            false,
            0,
        ));

        Ok(machine)
    }

    /// Performs the abstract execution of the entire program.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] on the first fatal condition: an unresolved call
    /// target or static initializer, a misused variable or argument slot, a
    /// native fault, an exhausted step or depth budget, or a watchdog stop.
    /// There is no retry or partial recovery; recovery, if any, is the
    /// host's responsibility.
    pub fn execute(&mut self) -> execution::Result<()> {
        self.settings.before_interpretation();
        let outcome = self.run_loop();
        self.settings.after_interpretation();

        outcome
    }

    /// Performs [`Self::execute`] and freezes the machine into its final
    /// [`AnalyzingResult`].
    ///
    /// # Errors
    ///
    /// Returns [`Err`] under the same conditions as [`Self::execute`]; no
    /// result is produced for a failed run.
    pub fn run(mut self) -> crate::error::Result<AnalyzingResult> {
        self.execute()?;

        Ok(self.consume())
    }

    /// Consumes the machine to freeze the data it recorded into an
    /// [`AnalyzingResult`].
    #[must_use]
    pub fn consume(self) -> AnalyzingResult {
        AnalyzingResult::new(
            self.contexts,
            self.blocks,
            self.instances,
            self.entry,
            self.return_register,
        )
    }

    /// Gets a reference to the machine's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks if the machine has run out of instructions to execute.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// The fetch/execute loop.
    fn run_loop(&mut self) -> execution::Result<()> {
        let poll_interval = self.watchdog.poll_every().max(1);

        while let Some(context_id) = self.current {
            let pc = self.contexts[context_id.index()].program_counter();

            if self.steps % poll_interval == 0 && self.watchdog.should_stop() {
                return Err(Error::StoppedByWatchdog.locate(pc));
            }
            if self.steps >= self.config.step_limit {
                return Err(Error::StepLimitExceeded {
                    limit: self.config.step_limit,
                }
                .locate(pc));
            }
            self.steps += 1;

            let Some(instruction) = self.contexts[context_id.index()].next_instruction().cloned()
            else {
                // Running off the end of a batch is an implicit return.
                self.pop_context(context_id, None);
                continue;
            };

            self.execute_instruction(context_id, pc, instruction)?;
        }

        Ok(())
    }

    /// Executes one `instruction` within the context addressed by
    /// `context_id`.
    fn execute_instruction(
        &mut self,
        context_id: ContextId,
        pc: u32,
        instruction: Instruction,
    ) -> execution::Result<()> {
        let block = self.ensure_block(context_id, pc);

        match instruction {
            Instruction::AssignLiteral { target, value } => {
                let info = self.settings.literal_info(&value);
                let instance = self.create_instance(info, Some(block));
                self.blocks[block.index()].record_affected(instance, None);
                self.bind(context_id, target, instance);
                self.contexts[context_id.index()].step();
            }
            Instruction::Assign { target, source } => {
                let instance = self.variable(context_id, &source, pc)?;
                self.bind(context_id, target, instance);
                self.contexts[context_id.index()].step();
            }
            Instruction::AssignArgument { target, slot } => {
                let instance =
                    self.contexts[context_id.index()].arguments().slot(slot).locate(pc)?;
                self.bind(context_id, target, instance);
                self.contexts[context_id.index()].step();
            }
            Instruction::AssignReturnValue { target } => {
                let instance = self.return_register.ok_or(Error::NoReturnValue.locate(pc))?;
                self.bind(context_id, target, instance);
                self.contexts[context_id.index()].step();
            }
            Instruction::Call(call) => self.execute_call(context_id, pc, block, call)?,
            Instruction::Return { value } => {
                let value = match value {
                    Some(name) => Some(self.variable(context_id, &name, pc)?),
                    None => None,
                };
                self.pop_context(context_id, value);
            }
            Instruction::Jump { target } => {
                let offset = target.offset().ok_or(Error::UnresolvedJumpTarget.locate(pc))?;
                self.jump(context_id, offset, pc)?;
            }
            Instruction::ConditionalJump { condition, target } => {
                let instance = self.variable(context_id, &condition, pc)?;
                let offset = target.offset().ok_or(Error::UnresolvedJumpTarget.locate(pc))?;
                if self.settings.is_true(&self.instances[instance.index()]) {
                    self.jump(context_id, offset, pc)?;
                } else {
                    self.contexts[context_id.index()].step();
                }
            }
            Instruction::DirectInvoke { function } => {
                let mut direct = DirectContext {
                    machine: self,
                    context: context_id,
                    block,
                    location: pc,
                };
                function.invoke(&mut direct)?;
                self.contexts[context_id.index()].step();
            }
            Instruction::Nop => {
                self.contexts[context_id.index()].step();
            }
        }

        Ok(())
    }

    /// Dispatches a call: resolves the callee, binds its arguments and
    /// pushes its context, leaving the caller parked just past the call
    /// site.
    fn execute_call(
        &mut self,
        context_id: ContextId,
        pc: u32,
        block: BlockId,
        call: CallInstruction,
    ) -> execution::Result<()> {
        let CallInstruction {
            method,
            receiver,
            arguments,
            type_arguments,
            provider,
        } = call;

        let mut argument_instances = Vec::with_capacity(arguments.len());
        for name in &arguments {
            argument_instances.push(self.variable(context_id, name, pc)?);
        }

        let (receiver_instance, yields_receiver) = match method.kind() {
            MethodKind::Constructor => {
                let instance = self.create_instance(method.declaring_type().clone(), Some(block));
                (instance, true)
            }
            MethodKind::Instance => {
                let name = receiver.ok_or_else(|| {
                    Error::MissingReceiver {
                        method: method.name().into(),
                    }
                    .locate(pc)
                })?;
                (self.variable(context_id, &name, pc)?, false)
            }
            MethodKind::Static => (self.shared_instance(method.declaring_type()), false),
        };

        {
            let caller_block = &mut self.blocks[block.index()];
            caller_block.record_affected(receiver_instance, provider.clone());
            for argument in &argument_instances {
                caller_block.record_affected(*argument, provider.clone());
            }
        }

        // Dynamic resolving substitutes the runtime type of the receiver
        // into slot 0 of the static argument info.
        let receiver_info = if method.needs_dynamic_resolve() {
            self.instances[receiver_instance.index()].info().clone()
        } else {
            method.declaring_type().clone()
        };
        let mut argument_info = Vec::with_capacity(argument_instances.len() + 1);
        argument_info.push(receiver_info);
        for argument in &argument_instances {
            argument_info.push(self.instances[argument.index()].info().clone());
        }

        let name = self.loader.resolve_call_name(&method, &argument_info).ok_or_else(|| {
            Error::UnresolvedCallTarget {
                method: method.name().into(),
            }
            .locate(pc)
        })?;

        let depth = self.contexts[context_id.index()].depth() + 1;
        if depth > self.config.max_call_depth {
            return Err(Error::CallDepthExceeded {
                limit: self.config.max_call_depth,
            }
            .locate(pc));
        }

        let batch = self.batch_for(&name, pc)?;

        let mut callee_arguments = Arguments::new(argument_instances.len() + 1);
        callee_arguments
            .initialize(receiver_instance, &argument_instances, type_arguments)
            .locate(pc)?;

        self.contexts[context_id.index()].step();

        let callee_id = ContextId::new(self.contexts.len());
        self.contexts.push(CallContext::new(
            callee_id,
            name,
            Some(context_id),
            Some(block),
            batch,
            callee_arguments,
            yields_receiver,
            depth,
        ));
        self.current = Some(callee_id);

        // The type's static initializer runs before the callee itself.
        if matches!(method.kind(), MethodKind::Static | MethodKind::Constructor) {
            self.push_static_initializer(method.declaring_type().clone(), callee_id, depth, pc)?;
        }

        Ok(())
    }

    /// Pushes the static initializer of `type_info` as the context to run
    /// next, the first time the type is touched.
    ///
    /// The initializer has no call site of its own, so its context carries
    /// no call block and its blocks sit outside the ordering of the
    /// surrounding execution.
    fn push_static_initializer(
        &mut self,
        type_info: TypeInfo,
        parent: ContextId,
        depth: usize,
        pc: u32,
    ) -> execution::Result<()> {
        if !self.initialized_types.insert(type_info.name().to_string()) {
            return Ok(());
        }
        let Some(init_name) = self.loader.resolve_static_initializer(&type_info) else {
            return Ok(());
        };
        if self.loader.generator(&init_name).is_none() {
            return Err(Error::UnresolvedStaticInitializer {
                type_name: type_info.name().into(),
            }
            .locate(pc));
        }

        let batch = self.batch_for(&init_name, pc)?;
        let receiver = self.shared_instance(&type_info);
        let mut arguments = Arguments::new(1);
        arguments.initialize(receiver, &[], vec![]).locate(pc)?;

        let init_id = ContextId::new(self.contexts.len());
        self.contexts.push(CallContext::new(
            init_id,
            init_name,
            Some(parent),
            None,
            batch,
            arguments,
            false,
            depth + 1,
        ));
        self.current = Some(init_id);

        Ok(())
    }

    /// Pops the context addressed by `context_id`, publishing its return
    /// value — the constructed receiver for constructor contexts — and
    /// resuming the caller immediately after the call site.
    fn pop_context(&mut self, context_id: ContextId, explicit: Option<InstanceId>) {
        let context = &self.contexts[context_id.index()];
        self.return_register = if context.yields_receiver() {
            context.arguments().receiver()
        } else {
            explicit
        };
        self.current = context.caller();
    }

    /// Moves the program counter of the context addressed by `context_id`
    /// to `offset`, validating bounds.
    ///
    /// An offset just past the last instruction is permitted; jumping there
    /// ends the context.
    fn jump(&mut self, context_id: ContextId, offset: u32, pc: u32) -> execution::Result<()> {
        let available = self.contexts[context_id.index()].batch().len();
        if offset as usize > available {
            return Err(Error::JumpOutOfBounds {
                requested: offset,
                available,
            }
            .locate(pc));
        }
        self.contexts[context_id.index()].jump_to(offset);

        Ok(())
    }

    /// Gets the block recording the instruction at `pc`, extending the
    /// newest block of the context when the instruction continues the same
    /// info, and appending a fresh block otherwise.
    fn ensure_block(&mut self, context_id: ContextId, pc: u32) -> BlockId {
        let (info_index, shift_provider, last) = {
            let context = &self.contexts[context_id.index()];
            let batch = context.batch();
            (
                batch.info_index(pc),
                batch.info(pc).block_provider().cloned(),
                context.last_block(),
            )
        };

        if let Some(last) = last {
            let newest = &mut self.blocks[last.index()];
            if newest.info_index() == info_index && newest.instructions().end == pc {
                newest.extend_to(pc);
                return last;
            }
        }

        let id = BlockId::new(self.blocks.len());
        let mut block = ExecutedBlock::new(context_id, info_index, pc);
        if let Some(provider) = shift_provider {
            block
                .set_shift_provider(provider)
                .expect("A freshly created block cannot carry a provider");
        }
        if let Some(last) = last {
            self.blocks[last.index()].set_next(id);
            block.set_previous(last);
        }
        self.blocks.push(block);
        self.contexts[context_id.index()].push_block(id);

        id
    }

    /// Allocates a new instance of the type described by `info`.
    fn create_instance(&mut self, info: TypeInfo, creation_block: Option<BlockId>) -> InstanceId {
        let id = InstanceId::new(self.instances.len());
        let synthetic = format!("{}{}", crate::constant::SYNTHETIC_ID_PREFIX, id.index());
        self.instances.push(Instance::new(info, synthetic, creation_block));

        id
    }

    /// Gets the per-type shared instance for `type_info`, creating it on
    /// first use.
    fn shared_instance(&mut self, type_info: &TypeInfo) -> InstanceId {
        if let Some(id) = self.shared_instances.get(type_info.name()) {
            return *id;
        }
        let info = self.settings.shared_instance_info(type_info.name());
        let id = self.create_instance(info, None);
        self.shared_instances.insert(type_info.name().to_string(), id);

        id
    }

    /// Binds `name` to `instance` in the frame of `context_id`, offering
    /// the variable name as an identifier hint to the instance.
    ///
    /// The reserved receiver name is never offered as a hint.
    fn bind(&mut self, context_id: ContextId, name: VariableName, instance: InstanceId) {
        if name.name() != RECEIVER_NAME {
            self.instances[instance.index()].hint_id(name.name());
        }
        self.contexts[context_id.index()].set_variable(name, instance);
    }

    /// Reads the instance bound to `name` in the frame of `context_id`.
    fn variable(
        &self,
        context_id: ContextId,
        name: &VariableName,
        pc: u32,
    ) -> execution::Result<InstanceId> {
        self.contexts[context_id.index()].variable(name).ok_or_else(|| {
            Error::UndefinedVariable {
                name: name.name().into(),
            }
            .locate(pc)
        })
    }

    /// Gets the frozen batch for the generator called `name`, emitting and
    /// caching it on first use.
    fn batch_for(
        &mut self,
        name: &VersionedName,
        pc: u32,
    ) -> execution::Result<Rc<InstructionBatch>> {
        if let Some(batch) = self.batch_cache.get(name) {
            return Ok(batch.clone());
        }

        let generator = self.loader.generator(name).ok_or_else(|| {
            Error::UnresolvedGenerator {
                name:    name.name().into(),
                version: name.version(),
            }
            .locate(pc)
        })?;

        let mut emitter = InstructionEmitter::new();
        generator.emit(&mut emitter).map_err(|source| {
            Error::GeneratorEmission {
                name: name.to_string(),
                source,
            }
            .locate(pc)
        })?;
        let batch = emitter.emitted_instructions().map_err(|source| {
            Error::GeneratorEmission {
                name: name.to_string(),
                source,
            }
            .locate(pc)
        })?;

        let batch = Rc::new(batch);
        self.batch_cache.insert(name.clone(), batch.clone());

        Ok(batch)
    }
}

/// The configuration for the machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of instructions executed in one run.
    ///
    /// This bounds execution when the host's predicate resolution never
    /// breaks a jump cycle.
    ///
    /// Defaults to [`DEFAULT_STEP_LIMIT`].
    pub step_limit: usize,

    /// The maximum depth of the call-context stack.
    ///
    /// Defaults to [`DEFAULT_MAX_CALL_DEPTH`].
    pub max_call_depth: usize,
}

impl Config {
    /// Sets the `step_limit` config parameter to `value`.
    #[must_use]
    pub fn with_step_limit(mut self, value: usize) -> Self {
        self.step_limit = value;
        self
    }

    /// Sets the `max_call_depth` config parameter to `value`.
    #[must_use]
    pub fn with_max_call_depth(mut self, value: usize) -> Self {
        self.max_call_depth = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let step_limit = DEFAULT_STEP_LIMIT;
        let max_call_depth = DEFAULT_MAX_CALL_DEPTH;
        Self {
            step_limit,
            max_call_depth,
        }
    }
}

/// The scoped facade through which a native delegate reads and mutates the
/// state of the machine during a direct invocation.
///
/// A direct invocation runs against the *current* context: no call context
/// is pushed, and everything the delegate touches is recorded into the
/// executed block of the invoking instruction.
#[derive(Debug)]
pub struct DirectContext<'a> {
    machine:  &'a mut Machine,
    context:  ContextId,
    block:    BlockId,
    location: u32,
}

impl DirectContext<'_> {
    /// Gets the offset of the invoking instruction, for locating errors.
    #[must_use]
    pub fn location(&self) -> u32 {
        self.location
    }

    /// Gets the instance bound to `name` in the invoking frame.
    #[must_use]
    pub fn variable(&self, name: &VariableName) -> Option<InstanceId> {
        self.machine.contexts[self.context.index()].variable(name)
    }

    /// Binds `name` to `instance` in the invoking frame, offering the name
    /// as an identifier hint.
    pub fn set_variable(&mut self, name: VariableName, instance: InstanceId) {
        self.machine.bind(self.context, name, instance);
    }

    /// Gets the instance bound into argument slot `slot` of the invoking
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if no slot exists at `slot`.
    pub fn argument(&self, slot: usize) -> execution::Result<InstanceId> {
        self.machine.contexts[self.context.index()]
            .arguments()
            .slot(slot)
            .locate(self.location)
    }

    /// Gets the receiver of the invoking frame, if it has one.
    #[must_use]
    pub fn receiver(&self) -> Option<InstanceId> {
        self.machine.contexts[self.context.index()].arguments().receiver()
    }

    /// Gets the instance addressed by `id`.
    #[must_use]
    pub fn instance(&self, id: InstanceId) -> &Instance {
        &self.machine.instances[id.index()]
    }

    /// Gets the instance addressed by `id` for mutation, such as recording
    /// edits.
    #[must_use]
    pub fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.machine.instances[id.index()]
    }

    /// Allocates a new instance of the type described by `info`, created by
    /// the invoking instruction's block.
    pub fn create_instance(&mut self, info: TypeInfo) -> InstanceId {
        let id = self.machine.create_instance(info, Some(self.block));
        self.machine.blocks[self.block.index()].record_affected(id, None);

        id
    }

    /// Records that the delegate touched `id` in a way the machine cannot
    /// model precisely: the instance is marked dirty and the invoking block
    /// records the effect without a removal provider.
    pub fn mark_dirty(&mut self, id: InstanceId) {
        self.machine.instances[id.index()].mark_dirty();
        self.machine.blocks[self.block.index()].record_affected(id, None);
    }

    /// Publishes `value` as the value of the invoking call, readable by a
    /// following return-value assignment.
    pub fn set_return_value(&mut self, value: Option<InstanceId>) {
        self.machine.return_register = value;
    }

    /// Gets the host settings of the machine.
    #[must_use]
    pub fn settings(&self) -> &DynMachineSettings {
        &self.machine.settings
    }
}
