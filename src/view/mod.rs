//! This module contains the [`ExecutionView`], the speculative transaction
//! through which edits are applied against a fixed [`AnalyzingResult`].
//!
//! A view is the only place where the block structure of an analysis ever
//! appears to change. Structural edits — reordering blocks, inserting calls
//! — are recorded as per-view `next`/`previous` overrides keyed by block
//! handle, leaving the shared result untouched. This is what makes
//! [`ExecutionView::clone_view`] cheap and safe: clones share the immutable
//! result and diverge only in their override maps and view-local data, so
//! multiple candidate edits can be explored from a common point before one
//! of them is committed.

pub mod ordering;
pub mod removal;

use std::{
    any::Any,
    cell::Cell,
    collections::HashMap,
    rc::Rc,
};

use crate::{
    error::transform::{Error, Result},
    machine::result::{AnalyzingResult, BlockId, ContextId},
    transform::{CallDescription, DynBlockTransformProvider, DynTransformation},
};

/// A block that exists only within one view, created by speculative call
/// insertion.
#[derive(Clone, Debug)]
struct SyntheticBlock {
    /// The context the inserted call would execute in.
    context: ContextId,

    /// The call the block stands for.
    call: CallDescription,
}

/// One speculative, abortable transaction over a fixed analysis result.
///
/// # Life Cycle
///
/// A view is *open* until it is either aborted or committed, and reaching
/// either terminal state is permanent. Transformations applied to an aborted
/// view are silently dropped rather than raised, so composed edit-generation
/// code can keep issuing edits without checking for aborts at every call.
/// Mutating a committed view is a contract violation.
///
/// Within one lineage of [`Self::clone_view`] clones, at most one view may
/// ever commit.
pub struct ExecutionView {
    /// The analysis result the view speculates over. Shared, never mutated.
    result: Rc<AnalyzingResult>,

    /// Per-view successor overrides, consulted before the shared links.
    next_overrides: HashMap<BlockId, Option<BlockId>>,

    /// Per-view predecessor overrides, consulted before the shared links.
    previous_overrides: HashMap<BlockId, Option<BlockId>>,

    /// Blocks that exist only in this view, addressed past the end of the
    /// shared block arena.
    synthetic: Vec<SyntheticBlock>,

    /// Every transformation applied through this view, in application
    /// order.
    applied: Vec<DynTransformation>,

    /// The message the view was aborted with, if it was.
    abort_message: Option<String>,

    /// Whether the view has been committed.
    committed: bool,

    /// Whether any view of this clone lineage has been committed.
    lineage_committed: Rc<Cell<bool>>,

    /// Arbitrary keyed data accumulated by transformations.
    view_data: HashMap<String, Rc<dyn Any>>,
}

impl ExecutionView {
    /// Constructs a new, open view over the provided analysis `result`.
    #[must_use]
    pub fn new(result: Rc<AnalyzingResult>) -> Self {
        Self {
            result,
            next_overrides: HashMap::new(),
            previous_overrides: HashMap::new(),
            synthetic: Vec::new(),
            applied: Vec::new(),
            abort_message: None,
            committed: false,
            lineage_committed: Rc::new(Cell::new(false)),
            view_data: HashMap::new(),
        }
    }

    /// Gets the analysis result the view speculates over.
    #[must_use]
    pub fn result(&self) -> &Rc<AnalyzingResult> {
        &self.result
    }

    /// Checks whether the view is still open for edits.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_aborted() && !self.committed
    }

    /// Checks whether the view has been aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort_message.is_some()
    }

    /// Checks whether the view has been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Gets the message the view was aborted with, if it was.
    #[must_use]
    pub fn abort_message(&self) -> Option<&str> {
        self.abort_message.as_deref()
    }

    /// Abandons the view with a `message` describing why.
    ///
    /// After aborting, [`Self::apply`] and the structural edit methods
    /// become no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has already been aborted or committed;
    /// aborting is valid exactly once, from the open state.
    pub fn abort(&mut self, message: impl Into<String>) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::AbortedTwice);
        }
        if self.committed {
            return Err(Error::MutatedAfterCommit);
        }
        self.abort_message = Some(message.into());

        Ok(())
    }

    /// Accepts the edits accumulated by this view.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been aborted, has already been
    /// committed, or if another view of its clone lineage has committed.
    pub fn commit(&mut self) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::CommitAfterAbort);
        }
        if self.committed {
            return Err(Error::CommittedTwice);
        }
        if self.lineage_committed.get() {
            return Err(Error::LineageAlreadyCommitted);
        }
        self.committed = true;
        self.lineage_committed.set(true);

        Ok(())
    }

    /// Records and invokes `transformation` against this view.
    ///
    /// On an aborted view the transformation is silently dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed, or if the
    /// transformation itself violates the editing protocol.
    pub fn apply(&mut self, transformation: DynTransformation) -> Result<()> {
        if self.is_aborted() {
            return Ok(());
        }
        if self.committed {
            return Err(Error::MutatedAfterCommit);
        }
        self.applied.push(transformation.clone());
        transformation.apply(self)
    }

    /// Gets every transformation applied through this view, in application
    /// order.
    #[must_use]
    pub fn applied_transformations(&self) -> &[DynTransformation] {
        &self.applied
    }

    /// Produces an independent, open view sharing this view's analysis
    /// result and carrying copies of its overrides, synthetic blocks, view
    /// data and applied transformations.
    ///
    /// Clones belong to the same lineage as their source: only one view of
    /// the lineage may ever commit.
    #[must_use]
    pub fn clone_view(&self) -> Self {
        Self {
            result: self.result.clone(),
            next_overrides: self.next_overrides.clone(),
            previous_overrides: self.previous_overrides.clone(),
            synthetic: self.synthetic.clone(),
            applied: self.applied.clone(),
            abort_message: None,
            committed: false,
            lineage_committed: self.lineage_committed.clone(),
            view_data: self.view_data.clone(),
        }
    }

    /// Stores `value` under `key` in the view-local data.
    ///
    /// Transformations use this to accumulate information across recursive
    /// applications without touching the shared result.
    pub fn set_data(&mut self, key: impl Into<String>, value: Rc<dyn Any>) {
        self.view_data.insert(key.into(), value);
    }

    /// Gets the view-local data stored under `key`, if it exists and is of
    /// type `T`.
    #[must_use]
    pub fn data<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        self.view_data.get(key).cloned().and_then(|value| value.downcast::<T>().ok())
    }

    /// Gets the block executed after `block`, as this view sees it.
    ///
    /// The view's overrides take precedence over the shared links of the
    /// analysis result.
    #[must_use]
    pub fn next_block(&self, block: BlockId) -> Option<BlockId> {
        if let Some(overridden) = self.next_overrides.get(&block) {
            return *overridden;
        }
        self.result.block(block).and_then(crate::machine::block::ExecutedBlock::next)
    }

    /// Gets the block executed before `block`, as this view sees it.
    ///
    /// The view's overrides take precedence over the shared links of the
    /// analysis result.
    #[must_use]
    pub fn previous_block(&self, block: BlockId) -> Option<BlockId> {
        if let Some(overridden) = self.previous_overrides.get(&block) {
            return *overridden;
        }
        self.result.block(block).and_then(crate::machine::block::ExecutedBlock::previous)
    }

    /// Gets the context within which `block` executed, for shared and
    /// view-local blocks alike.
    ///
    /// # Panics
    ///
    /// Panics if `block` addresses neither the shared arena nor this view's
    /// synthetic blocks. Handles are only produced by the engine, so this is
    /// a programmer bug.
    #[must_use]
    pub fn block_context(&self, block: BlockId) -> ContextId {
        if let Some(executed) = self.result.block(block) {
            return executed.context();
        }
        self.synthetic[block.index() - self.result.blocks().len()].context
    }

    /// Checks whether `block` exists only within this view.
    #[must_use]
    pub fn is_synthetic(&self, block: BlockId) -> bool {
        self.result.block(block).is_none()
    }

    /// Gets the call description a view-local `block` stands for, if the
    /// handle addresses one.
    #[must_use]
    pub fn synthetic_call(&self, block: BlockId) -> Option<&CallDescription> {
        let index = block.index().checked_sub(self.result.blocks().len())?;
        self.synthetic.get(index).map(|synthetic| &synthetic.call)
    }

    /// Moves `block` to the position immediately after `pivot`, in this
    /// view only.
    ///
    /// The textual move is requested from the block's shifting provider and
    /// applied through this view; the structural reordering is recorded in
    /// the view's override maps.
    ///
    /// On an aborted view this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed, or if either block
    /// carries no shifting provider.
    pub fn shift_behind(&mut self, block: BlockId, pivot: BlockId) -> Result<()> {
        if !self.structural_gate()? || block == pivot {
            return Ok(());
        }
        let provider = self.require_block_provider(block)?;
        let pivot_provider = self.require_block_provider(pivot)?;

        self.apply(provider.shift_behind(pivot_provider.as_ref()))?;
        if self.is_aborted() {
            return Ok(());
        }

        self.unlink(block);
        self.link_after(pivot, block);

        Ok(())
    }

    /// Moves `block` to the position immediately before `pivot`, in this
    /// view only.
    ///
    /// On an aborted view this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed, or if either block
    /// carries no shifting provider.
    pub fn shift_before(&mut self, block: BlockId, pivot: BlockId) -> Result<()> {
        if !self.structural_gate()? || block == pivot {
            return Ok(());
        }
        let provider = self.require_block_provider(block)?;
        let pivot_provider = self.require_block_provider(pivot)?;

        self.apply(provider.shift_before(pivot_provider.as_ref()))?;
        if self.is_aborted() {
            return Ok(());
        }

        self.unlink(block);
        self.link_before(pivot, block);

        Ok(())
    }

    /// Inserts `call` immediately after `anchor`, in this view only.
    ///
    /// The textual insertion is requested from the anchor's provider and
    /// applied through this view; the inserted call is represented by a
    /// view-local block so that subsequent ordering queries observe it.
    ///
    /// Returns the handle of the view-local block, or [`None`] when the
    /// view is aborted and the edit was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed, or if `anchor`
    /// carries no provider.
    pub fn append_call(
        &mut self,
        anchor: BlockId,
        call: CallDescription,
    ) -> Result<Option<BlockId>> {
        if !self.structural_gate()? {
            return Ok(None);
        }
        let provider = self.require_block_provider(anchor)?;

        self.apply(provider.append_call(&call))?;
        if self.is_aborted() {
            return Ok(None);
        }

        let block = self.allocate_synthetic(self.block_context(anchor), call);
        self.link_after(anchor, block);

        Ok(Some(block))
    }

    /// Inserts `call` immediately before `anchor`, in this view only.
    ///
    /// Returns the handle of the view-local block, or [`None`] when the
    /// view is aborted and the edit was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed, or if `anchor`
    /// carries no provider.
    pub fn prepend_call(
        &mut self,
        anchor: BlockId,
        call: CallDescription,
    ) -> Result<Option<BlockId>> {
        if !self.structural_gate()? {
            return Ok(None);
        }
        let provider = self.require_block_provider(anchor)?;

        self.apply(provider.prepend_call(&call))?;
        if self.is_aborted() {
            return Ok(None);
        }

        let block = self.allocate_synthetic(self.block_context(anchor), call);
        self.link_before(anchor, block);

        Ok(Some(block))
    }

    /// Gets an upper bound on walk lengths through this view's block lists,
    /// as a guard against malformed override cycles.
    pub(crate) fn block_budget(&self) -> usize {
        self.result.blocks().len() + self.synthetic.len() + 1
    }

    /// Checks whether a structural edit may proceed: [`Ok`]`(false)` when
    /// the view is aborted and the edit must be swallowed.
    fn structural_gate(&self) -> Result<bool> {
        if self.is_aborted() {
            return Ok(false);
        }
        if self.committed {
            return Err(Error::MutatedAfterCommit);
        }

        Ok(true)
    }

    /// Gets the shifting provider of `block`, failing when it has none.
    fn require_block_provider(&self, block: BlockId) -> Result<DynBlockTransformProvider> {
        self.result
            .block(block)
            .and_then(|executed| executed.shift_provider().cloned())
            .ok_or(Error::MissingBlockProvider {
                block: block.index() as u32,
            })
    }

    /// Allocates a view-local block in `context` standing for `call`.
    fn allocate_synthetic(&mut self, context: ContextId, call: CallDescription) -> BlockId {
        let block = BlockId::new(self.result.blocks().len() + self.synthetic.len());
        self.synthetic.push(SyntheticBlock { context, call });

        block
    }

    /// Detaches `block` from its current position in this view's order.
    fn unlink(&mut self, block: BlockId) {
        let previous = self.previous_block(block);
        let next = self.next_block(block);
        if let Some(previous) = previous {
            self.next_overrides.insert(previous, next);
        }
        if let Some(next) = next {
            self.previous_overrides.insert(next, previous);
        }
        self.next_overrides.insert(block, None);
        self.previous_overrides.insert(block, None);
    }

    /// Inserts the detached `block` immediately after `pivot` in this
    /// view's order.
    fn link_after(&mut self, pivot: BlockId, block: BlockId) {
        let next = self.next_block(pivot);
        self.next_overrides.insert(pivot, Some(block));
        self.previous_overrides.insert(block, Some(pivot));
        self.next_overrides.insert(block, next);
        if let Some(next) = next {
            self.previous_overrides.insert(next, Some(block));
        }
    }

    /// Inserts the detached `block` immediately before `pivot` in this
    /// view's order.
    fn link_before(&mut self, pivot: BlockId, block: BlockId) {
        let previous = self.previous_block(pivot);
        if let Some(previous) = previous {
            self.next_overrides.insert(previous, Some(block));
        }
        self.previous_overrides.insert(block, previous);
        self.next_overrides.insert(block, Some(pivot));
        self.previous_overrides.insert(pivot, Some(block));
    }
}

/// The view data values are opaque, so the debug representation elides
/// them.
impl std::fmt::Debug for ExecutionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionView")
            .field("next_overrides", &self.next_overrides)
            .field("previous_overrides", &self.previous_overrides)
            .field("synthetic", &self.synthetic)
            .field("applied", &self.applied)
            .field("abort_message", &self.abort_message)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use crate::{
        error::transform::Error,
        transform::noop,
        view::{test::util::straight_line_result, ExecutionView},
    };

    #[test]
    fn aborting_records_the_message() -> anyhow::Result<()> {
        let mut view = ExecutionView::new(straight_line_result(2));
        view.abort("argument shapes do not line up")?;

        assert!(view.is_aborted());
        assert!(!view.is_open());
        assert_eq!(view.abort_message(), Some("argument shapes do not line up"));

        Ok(())
    }

    #[test]
    fn aborting_twice_is_a_contract_violation() -> anyhow::Result<()> {
        let mut view = ExecutionView::new(straight_line_result(2));
        view.abort("first")?;

        let error = view.abort("second").expect_err("Second abort succeeded");
        assert_eq!(error, Error::AbortedTwice);

        Ok(())
    }

    #[test]
    fn applies_are_swallowed_after_abort() -> anyhow::Result<()> {
        let mut view = ExecutionView::new(straight_line_result(2));
        view.abort("nothing to do")?;

        view.apply(noop())?;
        assert!(view.applied_transformations().is_empty());

        Ok(())
    }

    #[test]
    fn commit_after_abort_fails() -> anyhow::Result<()> {
        let mut view = ExecutionView::new(straight_line_result(2));
        view.abort("nothing to do")?;

        let error = view.commit().expect_err("Commit after abort succeeded");
        assert_eq!(error, Error::CommitAfterAbort);

        Ok(())
    }

    #[test]
    fn committing_twice_is_a_contract_violation() -> anyhow::Result<()> {
        let mut view = ExecutionView::new(straight_line_result(2));
        view.commit()?;

        let error = view.commit().expect_err("Second commit succeeded");
        assert_eq!(error, Error::CommittedTwice);

        Ok(())
    }

    #[test]
    fn only_one_clone_of_a_lineage_may_commit() -> anyhow::Result<()> {
        let view = ExecutionView::new(straight_line_result(2));
        let mut first = view.clone_view();
        let mut second = view.clone_view();

        first.commit()?;
        let error = second.commit().expect_err("Second lineage commit succeeded");
        assert_eq!(error, Error::LineageAlreadyCommitted);

        Ok(())
    }

    #[test]
    fn views_from_separate_lineages_commit_independently() -> anyhow::Result<()> {
        let result = straight_line_result(2);
        let mut first = ExecutionView::new(result.clone());
        let mut second = ExecutionView::new(result);

        first.commit()?;
        second.commit()?;

        Ok(())
    }

    #[test]
    fn view_data_is_keyed_and_typed() {
        let mut view = ExecutionView::new(straight_line_result(1));
        view.set_data("count", Rc::new(3usize));

        assert_eq!(view.data::<usize>("count").as_deref(), Some(&3));
        assert!(view.data::<String>("count").is_none());
        assert!(view.data::<usize>("missing").is_none());
    }

    #[test]
    fn cloned_views_do_not_share_view_data_keys() {
        let mut view = ExecutionView::new(straight_line_result(1));
        view.set_data("shared", Rc::new(1usize));

        let mut clone = view.clone_view();
        clone.set_data("shared", Rc::new(2usize));

        assert_eq!(view.data::<usize>("shared").as_deref(), Some(&1));
        assert_eq!(clone.data::<usize>("shared").as_deref(), Some(&2));
    }

    #[test]
    fn next_and_previous_follow_shared_links_without_overrides() {
        let result = straight_line_result(3);
        let view = ExecutionView::new(result.clone());
        let blocks: Vec<_> = result.blocks_of(result.entry_context_id()).collect();

        assert_eq!(view.next_block(blocks[0]), Some(blocks[1]));
        assert_eq!(view.previous_block(blocks[2]), Some(blocks[1]));
        assert_eq!(view.previous_block(blocks[0]), None);
        assert_eq!(view.next_block(blocks[2]), None);
    }

    /// Utilities for building hand-rolled analysis results for view tests.
    pub(super) mod util {
        use std::rc::Rc;

        use crate::{
            loader::VersionedName,
            machine::{
                block::ExecutedBlock,
                context::{Arguments, CallContext},
                result::{AnalyzingResult, BlockId, ContextId},
            },
            program::InstructionEmitter,
        };

        /// Builds a result with one context whose history list contains
        /// `blocks` chained blocks.
        pub fn straight_line_result(blocks: usize) -> Rc<AnalyzingResult> {
            let batch = Rc::new(
                InstructionEmitter::new()
                    .emitted_instructions()
                    .expect("An empty batch failed to freeze"),
            );
            let entry = ContextId::new(0);
            let mut context = CallContext::new(
                entry,
                VersionedName::new("entry", 0),
                None,
                None,
                batch,
                Arguments::empty(),
                false,
                0,
            );

            let mut arena: Vec<ExecutedBlock> = Vec::new();
            for index in 0..blocks {
                let id = BlockId::new(index);
                let mut block = ExecutedBlock::new(entry, index as u32, index as u32);
                if index > 0 {
                    block.set_previous(BlockId::new(index - 1));
                    arena[index - 1].set_next(id);
                }
                arena.push(block);
                context.push_block(id);
            }

            Rc::new(AnalyzingResult::new(
                vec![context],
                arena,
                vec![],
                entry,
                None,
            ))
        }
    }
}
