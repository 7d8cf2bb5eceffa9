//! This module contains the ordering queries of the [`ExecutionView`]: the
//! discovery of the nearest shared call context of two blocks, the
//! execution-order comparison built on it, and the reductions that pick the
//! earliest or latest block of a collection.
//!
//! This ordering is what lets the engine decide the correct insertion point
//! for a generated edit relative to other execution-observed events,
//! independent of the lexical order of the source.

use std::collections::HashSet;

use crate::{
    machine::result::{BlockId, ContextId},
    view::ExecutionView,
};

impl ExecutionView {
    /// Finds the nearest call context shared by the call chains of `first`
    /// and `second`.
    ///
    /// The search climbs both chains alternately, registering every visited
    /// context, and returns on the first repeat. This handles blocks at
    /// different call depths in either direction.
    #[must_use]
    pub fn common_call(&self, first: BlockId, second: BlockId) -> ContextId {
        let mut visited = HashSet::new();
        let mut chain_a = Some(self.block_context(first));
        let mut chain_b = Some(self.block_context(second));

        loop {
            if let Some(context) = chain_a {
                if !visited.insert(context) {
                    return context;
                }
                chain_a = self.result().context(context).caller();
            }
            if let Some(context) = chain_b {
                if !visited.insert(context) {
                    return context;
                }
                chain_b = self.result().context(context).caller();
            }
            if chain_a.is_none() && chain_b.is_none() {
                // Both chains end at the entry context, so a repeat must
                // have occurred by now; this is a defensive fallback.
                return self.result().entry_context_id();
            }
        }
    }

    /// Checks whether `first` executed before `second`.
    ///
    /// Both blocks are projected into their nearest shared call context —
    /// each replaced by the block containing the call that led down to it —
    /// and the projected list is walked backward from `second`. A [`None`]
    /// `first` is treated as before everything.
    ///
    /// Blocks nested within the same projected block, such as a call-site
    /// block and the blocks of the call it made, compare as unordered.
    #[must_use]
    pub fn is_before(&self, first: Option<BlockId>, second: BlockId) -> bool {
        let Some(first) = first else {
            return true;
        };
        if first == second {
            return false;
        }

        let common = self.common_call(first, second);
        let Some(first_projected) = self.project(first, common) else {
            return false;
        };
        let Some(second_projected) = self.project(second, common) else {
            return false;
        };
        if first_projected == second_projected {
            return false;
        }

        let mut budget = self.block_budget();
        let mut cursor = self.previous_block(second_projected);
        while let Some(block) = cursor {
            if block == first_projected {
                return true;
            }
            if budget == 0 {
                break;
            }
            budget -= 1;
            cursor = self.previous_block(block);
        }

        false
    }

    /// Reduces `blocks` to the one that executed last under
    /// [`Self::is_before`].
    #[must_use]
    pub fn latest_block(&self, blocks: impl IntoIterator<Item = BlockId>) -> Option<BlockId> {
        let mut latest = None;
        for block in blocks {
            match latest {
                Some(current) if !self.is_before(Some(current), block) => {}
                _ => latest = Some(block),
            }
        }

        latest
    }

    /// Reduces `blocks` to the one that executed first under
    /// [`Self::is_before`].
    #[must_use]
    pub fn earliest_block(&self, blocks: impl IntoIterator<Item = BlockId>) -> Option<BlockId> {
        let mut earliest = None;
        for block in blocks {
            match earliest {
                Some(current) if !self.is_before(Some(block), current) => {}
                _ => earliest = Some(block),
            }
        }

        earliest
    }

    /// Replaces `block` by its ancestor within the call context `target`:
    /// the block is walked up through the call-site blocks of its context
    /// chain until one executing directly in `target` is reached.
    fn project(&self, block: BlockId, target: ContextId) -> Option<BlockId> {
        let mut current = block;
        loop {
            let context = self.block_context(current);
            if context == target {
                return Some(current);
            }
            current = self.result().context(context).call_block()?;
        }
    }
}
