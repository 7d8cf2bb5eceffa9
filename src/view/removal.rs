//! This module contains the instance-removal walk of the
//! [`ExecutionView`]: the inference that decides whether every effect of an
//! instance can be removed from the source, and the application of those
//! removals in execution order.

use crate::{
    error::transform::{Error, Result},
    machine::result::InstanceId,
    view::ExecutionView,
};

impl ExecutionView {
    /// Checks whether `instance` could be removed from the source through
    /// this view, without mutating anything.
    ///
    /// The walk starts at the instance's creation block and follows this
    /// view's successor links; it succeeds only if at least one removal
    /// provider is found and no block affecting the instance is missing
    /// one.
    #[must_use]
    pub fn can_remove(&self, instance: InstanceId) -> bool {
        let Some(start) = self.result().instance(instance).creation_block() else {
            return false;
        };

        let mut found = false;
        let mut budget = self.block_budget();
        let mut cursor = Some(start);
        while let Some(block) = cursor {
            if let Some(executed) = self.result().block(block) {
                match executed.remove_providers(instance) {
                    Some(providers) => found = found || !providers.is_empty(),
                    None => return false,
                }
            }
            if budget == 0 {
                break;
            }
            budget -= 1;
            cursor = self.next_block(block);
        }

        found
    }

    /// Removes every effect of `instance` from the source through this
    /// view.
    ///
    /// The walk starts at the instance's creation block and follows this
    /// view's successor links, collecting the removal providers of every
    /// block affecting the instance. If any such block is missing a
    /// provider, the view is aborted with a message naming the gap and _no_
    /// transformation is applied. Otherwise every provider's removal
    /// transformation is applied in block order.
    ///
    /// Returns whether the removal was applied. On a view that is already
    /// aborted this is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the view has been committed.
    pub fn remove_instance(&mut self, instance: InstanceId) -> Result<bool> {
        if self.is_aborted() {
            return Ok(false);
        }
        if self.is_committed() {
            return Err(Error::MutatedAfterCommit);
        }

        let result = self.result().clone();
        let target = result.instance(instance);
        let Some(start) = target.creation_block() else {
            return Ok(false);
        };

        let mut providers = Vec::new();
        let mut budget = self.block_budget();
        let mut cursor = Some(start);
        while let Some(block) = cursor {
            if let Some(executed) = result.block(block) {
                match executed.remove_providers(instance) {
                    Some(found) => providers.extend(found),
                    None => {
                        self.abort(format!(
                            "Cannot remove instance `{}`: block {block} exposes no \
                             RemoveProvider for it",
                            target.id(),
                        ))?;
                        return Ok(false);
                    }
                }
            }
            if budget == 0 {
                break;
            }
            budget -= 1;
            cursor = self.next_block(block);
        }

        if providers.is_empty() {
            return Ok(false);
        }
        for provider in providers {
            self.apply(provider.remove())?;
        }

        Ok(!self.is_aborted())
    }
}
