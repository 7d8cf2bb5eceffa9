//! This module contains the [`Transformation`] abstraction and the provider
//! traits through which the engine reaches the external text-editing layer.
//!
//! The engine never touches raw source text. It decides _when_, _whether_,
//! and _in what order_ edits happen; the providers — implemented by the
//! external editing layer and attached to instructions at emission time —
//! produce the opaque [`Transformation`] values that describe the edits
//! themselves.

use std::{fmt::Debug, rc::Rc};

use downcast_rs::{impl_downcast, Downcast};
use itertools::Itertools;

use crate::{error::transform, view::ExecutionView};

/// An abstract unit of change applied against exactly one [`ExecutionView`]
/// at a time.
///
/// A transformation may recursively apply further transformations through
/// the view it is given.
///
/// # Self Bounds
///
/// The bounds on `Self` are required for the following reasons:
///
/// - [`Downcast`] allows the consumer of a committed view to recover the
///   concrete transformations it accumulated.
/// - [`Debug`] to provide representations to aid in debugging.
pub trait Transformation
where
    Self: Debug + Downcast,
{
    /// Applies the transformation against the provided `view`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if applying violates the editing protocol, such as by
    /// mutating a committed view.
    fn apply(&self, view: &mut ExecutionView) -> transform::Result<()>;

    /// Checks whether the transformation describes no change at all.
    ///
    /// Empty transformations are never stored in edit logs.
    fn is_empty(&self) -> bool {
        false
    }
}

impl_downcast!(Transformation);

/// A dynamically dispatched [`Transformation`].
pub type DynTransformation = Rc<dyn Transformation>;

/// The transformation that describes no change.
///
/// Providers hand this out where a requested edit has no textual effect, so
/// generator code can request a transform unconditionally.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoOpTransformation;

impl Transformation for NoOpTransformation {
    fn apply(&self, _view: &mut ExecutionView) -> transform::Result<()> {
        Ok(())
    }

    fn is_empty(&self) -> bool {
        true
    }
}

/// Constructs the no-op transformation as a dynamically dispatched value.
#[must_use]
pub fn noop() -> DynTransformation {
    Rc::new(NoOpTransformation)
}

/// A description of a call that should be inserted next to an executed
/// block.
///
/// The description is purely nominal; resolving it against the host type
/// system is the responsibility of the editing layer that receives it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallDescription {
    method:    String,
    arguments: Vec<String>,
}

impl CallDescription {
    /// Constructs a description of a call to `method` with the given
    /// textual `arguments`.
    pub fn new(method: impl Into<String>, arguments: Vec<String>) -> Self {
        let method = method.into();
        Self { method, arguments }
    }

    /// Gets the name of the method to call.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Gets the textual arguments of the call.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

impl std::fmt::Display for CallDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.method, self.arguments.iter().join(", "))
    }
}

/// The base interface of every transform provider: something in the source
/// that can be removed.
pub trait TransformProvider
where
    Self: Debug,
{
    /// Gets the transformation that removes the provider's source element.
    #[must_use]
    fn remove(&self) -> DynTransformation;
}

/// A transform provider for one call site.
///
/// Attached to call instructions at emission time; consulted by the engine
/// when an edit must land on the call that an executed block recorded.
pub trait CallTransformProvider
where
    Self: TransformProvider,
{
    /// Gets the transformation that removes the argument at `index` from
    /// the call.
    #[must_use]
    fn remove_argument(&self, index: usize) -> DynTransformation;

    /// Gets the transformation that replaces the argument at `index` with
    /// the textual expression `source`.
    #[must_use]
    fn rewrite_argument(&self, index: usize, source: &str) -> DynTransformation;

    /// Gets the transformation that appends the textual expression `source`
    /// as a new last argument of the call.
    #[must_use]
    fn append_argument(&self, source: &str) -> DynTransformation;

    /// Checks whether the argument at `index` is optional at the call site.
    #[must_use]
    fn is_optional_argument(&self, index: usize) -> bool;

    /// Gets the transformation that makes the argument at `index` optional
    /// or required at the call site.
    #[must_use]
    fn set_optional_argument(&self, index: usize, optional: bool) -> DynTransformation;

    /// Gets the provider of the block containing the call site, if the
    /// editing layer exposes one.
    #[must_use]
    fn enclosing_block(&self) -> Option<Rc<dyn BlockTransformProvider>> {
        None
    }
}

/// A dynamically dispatched [`CallTransformProvider`].
pub type DynCallTransformProvider = Rc<dyn CallTransformProvider>;

/// A transform provider for one editable block of the source.
///
/// Attached to instruction infos at emission time; consulted by the engine
/// for reordering blocks and inserting calls next to them.
pub trait BlockTransformProvider
where
    Self: TransformProvider,
{
    /// Gets the transformation that moves this block in front of the block
    /// edited by `pivot`.
    #[must_use]
    fn shift_before(&self, pivot: &dyn BlockTransformProvider) -> DynTransformation;

    /// Gets the transformation that moves this block behind the block
    /// edited by `pivot`.
    #[must_use]
    fn shift_behind(&self, pivot: &dyn BlockTransformProvider) -> DynTransformation;

    /// Gets the transformation that inserts `call` immediately before this
    /// block.
    #[must_use]
    fn prepend_call(&self, call: &CallDescription) -> DynTransformation;

    /// Gets the transformation that inserts `call` immediately after this
    /// block.
    #[must_use]
    fn append_call(&self, call: &CallDescription) -> DynTransformation;

    /// Gets the provider of the block preceding this one in the source, if
    /// the editing layer exposes one.
    #[must_use]
    fn previous_sibling(&self) -> Option<Rc<dyn BlockTransformProvider>> {
        None
    }

    /// Gets the provider of the block following this one in the source, if
    /// the editing layer exposes one.
    #[must_use]
    fn next_sibling(&self) -> Option<Rc<dyn BlockTransformProvider>> {
        None
    }
}

/// A dynamically dispatched [`BlockTransformProvider`].
pub type DynBlockTransformProvider = Rc<dyn BlockTransformProvider>;

#[cfg(test)]
mod test {
    use crate::transform::{noop, CallDescription};

    #[test]
    fn noop_transformation_is_empty() {
        assert!(noop().is_empty());
    }

    #[test]
    fn call_descriptions_render_as_calls() {
        let call = CallDescription::new("configure", vec!["registry".into(), "0".into()]);
        assert_eq!(call.to_string(), "configure(registry, 0)");
    }
}
