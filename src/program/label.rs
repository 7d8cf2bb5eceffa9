//! This module contains the definition of the [`Label`] type, the named jump
//! targets used while a program is being emitted.

use std::{cell::Cell, rc::Rc};

use crate::error::emission::{Error, Result};

/// A named jump target within an instruction batch being emitted.
///
/// A label starts out unresolved and is fixed to an instruction offset by
/// [`Self::set_offset`] exactly once. Jumps referencing a label can be
/// emitted before or after the label is set, but every referenced label must
/// be set by the time the batch is frozen.
///
/// Labels are cheap to clone; all clones share the same resolution state.
#[derive(Clone, Debug)]
pub struct Label {
    /// The name of the label, used in diagnostics and rendering.
    name: Rc<str>,

    /// The offset of the labelled instruction, shared between all clones of
    /// the label.
    offset: Rc<Cell<Option<u32>>>,
}

impl Label {
    /// Constructs a new, unresolved label called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name: String = name.into();
        let offset = Rc::new(Cell::new(None));
        Self {
            name: Rc::from(name),
            offset,
        }
    }

    /// Gets the name of the label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixes the label to the instruction at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the label has already been set. A label resolves
    /// exactly once.
    pub fn set_offset(&self, offset: u32) -> Result<()> {
        if self.offset.get().is_some() {
            return Err(Error::LabelAlreadySet {
                name: self.name.to_string(),
            });
        }
        self.offset.set(Some(offset));

        Ok(())
    }

    /// Gets the offset the label resolves to, if it has been set.
    #[must_use]
    pub fn offset(&self) -> Option<u32> {
        self.offset.get()
    }

    /// Checks whether the label has been resolved to an offset.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.offset.get().is_some()
    }

    /// Checks whether `self` and `other` are clones of the same label.
    #[must_use]
    pub fn is_same(&self, other: &Label) -> bool {
        Rc::ptr_eq(&self.offset, &other.offset)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod test {
    use crate::{error::emission::Error, program::Label};

    #[test]
    fn starts_unresolved() {
        let label = Label::new("end");
        assert!(!label.is_set());
        assert_eq!(label.offset(), None);
    }

    #[test]
    fn resolves_once() -> anyhow::Result<()> {
        let label = Label::new("end");
        label.set_offset(3)?;
        assert_eq!(label.offset(), Some(3));

        Ok(())
    }

    #[test]
    fn clones_share_resolution() -> anyhow::Result<()> {
        let label = Label::new("loop");
        let alias = label.clone();
        label.set_offset(7)?;

        assert_eq!(alias.offset(), Some(7));
        assert!(alias.is_same(&label));

        Ok(())
    }

    #[test]
    fn rejects_double_resolution() -> anyhow::Result<()> {
        let label = Label::new("end");
        label.set_offset(1)?;
        let error = label.set_offset(2).expect_err("Label was set twice");

        assert_eq!(
            error,
            Error::LabelAlreadySet {
                name: "end".into()
            }
        );

        Ok(())
    }
}
