//! This module contains the definition of the [`Instance`], the simulated
//! runtime object tracked by the machine, and of the [`Edit`] log entries an
//! instance accumulates.

use std::{collections::HashMap, rc::Rc};

use crate::{
    constant::SYNTHETIC_ID_PREFIX,
    loader::TypeInfo,
    machine::result::{BlockId, InstanceId},
    transform::DynTransformation,
};

/// A named unit of change recorded against an instance.
///
/// Edits are produced while the machine interprets the program, typically by
/// native delegates modelling the host's registration API. Each edit names
/// the change, carries the transformation that realizes it in the source,
/// and remembers which instance created it.
#[derive(Clone, Debug)]
pub struct Edit {
    name:           String,
    transformation: DynTransformation,
    creator:        InstanceId,
}

impl Edit {
    /// Constructs a new edit called `name`, realized by `transformation`
    /// and created by `creator`.
    pub fn new(
        name: impl Into<String>,
        transformation: DynTransformation,
        creator: InstanceId,
    ) -> Self {
        let name = name.into();
        Self {
            name,
            transformation,
            creator,
        }
    }

    /// Gets the name of the edit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the transformation that realizes the edit.
    #[must_use]
    pub fn transformation(&self) -> &DynTransformation {
        &self.transformation
    }

    /// Gets the instance that created the edit.
    #[must_use]
    pub fn creator(&self) -> InstanceId {
        self.creator
    }
}

/// A simulated runtime object.
///
/// Instances are created only by the machine (or by native delegates through
/// the machine) and are never destroyed explicitly. Each carries a type
/// descriptor, a machine-assigned identifier that can be upgraded once, a
/// dirty flag for imprecisely modelled effects, and an edit log.
#[derive(Clone, Debug)]
pub struct Instance {
    info:           TypeInfo,
    id:             String,
    dirty:          bool,
    creation_block: Option<BlockId>,
    edits:          Vec<Rc<Edit>>,
    attached_edits: HashMap<InstanceId, Vec<Rc<Edit>>>,
}

impl Instance {
    /// Constructs a new instance of the type described by `info`, with the
    /// machine-assigned identifier `id`, created by the instructions of
    /// `creation_block`.
    pub(crate) fn new(info: TypeInfo, id: String, creation_block: Option<BlockId>) -> Self {
        Self {
            info,
            id,
            dirty: false,
            creation_block,
            edits: Vec::new(),
            attached_edits: HashMap::new(),
        }
    }

    /// Gets the descriptor of the instance's type.
    #[must_use]
    pub fn info(&self) -> &TypeInfo {
        &self.info
    }

    /// Gets the current identifier of the instance.
    ///
    /// Identifiers assigned by the machine are synthetic and start with
    /// [`SYNTHETIC_ID_PREFIX`]; an identifier that does not is a hint that
    /// was accepted by [`Self::hint_id`].
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Offers `hint` as a replacement for the machine-assigned identifier.
    ///
    /// The hint is accepted only when it is not itself synthetic and the
    /// current identifier still is; an accepted hint is permanent, because
    /// the instance's identifier no longer looks unresolved afterwards.
    /// Returns whether the hint was accepted.
    pub fn hint_id(&mut self, hint: &str) -> bool {
        if hint.starts_with(SYNTHETIC_ID_PREFIX) || !self.id.starts_with(SYNTHETIC_ID_PREFIX) {
            return false;
        }

        self.id = hint.to_string();
        true
    }

    /// Checks whether some effect on this instance could not be modelled
    /// precisely.
    ///
    /// Consumers must exclude dirty instances from edit and removal
    /// inference.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Records that an effect on this instance could not be modelled
    /// precisely.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Gets the block whose instructions created this instance, if the
    /// instance was created by instructions at all.
    ///
    /// Shared per-type instances and instances conjured by native delegates
    /// outside any block have no creation block.
    #[must_use]
    pub fn creation_block(&self) -> Option<BlockId> {
        self.creation_block
    }

    /// Appends `edit` to this instance's edit log.
    ///
    /// Edits whose transformation is empty are not stored. Returns a handle
    /// to the stored edit, if it was stored.
    pub fn add_edit(&mut self, edit: Edit) -> Option<Rc<Edit>> {
        if edit.transformation().is_empty() {
            return None;
        }

        let edit = Rc::new(edit);
        self.edits.push(edit.clone());
        Some(edit)
    }

    /// Records `edit` as attached to this instance by `attacher`.
    ///
    /// Edits whose transformation is empty are not stored. Returns a handle
    /// to the stored edit, if it was stored.
    pub fn attach_edit(&mut self, attacher: InstanceId, edit: Edit) -> Option<Rc<Edit>> {
        if edit.transformation().is_empty() {
            return None;
        }

        let edit = Rc::new(edit);
        self.attached_edits.entry(attacher).or_default().push(edit.clone());
        Some(edit)
    }

    /// Deletes `edit` from this instance's edit log, comparing by
    /// reference.
    ///
    /// Copies of the edit attached to other instances are not cascaded.
    /// Returns whether an edit was deleted.
    pub fn remove_edit(&mut self, edit: &Rc<Edit>) -> bool {
        let before = self.edits.len();
        self.edits.retain(|stored| !Rc::ptr_eq(stored, edit));
        self.edits.len() != before
    }

    /// Gets the edits of this instance, in the order they were added.
    #[must_use]
    pub fn edits(&self) -> &[Rc<Edit>] {
        &self.edits
    }

    /// Gets the edits attached to this instance by `attacher`.
    #[must_use]
    pub fn attached_edits(&self, attacher: InstanceId) -> &[Rc<Edit>] {
        self.attached_edits.get(&attacher).map_or(&[], Vec::as_slice)
    }
}
