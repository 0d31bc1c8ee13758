//! List-valued association ends.

use std::fmt;
use std::rc::{Rc, Weak};

use omkit_collection::{BidiType, ListCursor, ListElementListener, MaList};
use omkit_core::{Error, Result};

use crate::entity::{AssociationEnd, Entity, EntityComparator, Mirror, MirrorHook, upgrade};
use crate::info::{AssociationInfo, DuplicatePolicy};
use crate::registry::declare_mirror;

/// An ordered end, such as `Playlist::tracks`.
///
/// The uniqueness policy comes from the descriptor. A bidirectional list is
/// always unique: an element that appears twice could not tell its opposite
/// end when it really left.
pub struct AssociatedList<O: Entity, T: Entity> {
    info: &'static AssociationInfo,
    elements: MaList<T>,
    owner: Weak<O::State>,
}

impl<O: Entity, T: Entity> AssociatedList<O, T> {
    pub fn new(
        owner: Weak<O::State>,
        info: &'static AssociationInfo,
        mirror: Option<Mirror<T, O>>,
    ) -> Self {
        let bidi = match (mirror.is_some(), info.bidi) {
            (true, BidiType::None) => {
                tracing::warn!(
                    association = %info.qualified_name(),
                    "Bidirectional list declared without uniqueness; treating elements as unique"
                );
                BidiType::AllValues
            }
            (_, bidi) => bidi,
        };
        let elements = MaList::with_comparator(EntityComparator, bidi);
        if let Some(mirror) = mirror {
            elements.set_membership_hook(Some(Rc::new(MirrorHook {
                owner: owner.clone(),
                mirror,
            })));
        }
        Self {
            info,
            elements,
            owner,
        }
    }

    pub fn info(&self) -> &'static AssociationInfo {
        self.info
    }

    /// The entity holding this end, while it is alive.
    pub fn owner(&self) -> Option<O> {
        upgrade::<O>(&self.owner)
    }

    pub fn collection(&self) -> &MaList<T> {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.elements.get(index)
    }

    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    pub fn index_of(&self, element: &T) -> Option<usize> {
        self.elements.index_of(element)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.elements.to_vec()
    }

    fn admit(&self, element: &T) -> Result<()> {
        if self.info.duplicates == DuplicatePolicy::Reject
            && self.elements.bidi_type().is_bidi()
            && self.elements.contains(element)
        {
            return Err(Error::invalid_argument(
                "element",
                format!("already present in '{}'", self.info.qualified_name()),
            ));
        }
        Ok(())
    }

    pub fn push(&self, element: T) -> Result<()> {
        self.admit(&element)?;
        self.elements.push(element)
    }

    pub fn insert(&self, index: usize, element: T) -> Result<()> {
        self.admit(&element)?;
        self.elements.insert(index, element)
    }

    /// Replace the element at `index`. Putting an element back at its own
    /// index is always allowed.
    pub fn set(&self, index: usize, element: T) -> Result<T> {
        if self.elements.index_of(&element) != Some(index) {
            self.admit(&element)?;
        }
        self.elements.set(index, element)
    }

    pub fn remove_at(&self, index: usize) -> Result<T> {
        self.elements.remove_at(index)
    }

    pub fn remove(&self, element: &T) -> Result<bool> {
        self.elements.remove(element)
    }

    pub fn clear(&self) -> Result<()> {
        self.elements.clear()
    }

    pub fn cursor(&self) -> ListCursor<'_, T> {
        self.elements.cursor()
    }

    pub fn add_list_element_listener(&self, listener: Rc<dyn ListElementListener<T>>) {
        self.elements.add_list_element_listener(listener);
    }

    pub fn remove_list_element_listener(&self, listener: &Rc<dyn ListElementListener<T>>) -> bool {
        self.elements.remove_list_element_listener(listener)
    }
}

impl<O: Entity, T: Entity> AssociationEnd<T> for AssociatedList<O, T> {
    fn link(&self, partner: &T) -> Result<()> {
        if self.elements.contains(partner) {
            return Ok(());
        }
        declare_mirror(self.elements.id(), self.info);
        self.elements.push(partner.clone())?;
        Ok(())
    }

    fn unlink(&self, partner: &T) -> Result<()> {
        if !self.elements.contains(partner) {
            return Ok(());
        }
        declare_mirror(self.elements.id(), self.info);
        self.elements.remove(partner)?;
        Ok(())
    }
}

impl<O: Entity, T: Entity> fmt::Debug for AssociatedList<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociatedList")
            .field("association", &self.info.name)
            .field("len", &self.elements.len())
            .finish()
    }
}
