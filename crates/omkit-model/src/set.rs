//! Set-valued association ends.

use std::fmt;
use std::rc::{Rc, Weak};

use omkit_collection::{CollectionOptions, ElementListener, MaSet, SetCursor};
use omkit_core::Result;

use crate::entity::{AssociationEnd, Entity, EntityComparator, Mirror, MirrorHook, upgrade};
use crate::info::AssociationInfo;
use crate::registry::declare_mirror;

/// A set end, such as `Department::employees`.
///
/// Members are compared by identity and kept in insertion order. When the
/// association is bidirectional every element entering the set has its
/// opposite end pointed at the owner, and every element leaving it is
/// released.
pub struct AssociatedSet<O: Entity, T: Entity> {
    info: &'static AssociationInfo,
    members: MaSet<T>,
    owner: Weak<O::State>,
}

impl<O: Entity, T: Entity> AssociatedSet<O, T> {
    pub fn new(
        owner: Weak<O::State>,
        info: &'static AssociationInfo,
        mirror: Option<Mirror<T, O>>,
    ) -> Self {
        Self::with_options(
            owner,
            info,
            mirror,
            CollectionOptions::new(EntityComparator).insertion_ordered(),
        )
    }

    /// Build over custom collection options, e.g. a sorted layout.
    pub fn with_options(
        owner: Weak<O::State>,
        info: &'static AssociationInfo,
        mirror: Option<Mirror<T, O>>,
        options: CollectionOptions<T>,
    ) -> Self {
        let members = MaSet::with_options(options);
        if let Some(mirror) = mirror {
            members.set_membership_hook(Some(Rc::new(MirrorHook {
                owner: owner.clone(),
                mirror,
            })));
        }
        Self {
            info,
            members,
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

    /// The managed set behind this end.
    pub fn collection(&self) -> &MaSet<T> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, element: &T) -> bool {
        self.members.contains(element)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.members.to_vec()
    }

    pub fn add(&self, element: T) -> Result<bool> {
        self.members.add(element)
    }

    pub fn add_all(&self, elements: impl IntoIterator<Item = T>) -> Result<bool> {
        self.members.add_all(elements)
    }

    pub fn remove(&self, element: &T) -> Result<bool> {
        self.members.remove(element)
    }

    pub fn remove_all(&self, elements: &[T]) -> Result<bool> {
        self.members.remove_all(elements)
    }

    pub fn retain(&self, keep: impl FnMut(&T) -> bool) -> Result<bool> {
        self.members.retain(keep)
    }

    pub fn clear(&self) -> Result<()> {
        self.members.clear()
    }

    pub fn cursor(&self) -> SetCursor<'_, T> {
        self.members.cursor()
    }

    pub fn add_element_listener(&self, listener: Rc<dyn ElementListener<T>>) {
        self.members.add_element_listener(listener);
    }

    pub fn remove_element_listener(&self, listener: &Rc<dyn ElementListener<T>>) -> bool {
        self.members.remove_element_listener(listener)
    }
}

impl<O: Entity, T: Entity> AssociationEnd<T> for AssociatedSet<O, T> {
    fn link(&self, partner: &T) -> Result<()> {
        if self.members.contains(partner) {
            return Ok(());
        }
        declare_mirror(self.members.id(), self.info);
        self.members.add(partner.clone())?;
        Ok(())
    }

    fn unlink(&self, partner: &T) -> Result<()> {
        if !self.members.contains(partner) {
            return Ok(());
        }
        declare_mirror(self.members.id(), self.info);
        self.members.remove(partner)?;
        Ok(())
    }
}

impl<O: Entity, T: Entity> fmt::Debug for AssociatedSet<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociatedSet")
            .field("association", &self.info.name)
            .field("len", &self.members.len())
            .finish()
    }
}
