//! Single-valued association ends.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use omkit_collection::{Batch, EventRecorder, next_collection_id};
use omkit_core::{ModificationType, PropertyVersion, Result};

use crate::entity::{AssociationEnd, Entity, Mirror, upgrade};
use crate::info::AssociationInfo;
use crate::registry::declare_mirror;

/// A change of the target of a reference.
#[derive(Debug, Clone)]
pub struct ReferenceEvent<T> {
    detached: Option<T>,
    attached: Option<T>,
    implicit: bool,
}

impl<T> ReferenceEvent<T> {
    pub fn new(detached: Option<T>, attached: Option<T>, implicit: bool) -> Self {
        Self {
            detached,
            attached,
            implicit,
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        match (&self.detached, &self.attached) {
            (Some(_), Some(_)) => ModificationType::Replace,
            (Some(_), None) => ModificationType::Detach,
            _ => ModificationType::Attach,
        }
    }

    pub fn is_implicit(&self, version: PropertyVersion) -> bool {
        self.target(version).is_some() && self.implicit
    }

    pub fn target(&self, version: PropertyVersion) -> Option<&T> {
        match version {
            PropertyVersion::Detach => self.detached.as_ref(),
            PropertyVersion::Attach => self.attached.as_ref(),
        }
    }
}

impl<T: fmt::Display> fmt::Display for ReferenceEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(t) = &self.detached {
            write!(f, "detached(reference={})", t)?;
        }
        if let Some(t) = &self.attached {
            write!(f, "attached(reference={})", t)?;
        }
        Ok(())
    }
}

/// Observer of a reference end.
pub trait ReferenceListener<T> {
    fn modified(&self, event: &ReferenceEvent<T>) -> Result<()>;
}

impl<T, F> ReferenceListener<T> for F
where
    F: Fn(&ReferenceEvent<T>) -> Result<()>,
{
    fn modified(&self, event: &ReferenceEvent<T>) -> Result<()> {
        self(event)
    }
}

impl<T: fmt::Display> ReferenceListener<T> for EventRecorder {
    fn modified(&self, event: &ReferenceEvent<T>) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

type SharedListeners<T> = Rc<RefCell<Vec<Rc<dyn ReferenceListener<T>>>>>;

/// A single-valued end, such as `Employee::department`.
///
/// Setting the reference updates the opposite ends: the old target forgets
/// the owner and the new target learns it. Both happen inside the caller's
/// batch and are reported as implicit events on their own ends.
pub struct AssociatedReference<O: Entity, T: Entity> {
    id: u64,
    info: &'static AssociationInfo,
    owner: Weak<O::State>,
    mirror: Option<Mirror<T, O>>,
    target: RefCell<Option<T>>,
    listeners: SharedListeners<T>,
}

impl<O: Entity, T: Entity> AssociatedReference<O, T> {
    /// A reference end of `owner`. `mirror` reaches the opposite end on a
    /// target; `None` makes the association unidirectional.
    pub fn new(
        owner: Weak<O::State>,
        info: &'static AssociationInfo,
        mirror: Option<Mirror<T, O>>,
    ) -> Self {
        Self {
            id: next_collection_id(),
            info,
            owner,
            mirror,
            target: RefCell::new(None),
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn info(&self) -> &'static AssociationInfo {
        self.info
    }

    pub fn get(&self) -> Option<T> {
        self.target.borrow().clone()
    }

    /// Whether the reference currently points at `target`.
    pub fn is(&self, target: &T) -> bool {
        self.target.borrow().as_ref().is_some_and(|t| t.same(target))
    }

    /// Point the reference at `target`, returning the previous target.
    pub fn set(&self, target: Option<T>) -> Result<Option<T>> {
        let old = self.get();
        let unchanged = match (&old, &target) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(old);
        }
        let batch = Batch::begin(self.id);
        self.target.replace(target.clone());
        tracing::trace!(
            association = self.info.name,
            implicit = !batch.is_explicit(),
            "Reference retargeted"
        );
        self.notify(&batch, ReferenceEvent::new(old.clone(), target.clone(), !batch.is_explicit()));
        if let (Some(mirror), Some(owner)) = (self.mirror, upgrade::<O>(&self.owner)) {
            if let Some(old) = &old {
                mirror(old).unlink(&owner)?;
            }
            if let Some(new) = &target {
                mirror(new).link(&owner)?;
            }
        }
        batch.finish()?;
        Ok(old)
    }

    fn notify(&self, batch: &Batch, event: ReferenceEvent<T>) {
        let listeners = Rc::clone(&self.listeners);
        batch.enqueue(move || {
            let snapshot = listeners.borrow().clone();
            for listener in snapshot {
                listener.modified(&event)?;
            }
            Ok(())
        });
    }

    pub fn add_reference_listener(&self, listener: Rc<dyn ReferenceListener<T>>) {
        self.listeners.borrow_mut().push(listener);
    }

    pub fn remove_reference_listener(&self, listener: &Rc<dyn ReferenceListener<T>>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        match listeners
            .iter()
            .position(|l| std::ptr::addr_eq(Rc::as_ptr(l), Rc::as_ptr(listener)))
        {
            Some(pos) => {
                listeners.remove(pos);
                true
            }
            None => {
                tracing::warn!(association = self.info.name, "Removing a listener that was never registered");
                false
            }
        }
    }
}

impl<O: Entity, T: Entity> AssociationEnd<T> for AssociatedReference<O, T> {
    fn link(&self, partner: &T) -> Result<()> {
        if self.is(partner) {
            return Ok(());
        }
        declare_mirror(self.id, self.info);
        self.set(Some(partner.clone()))?;
        Ok(())
    }

    fn unlink(&self, partner: &T) -> Result<()> {
        if !self.is(partner) {
            return Ok(());
        }
        declare_mirror(self.id, self.info);
        self.set(None)?;
        Ok(())
    }
}

impl<O: Entity, T: Entity> fmt::Debug for AssociatedReference<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociatedReference")
            .field("association", &self.info.name)
            .field("set", &self.target.borrow().is_some())
            .finish()
    }
}
