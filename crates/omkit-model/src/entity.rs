//! The seam between domain objects and association ends.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::{Rc, Weak};

use omkit_collection::{EqualityComparator, MembershipHook};
use omkit_core::Result;

/// A domain object handle: a newtype around `Rc` of its state.
///
/// Association ends keep a weak link to their owner's state and rebuild the
/// handle on demand, so an entity never owns itself.
///
/// ```
/// use std::rc::Rc;
/// use omkit_model::Entity;
///
/// #[derive(Clone)]
/// struct Tag(Rc<String>);
///
/// impl Entity for Tag {
///     type State = String;
///     fn state(&self) -> &Rc<String> { &self.0 }
///     fn from_state(state: Rc<String>) -> Self { Tag(state) }
/// }
///
/// let a = Tag(Rc::new("x".into()));
/// assert!(a.same(&a.clone()));
/// assert!(!a.same(&Tag(Rc::new("x".into()))));
/// ```
pub trait Entity: Clone + 'static {
    type State: 'static;

    fn state(&self) -> &Rc<Self::State>;

    fn from_state(state: Rc<Self::State>) -> Self;

    /// Identity comparison.
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self.state(), other.state())
    }

    fn downgrade(&self) -> Weak<Self::State> {
        Rc::downgrade(self.state())
    }
}

/// Upgrade a weak owner link back into a handle.
pub(crate) fn upgrade<O: Entity>(owner: &Weak<O::State>) -> Option<O> {
    owner.upgrade().map(O::from_state)
}

/// Identity comparator for entity handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityComparator;

impl<T: Entity> EqualityComparator<T> for EntityComparator {
    fn hash(&self, value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        Rc::as_ptr(value.state()).cast::<()>().hash(&mut hasher);
        hasher.finish()
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a.same(b)
    }
}

/// One end of an association, seen from the other side.
///
/// Both operations are idempotent: linking a partner that is already linked
/// (or unlinking one that is not) changes nothing and fires nothing. That is
/// what stops mirror propagation from bouncing back and forth.
pub trait AssociationEnd<P> {
    fn link(&self, partner: &P) -> Result<()>;

    fn unlink(&self, partner: &P) -> Result<()>;
}

/// Reaches the opposite end on a target object.
pub type Mirror<T, O> = fn(&T) -> &dyn AssociationEnd<O>;

/// Membership hook installed on the collection behind a set or list end.
pub(crate) struct MirrorHook<O: Entity, T> {
    pub(crate) owner: Weak<O::State>,
    pub(crate) mirror: Mirror<T, O>,
}

impl<O: Entity, T> MembershipHook<T> for MirrorHook<O, T> {
    fn attached(&self, element: &T) -> Result<()> {
        match upgrade::<O>(&self.owner) {
            Some(owner) => (self.mirror)(element).link(&owner),
            None => Ok(()),
        }
    }

    fn detached(&self, element: &T) -> Result<()> {
        match upgrade::<O>(&self.owner) {
            Some(owner) => (self.mirror)(element).unlink(&owner),
            None => Ok(()),
        }
    }
}
