//! Frozen contexts: suspending and resuming an element's bucket position.
//!
//! An element that sits in a frozen-aware collection holds a
//! [`FrozenContext`] naming every collection that indexes it. Before its
//! hash-relevant state changes, the element calls
//! [`FrozenContext::suspend_freezing`]; each collection then pulls the element
//! out of its index but keeps it as a member. After the change,
//! [`FrozenContext::resume_freezing`] makes each collection rehash the element
//! into its new bucket. A collision evicts the previous occupant, and that
//! eviction is reported as an implicit event.
//!
//! # Design
//!
//! - A context is a shared list of *members*, one per collection (host).
//! - Each member carries its own suspend count, so nested suspensions only
//!   reach the host on the outermost suspend and the outermost resume.
//! - [`FrozenContext::combine`] and [`FrozenContext::remove`] merge and split
//!   contexts as the element enters and leaves collections. Members whose
//!   collection has been dropped are trimmed on every merge.
//!
//! # Example
//!
//! ```ignore
//! impl Unstable {
//!     fn set_val(&self, val: &str) -> Result<()> {
//!         self.0.frozen.mutate(self, || *self.0.val.borrow_mut() = val.to_string())
//!     }
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use omkit_core::Result;

use crate::dispatch::Batch;
use crate::store::SlotKey;

/// A collection that can temporarily release and later rehash one member.
pub(crate) trait FrozenHost<T> {
    /// Pull `element` out of the index. Returns the slot to resume later, or
    /// `None` if this host does not hold the element.
    fn suspend(&self, element: &T) -> Option<SlotKey>;

    /// Rehash the slot released by [`suspend`](Self::suspend).
    fn resume(&self, slot: SlotKey) -> Result<()>;
}

struct Member<T> {
    host: Weak<dyn FrozenHost<T>>,
    suspend_count: Cell<usize>,
    slot: Cell<Option<SlotKey>>,
}

impl<T> Member<T> {
    fn same_host(&self, other: &Member<T>) -> bool {
        Weak::ptr_eq(&self.host, &other.host)
    }

    fn is_alive(&self) -> bool {
        self.host.strong_count() > 0
    }

    fn suspend(&self, element: &T) {
        let count = self.suspend_count.get();
        if count == 0 {
            if let Some(host) = self.host.upgrade() {
                self.slot.set(host.suspend(element));
            }
        }
        self.suspend_count.set(count + 1);
    }

    fn resume(&self) -> Result<()> {
        let count = self.suspend_count.get();
        assert!(
            count > 0,
            "resume_freezing called without a matching suspend_freezing"
        );
        self.suspend_count.set(count - 1);
        if count > 1 {
            return Ok(());
        }
        match (self.slot.take(), self.host.upgrade()) {
            (Some(slot), Some(host)) => host.resume(slot),
            _ => Ok(()),
        }
    }
}

/// The set of collections that must be told when an element's
/// hash-relevant state is about to change.
pub struct FrozenContext<T> {
    members: Rc<[Rc<Member<T>>]>,
}

impl<T> Clone for FrozenContext<T> {
    fn clone(&self) -> Self {
        Self {
            members: Rc::clone(&self.members),
        }
    }
}

impl<T: 'static> fmt::Debug for FrozenContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenContext")
            .field("hosts", &self.members.len())
            .field("suspended", &self.is_suspended())
            .finish()
    }
}

impl<T: 'static> FrozenContext<T> {
    pub(crate) fn single(host: Weak<dyn FrozenHost<T>>) -> Self {
        Self {
            members: Rc::from(vec![Rc::new(Member {
                host,
                suspend_count: Cell::new(0),
                slot: Cell::new(None),
            })]),
        }
    }

    /// Merge `added` into `existing`.
    ///
    /// Hosts already present in `existing` keep their member (and its
    /// suspend count).
    pub fn combine(existing: Option<&FrozenContext<T>>, added: &FrozenContext<T>) -> Self {
        let Some(existing) = existing else {
            return added.clone();
        };
        let mut members: Vec<Rc<Member<T>>> = existing
            .members
            .iter()
            .filter(|m| m.is_alive())
            .cloned()
            .collect();
        for member in added.members.iter() {
            if member.is_alive() && !members.iter().any(|m| m.same_host(member)) {
                members.push(Rc::clone(member));
            }
        }
        Self {
            members: Rc::from(members),
        }
    }

    /// Drop every host of `removed` from `existing`.
    ///
    /// Returns `None` when nothing remains.
    pub fn remove(existing: &FrozenContext<T>, removed: &FrozenContext<T>) -> Option<Self> {
        let members: Vec<Rc<Member<T>>> = existing
            .members
            .iter()
            .filter(|m| m.is_alive() && !removed.members.iter().any(|r| r.same_host(m)))
            .cloned()
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(Self {
                members: Rc::from(members),
            })
        }
    }

    /// Announce that `element`'s hash-relevant state is about to change.
    ///
    /// `None` (an element that sits in no frozen-aware collection) is a no-op.
    pub fn suspend_freezing(ctx: Option<&FrozenContext<T>>, element: &T) {
        if let Some(ctx) = ctx {
            ctx.suspend(element);
        }
    }

    /// Rehash the element in every collection suspended by the matching
    /// [`suspend_freezing`](Self::suspend_freezing).
    ///
    /// Every host rehashes before any listener runs, so listeners observe
    /// all hosts settled. Every host is resumed even if an earlier one
    /// fails; the first failure is returned.
    ///
    /// # Panics
    ///
    /// Panics if the context was not suspended.
    pub fn resume_freezing(ctx: Option<&FrozenContext<T>>) -> Result<()> {
        match ctx {
            Some(ctx) => ctx.resume(),
            None => Ok(()),
        }
    }

    pub fn suspend(&self, element: &T) {
        tracing::trace!(hosts = self.members.len(), "Suspending frozen context");
        for member in self.members.iter() {
            member.suspend(element);
        }
    }

    pub fn resume(&self) -> Result<()> {
        tracing::trace!(hosts = self.members.len(), "Resuming frozen context");
        let batch = Batch::scope();
        let mut first_error = None;
        for member in self.members.iter() {
            if let Err(err) = member.resume() {
                first_error.get_or_insert(err);
            }
        }
        let delivered = batch.finish();
        match first_error {
            Some(err) => Err(err),
            None => delivered,
        }
    }

    /// Whether any host is inside a suspension window.
    pub fn is_suspended(&self) -> bool {
        self.members.iter().any(|m| m.suspend_count.get() > 0)
    }

    /// Number of live collections registered in this context.
    pub fn host_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_alive()).count()
    }
}

/// Explicit holder of an element's frozen context.
///
/// Domain objects that implement [`crate::Freezable`] keep one of these as a
/// plain field.
pub struct FrozenCell<T> {
    ctx: RefCell<Option<FrozenContext<T>>>,
}

impl<T> Default for FrozenCell<T> {
    fn default() -> Self {
        Self {
            ctx: RefCell::new(None),
        }
    }
}

impl<T: 'static> fmt::Debug for FrozenCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenCell")
            .field("ctx", &*self.ctx.borrow())
            .finish()
    }
}

impl<T: 'static> FrozenCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current context, if any collection indexes the owner.
    pub fn context(&self) -> Option<FrozenContext<T>> {
        self.ctx.borrow().clone()
    }

    pub fn combine(&self, added: FrozenContext<T>) {
        let mut ctx = self.ctx.borrow_mut();
        let merged = FrozenContext::combine(ctx.as_ref(), &added);
        *ctx = Some(merged);
    }

    pub fn remove(&self, removed: &FrozenContext<T>) {
        let mut ctx = self.ctx.borrow_mut();
        if let Some(existing) = ctx.take() {
            *ctx = FrozenContext::remove(&existing, removed);
        }
    }

    /// Run `mutation` inside a suspension window for `element`.
    ///
    /// The context captured before the mutation is the one resumed, even if
    /// the element joins or leaves collections inside `mutation`.
    pub fn mutate<R>(&self, element: &T, mutation: impl FnOnce() -> R) -> Result<R> {
        let ctx = self.context();
        FrozenContext::suspend_freezing(ctx.as_ref(), element);
        let output = mutation();
        FrozenContext::resume_freezing(ctx.as_ref())?;
        Ok(output)
    }
}
