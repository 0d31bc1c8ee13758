//! The managed set.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use omkit_core::{Error, Result, StateErrorKind};

use crate::dispatch::{Batch, next_collection_id};
use crate::event::ElementEvent;
use crate::frozen::{FrozenContext, FrozenHost};
use crate::hook::MembershipHook;
use crate::listener::{ElementListener, Listeners};
use crate::options::CollectionOptions;
use crate::store::{BaseEntries, EntryResume, SlotKey};

struct SetCore<E: 'static> {
    id: u64,
    this: Weak<SetCore<E>>,
    options: CollectionOptions<E>,
    store: RefCell<BaseEntries<E, ()>>,
    listeners: Listeners<dyn ElementListener<E>>,
    hook: RefCell<Option<Rc<dyn MembershipHook<E>>>>,
}

impl<E: Clone + 'static> SetCore<E> {
    fn context(&self) -> FrozenContext<E> {
        let host: Weak<dyn FrozenHost<E>> = self.this.clone();
        FrozenContext::single(host)
    }

    fn hook(&self) -> Option<Rc<dyn MembershipHook<E>>> {
        self.hook.borrow().clone()
    }

    fn notify(&self, batch: &Batch, event: ElementEvent<E>) {
        batch.notify(&self.listeners, event, |l, e| l.modified(e));
    }

    fn entered(&self, element: &E) -> Result<()> {
        if let Some(freezer) = self.options.comparator.freezer() {
            freezer.freeze(element, self.context());
        }
        tracing::trace!(collection = self.id, "Element attached");
        match self.hook() {
            Some(hook) => hook.attached(element),
            None => Ok(()),
        }
    }

    fn left(&self, element: &E) -> Result<()> {
        if let Some(freezer) = self.options.comparator.freezer() {
            freezer.unfreeze(element, &self.context());
        }
        tracing::trace!(collection = self.id, "Element detached");
        match self.hook() {
            Some(hook) => hook.detached(element),
            None => Ok(()),
        }
    }

    fn insert(&self, batch: &Batch, element: E) -> Result<bool> {
        let inserted = {
            let mut store = self.store.borrow_mut();
            if store.find_key(&element).is_some() {
                false
            } else {
                store.insert(element.clone(), ());
                true
            }
        };
        if inserted {
            self.notify(batch, ElementEvent::attach(element.clone(), !batch.is_explicit()));
            self.entered(&element)?;
        }
        Ok(inserted)
    }

    fn detach_slot(&self, batch: &Batch, slot: SlotKey) -> Result<bool> {
        let removed = self.store.borrow_mut().remove(slot);
        match removed {
            Some((element, ())) => {
                self.notify(batch, ElementEvent::detach(element.clone(), !batch.is_explicit()));
                self.left(&element)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find(&self, element: &E) -> Option<SlotKey> {
        self.store.borrow().find_key(element)
    }
}

impl<E: Clone + 'static> FrozenHost<E> for SetCore<E> {
    fn suspend(&self, element: &E) -> Option<SlotKey> {
        let freezer = self.options.comparator.freezer()?;
        let image = freezer.snapshot(element);
        let mut store = self.store.borrow_mut();
        let slot = store.find_key(element)?;
        store.suspend_key(slot, image).then_some(slot)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn resume(&self, slot: SlotKey) -> Result<()> {
        let batch = Batch::begin_implicit(self.id);
        let resumed = self.store.borrow_mut().resume_key(slot);
        let current = self.store.borrow().key(slot).cloned();
        if let (Some(EntryResume { image, victim }), Some(current)) = (resumed, current) {
            match victim {
                None => self.notify(&batch, ElementEvent::replace(image, true, current, true)),
                Some((victim, ())) => {
                    self.notify(&batch, ElementEvent::detach(image, true));
                    self.notify(
                        &batch,
                        ElementEvent::replace(victim.clone(), true, current, true),
                    );
                    self.left(&victim)?;
                }
            }
        }
        batch.finish()
    }
}

/// A set that reports every membership change.
///
/// `MaSet` is a handle: clones share the same collection. Equality is
/// decided by the comparator in its [`CollectionOptions`], never by the
/// element's own `Eq` unless the comparator says so.
///
/// ```
/// use std::rc::Rc;
/// use omkit_collection::{ElementListener, EventRecorder, MaSet};
///
/// let set = MaSet::new();
/// let recorder = EventRecorder::new();
/// set.add_element_listener(Rc::new(recorder.clone()) as Rc<dyn ElementListener<i32>>);
/// assert!(set.add(1).unwrap());
/// assert!(!set.add(1).unwrap());
/// assert!(set.remove(&1).unwrap());
/// assert_eq!(recorder.take(), "attached(element=1)detached(element=1)");
/// ```
pub struct MaSet<E: 'static> {
    core: Rc<SetCore<E>>,
}

impl<E: 'static> Clone for MaSet<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E: Clone + Hash + Eq + 'static> Default for MaSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Hash + Eq + 'static> MaSet<E> {
    pub fn new() -> Self {
        Self::with_options(CollectionOptions::default())
    }
}

impl<E: Clone + 'static> MaSet<E> {
    pub fn with_options(options: CollectionOptions<E>) -> Self {
        let store = BaseEntries::new(options.comparator.clone(), options.order, None);
        let core = Rc::new_cyclic(|this| SetCore {
            id: next_collection_id(),
            this: this.clone(),
            options,
            store: RefCell::new(store),
            listeners: Listeners::default(),
            hook: RefCell::new(None),
        });
        Self { core }
    }

    /// Identity of this collection within the current thread.
    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub fn options(&self) -> &CollectionOptions<E> {
        &self.core.options
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn len(&self) -> usize {
        self.core.store.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, element: &E) -> bool {
        self.core.find(element).is_some()
    }

    /// The member equal to `element`, if any.
    pub fn get(&self, element: &E) -> Option<E> {
        let store = self.core.store.borrow();
        store.find_key(element).and_then(|s| store.key(s).cloned())
    }

    /// Whether some member is inside a suspension window.
    pub fn is_suspended(&self) -> bool {
        self.core.store.borrow().has_suspended()
    }

    /// Members in iteration order.
    pub fn to_vec(&self) -> Vec<E> {
        let store = self.core.store.borrow();
        store
            .slots_in_order()
            .into_iter()
            .filter_map(|s| store.key(s).cloned())
            .collect()
    }

    /// Iterate over a snapshot of the members.
    pub fn iter(&self) -> impl Iterator<Item = E> {
        self.to_vec().into_iter()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add `element`. Returns `false` if an equal member is already present.
    pub fn add(&self, element: E) -> Result<bool> {
        self.core.options.check("element", &element)?;
        let batch = Batch::begin(self.core.id);
        let added = self.core.insert(&batch, element)?;
        batch.finish()?;
        Ok(added)
    }

    /// Add every element in one batch. All elements are validated first.
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<bool> {
        let elements: Vec<E> = elements.into_iter().collect();
        for element in &elements {
            self.core.options.check("element", element)?;
        }
        let batch = Batch::begin(self.core.id);
        let mut changed = false;
        for element in elements {
            changed |= self.core.insert(&batch, element)?;
        }
        batch.finish()?;
        Ok(changed)
    }

    /// Remove the member equal to `element`. Returns `false` (and fires
    /// nothing) if there is none.
    pub fn remove(&self, element: &E) -> Result<bool> {
        let Some(slot) = self.core.find(element) else {
            return Ok(false);
        };
        let batch = Batch::begin(self.core.id);
        let removed = self.core.detach_slot(&batch, slot)?;
        batch.finish()?;
        Ok(removed)
    }

    pub fn remove_all(&self, elements: &[E]) -> Result<bool> {
        let slots: Vec<SlotKey> = {
            let store = self.core.store.borrow();
            let mut slots: Vec<SlotKey> = elements.iter().filter_map(|e| store.find_key(e)).collect();
            slots.dedup();
            slots
        };
        self.detach_all(slots)
    }

    /// Keep only the members `keep` accepts.
    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> Result<bool> {
        let doomed: Vec<SlotKey> = {
            let store = self.core.store.borrow();
            store
                .slots_in_order()
                .into_iter()
                .filter(|&s| store.key(s).is_some_and(|e| !keep(e)))
                .collect()
        };
        self.detach_all(doomed)
    }

    pub fn clear(&self) -> Result<()> {
        let batch = Batch::begin(self.core.id);
        let removed = self.core.store.borrow_mut().clear();
        for (element, ()) in removed {
            self.core
                .notify(&batch, ElementEvent::detach(element.clone(), !batch.is_explicit()));
            self.core.left(&element)?;
        }
        batch.finish()
    }

    fn detach_all(&self, slots: Vec<SlotKey>) -> Result<bool> {
        if slots.is_empty() {
            return Ok(false);
        }
        let batch = Batch::begin(self.core.id);
        let mut changed = false;
        for slot in slots {
            changed |= self.core.detach_slot(&batch, slot)?;
        }
        batch.finish()?;
        Ok(changed)
    }

    /// A cursor over the members that can remove the last one it yielded.
    pub fn cursor(&self) -> SetCursor<'_, E> {
        let store = self.core.store.borrow();
        SetCursor {
            set: self,
            order: store.slots_in_order(),
            position: 0,
            current: None,
            expected_mod_count: store.mod_count(),
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn add_element_listener(&self, listener: Rc<dyn ElementListener<E>>) {
        self.core.listeners.add(listener);
    }

    pub fn remove_element_listener(&self, listener: &Rc<dyn ElementListener<E>>) -> bool {
        self.core.listeners.remove(listener)
    }

    /// Install (or clear) the hook association ends use to mirror this set.
    pub fn set_membership_hook(&self, hook: Option<Rc<dyn MembershipHook<E>>>) {
        *self.core.hook.borrow_mut() = hook;
    }
}

impl<E: 'static> fmt::Debug for MaSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaSet")
            .field("id", &self.core.id)
            .field("len", &self.core.store.borrow().len())
            .field("listeners", &self.core.listeners)
            .finish()
    }
}

/// Cursor returned by [`MaSet::cursor`].
pub struct SetCursor<'a, E: 'static> {
    set: &'a MaSet<E>,
    order: Vec<SlotKey>,
    position: usize,
    current: Option<SlotKey>,
    expected_mod_count: u64,
}

impl<E: Clone + 'static> SetCursor<'_, E> {
    fn check(&self) -> Result<()> {
        if self.set.core.store.borrow().mod_count() != self.expected_mod_count {
            return Err(Error::illegal_state(
                StateErrorKind::ConcurrentModification,
                "set modified outside this cursor",
            ));
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<E>> {
        self.check()?;
        let store = self.set.core.store.borrow();
        while let Some(&slot) = self.order.get(self.position) {
            self.position += 1;
            if let Some(element) = store.key(slot) {
                self.current = Some(slot);
                return Ok(Some(element.clone()));
            }
        }
        self.current = None;
        Ok(None)
    }

    /// Remove the element returned by the last [`next`](Self::next).
    pub fn remove(&mut self) -> Result<()> {
        self.check()?;
        let slot = self.current.take().ok_or_else(|| {
            Error::illegal_state(StateErrorKind::NoCurrentElement, "no element to remove")
        })?;
        let batch = Batch::begin(self.set.core.id);
        self.set.core.detach_slot(&batch, slot)?;
        self.expected_mod_count = self.set.core.store.borrow().mod_count();
        batch.finish()
    }
}
