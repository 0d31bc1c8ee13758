//! The managed list.
//!
//! With a bidi policy the list doubles as an ordered set: an element that
//! is already present elsewhere is implicitly detached from its old index
//! before it is attached at the requested one.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use omkit_core::{Error, Result, StateErrorKind};

use crate::comparator::{DefaultComparator, EqualityComparator, UnifiedComparator};
use crate::dispatch::{Batch, next_collection_id};
use crate::event::ListElementEvent;
use crate::frozen::{FrozenContext, FrozenHost};
use crate::hook::MembershipHook;
use crate::listener::{ListElementListener, Listeners};
use crate::options::{BidiType, CollectionOptions};
use crate::store::{ListElements, ListResume, SlotKey};

struct ListCore<E: 'static> {
    id: u64,
    this: Weak<ListCore<E>>,
    options: CollectionOptions<E>,
    store: RefCell<ListElements<E>>,
    listeners: Listeners<dyn ListElementListener<E>>,
    hook: RefCell<Option<Rc<dyn MembershipHook<E>>>>,
}

impl<E: Clone + 'static> ListCore<E> {
    fn context(&self) -> FrozenContext<E> {
        let host: Weak<dyn FrozenHost<E>> = self.this.clone();
        FrozenContext::single(host)
    }

    fn hook(&self) -> Option<Rc<dyn MembershipHook<E>>> {
        self.hook.borrow().clone()
    }

    fn notify(&self, batch: &Batch, event: ListElementEvent<E>) {
        batch.notify(&self.listeners, event, |l, e| l.modified(e));
    }

    fn entered(&self, element: &E) -> Result<()> {
        if let Some(freezer) = self.options.comparator.freezer() {
            if self.store.borrow().is_unique(element) {
                freezer.freeze(element, self.context());
            }
        }
        match self.hook() {
            Some(hook) => hook.attached(element),
            None => Ok(()),
        }
    }

    fn left(&self, element: &E) -> Result<()> {
        if let Some(freezer) = self.options.comparator.freezer() {
            freezer.unfreeze(element, &self.context());
        }
        match self.hook() {
            Some(hook) => hook.detached(element),
            None => Ok(()),
        }
    }

    fn check_index(&self, index: usize, inclusive: bool) -> Result<()> {
        let size = self.store.borrow().len();
        if index > size || (!inclusive && index == size) {
            return Err(Error::IndexOutOfBounds { index, size });
        }
        Ok(())
    }

    fn attach_at(&self, batch: &Batch, index: usize, element: E, implicit: bool) -> Result<()> {
        self.store.borrow_mut().insert(index, element.clone());
        tracing::trace!(collection = self.id, index, "Element attached");
        self.notify(batch, ListElementEvent::attach(index, element.clone(), implicit));
        self.entered(&element)
    }

    fn detach_at(&self, batch: &Batch, index: usize, implicit: bool) -> Result<Option<E>> {
        let removed = self.store.borrow_mut().remove_at(index);
        let Some(element) = removed else {
            return Ok(None);
        };
        tracing::trace!(collection = self.id, index, "Element detached");
        self.notify(batch, ListElementEvent::detach(index, element.clone(), implicit));
        self.left(&element)?;
        Ok(Some(element))
    }

    /// Remove the given positions, reporting them in ascending order with
    /// their original indexes.
    fn detach_positions(&self, batch: &Batch, mut positions: Vec<usize>, implicit: bool) -> Result<bool> {
        positions.sort_unstable();
        positions.dedup();
        let mut removed = Vec::with_capacity(positions.len());
        {
            let mut store = self.store.borrow_mut();
            for &index in positions.iter().rev() {
                if let Some(element) = store.remove_at(index) {
                    removed.push((index, element));
                }
            }
        }
        removed.reverse();
        let changed = !removed.is_empty();
        for (index, element) in removed {
            self.notify(batch, ListElementEvent::detach(index, element.clone(), implicit));
            self.left(&element)?;
        }
        Ok(changed)
    }

    /// Position of the copy a bidi insertion of `element` must evict.
    fn duplicate_of(&self, element: &E) -> Option<usize> {
        let store = self.store.borrow();
        store.find_unique(element).and_then(|s| store.position(s))
    }

    /// Drop earlier occurrences of unique elements, keeping the last one.
    fn dedup_keep_last(&self, elements: Vec<E>) -> Vec<E> {
        let store = self.store.borrow();
        let mut out: Vec<E> = Vec::with_capacity(elements.len());
        for element in elements {
            if store.is_unique(&element) {
                out.retain(|o| !(store.is_unique(o) && store.equals(o, &element)));
            }
            out.push(element);
        }
        out
    }
}

impl<E: Clone + 'static> FrozenHost<E> for ListCore<E> {
    fn suspend(&self, element: &E) -> Option<SlotKey> {
        let freezer = self.options.comparator.freezer()?;
        let mut store = self.store.borrow_mut();
        let slot = store.find_unique(element)?;
        store.suspend(slot, freezer.snapshot(element)).then_some(slot)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn resume(&self, slot: SlotKey) -> Result<()> {
        let batch = Batch::begin_implicit(self.id);
        let resumed = self.store.borrow_mut().resume(slot);
        let current = self.store.borrow().element(slot).cloned();
        if let (Some(resumed), Some(current)) = (resumed, current) {
            let ListResume {
                image,
                position,
                victim,
                new_position,
            } = resumed;
            match victim {
                None => self.notify(
                    &batch,
                    ListElementEvent::replace((position, image), true, (position, current), true),
                ),
                Some((at, victim)) => {
                    self.notify(&batch, ListElementEvent::detach(position, image, true));
                    self.notify(
                        &batch,
                        ListElementEvent::replace(
                            (at, victim.clone()),
                            true,
                            (new_position, current),
                            true,
                        ),
                    );
                    self.left(&victim)?;
                }
            }
        }
        batch.finish()
    }
}

/// A list that reports every positional change.
///
/// ```
/// use std::rc::Rc;
/// use omkit_collection::{
///     BidiType, CollectionOptions, DefaultComparator, EventRecorder, ListElementListener, MaList,
/// };
///
/// let list = MaList::with_options(
///     CollectionOptions::new(DefaultComparator).bidi(BidiType::AllValues),
/// )
/// .unwrap();
/// list.add_all(["A", "B"]).unwrap();
/// let recorder = EventRecorder::new();
/// list.add_list_element_listener(Rc::new(recorder.clone()) as Rc<dyn ListElementListener<&str>>);
/// list.push("A").unwrap();
/// assert_eq!(
///     recorder.take(),
///     "detached(index=0,element=A)attached(index=1,element=A)"
/// );
/// assert_eq!(list.to_vec(), vec!["B", "A"]);
/// ```
pub struct MaList<E: 'static> {
    core: Rc<ListCore<E>>,
}

impl<E: 'static> Clone for MaList<E> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<E: Clone + Hash + Eq + 'static> Default for MaList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Hash + Eq + 'static> MaList<E> {
    /// A list that allows duplicates.
    pub fn new() -> Self {
        Self::from_parts(CollectionOptions::default(), Rc::new(DefaultComparator))
    }

    /// A list in which every element is unique.
    pub fn unique() -> Self {
        Self::from_parts(
            CollectionOptions::default().bidi(BidiType::AllValues),
            Rc::new(DefaultComparator),
        )
    }
}

impl<E: Clone + 'static> MaList<E> {
    /// Build from options. Lists need an equality comparator; an order
    /// comparator is rejected.
    pub fn with_options(options: CollectionOptions<E>) -> Result<Self> {
        let comparator = options.require_equality("comparator")?;
        Ok(Self::from_parts(options, comparator))
    }

    /// A list over an equality comparator with the given uniqueness policy.
    pub fn with_comparator(
        comparator: impl EqualityComparator<E> + 'static,
        bidi: BidiType,
    ) -> Self {
        let comparator: Rc<dyn EqualityComparator<E>> = Rc::new(comparator);
        let options = CollectionOptions::from_comparator(UnifiedComparator::Equality(Rc::clone(
            &comparator,
        )))
        .bidi(bidi);
        Self::from_parts(options, comparator)
    }

    fn from_parts(
        options: CollectionOptions<E>,
        comparator: Rc<dyn EqualityComparator<E>>,
    ) -> Self {
        let store = ListElements::new(comparator, options.bidi);
        let core = Rc::new_cyclic(|this| ListCore {
            id: next_collection_id(),
            this: this.clone(),
            options,
            store: RefCell::new(store),
            listeners: Listeners::default(),
            hook: RefCell::new(None),
        });
        Self { core }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    pub fn bidi_type(&self) -> BidiType {
        self.core.options.bidi
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

    pub fn get(&self, index: usize) -> Option<E> {
        self.core.store.borrow().get(index).cloned()
    }

    pub fn contains(&self, element: &E) -> bool {
        self.index_of(element).is_some()
    }

    pub fn index_of(&self, element: &E) -> Option<usize> {
        self.core.store.borrow().index_of(element)
    }

    pub fn last_index_of(&self, element: &E) -> Option<usize> {
        self.core.store.borrow().last_index_of(element)
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.core.store.borrow().iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = E> {
        self.to_vec().into_iter()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn push(&self, element: E) -> Result<()> {
        self.insert(self.len(), element)
    }

    /// Insert at `index`.
    ///
    /// Under a bidi policy an equal element found at `j` is detached first
    /// (implicitly), and the element lands at `index - 1` when `j < index`.
    pub fn insert(&self, index: usize, element: E) -> Result<()> {
        self.core.check_index(index, true)?;
        self.core.options.check("element", &element)?;
        let batch = Batch::begin(self.core.id);
        let mut target = index;
        if let Some(j) = self.core.duplicate_of(&element) {
            self.core.detach_at(&batch, j, true)?;
            if j < index {
                target -= 1;
            }
        }
        self.core
            .attach_at(&batch, target, element, !batch.is_explicit())?;
        batch.finish()
    }

    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<bool> {
        self.insert_all(self.len(), elements)
    }

    /// Insert a run of elements starting at `index`.
    ///
    /// Duplicates within the run keep their last occurrence. Existing copies
    /// are detached first, in ascending order of their original indexes; the
    /// run is then attached at consecutive indexes.
    pub fn insert_all(&self, index: usize, elements: impl IntoIterator<Item = E>) -> Result<bool> {
        self.core.check_index(index, true)?;
        let elements: Vec<E> = elements.into_iter().collect();
        for element in &elements {
            self.core.options.check("element", element)?;
        }
        let elements = self.core.dedup_keep_last(elements);
        if elements.is_empty() {
            return Ok(false);
        }
        let batch = Batch::begin(self.core.id);
        let conflicts: Vec<usize> = elements
            .iter()
            .filter_map(|e| self.core.duplicate_of(e))
            .collect();
        let shift = conflicts.iter().filter(|&&j| j < index).count();
        self.core.detach_positions(&batch, conflicts, true)?;
        let implicit = !batch.is_explicit();
        for (offset, element) in elements.into_iter().enumerate() {
            self.core
                .attach_at(&batch, index - shift + offset, element, implicit)?;
        }
        batch.finish()?;
        Ok(true)
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// Under a bidi policy an equal element at another index `j` is detached
    /// first; the replace event then carries the old index and the
    /// post-eviction index.
    pub fn set(&self, index: usize, element: E) -> Result<E> {
        self.core.check_index(index, false)?;
        self.core.options.check("element", &element)?;
        let batch = Batch::begin(self.core.id);
        let mut target = index;
        if let Some(j) = self.core.duplicate_of(&element).filter(|&j| j != index) {
            self.core.detach_at(&batch, j, true)?;
            if j < index {
                target -= 1;
            }
        }
        let replaced = self
            .core
            .store
            .borrow_mut()
            .replace_at(target, element.clone());
        let old = replaced.ok_or_else(|| Error::IndexOutOfBounds {
            index: target,
            size: self.len(),
        })?;
        let implicit = !batch.is_explicit();
        self.core.notify(
            &batch,
            ListElementEvent::replace((index, old.clone()), implicit, (target, element.clone()), implicit),
        );
        self.core.left(&old)?;
        self.core.entered(&element)?;
        batch.finish()?;
        Ok(old)
    }

    pub fn remove_at(&self, index: usize) -> Result<E> {
        self.core.check_index(index, false)?;
        let batch = Batch::begin(self.core.id);
        let removed = self.core.detach_at(&batch, index, !batch.is_explicit())?;
        batch.finish()?;
        removed.ok_or(Error::IndexOutOfBounds {
            index,
            size: self.len(),
        })
    }

    /// Remove the first element equal to `element`.
    pub fn remove(&self, element: &E) -> Result<bool> {
        match self.index_of(element) {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Remove every element equal to one of `elements`.
    pub fn remove_all(&self, elements: &[E]) -> Result<bool> {
        let positions: Vec<usize> = {
            let store = self.core.store.borrow();
            store
                .iter()
                .enumerate()
                .filter(|(_, e)| elements.iter().any(|x| store.equals(e, x)))
                .map(|(i, _)| i)
                .collect()
        };
        self.detach_many(positions)
    }

    pub fn retain(&self, mut keep: impl FnMut(&E) -> bool) -> Result<bool> {
        let positions: Vec<usize> = {
            let store = self.core.store.borrow();
            store
                .iter()
                .enumerate()
                .filter(|(_, e)| !keep(e))
                .map(|(i, _)| i)
                .collect()
        };
        self.detach_many(positions)
    }

    pub fn clear(&self) -> Result<()> {
        let batch = Batch::begin(self.core.id);
        let removed = self.core.store.borrow_mut().clear();
        let implicit = !batch.is_explicit();
        for (index, element) in removed.into_iter().enumerate() {
            self.core
                .notify(&batch, ListElementEvent::detach(index, element.clone(), implicit));
            self.core.left(&element)?;
        }
        batch.finish()
    }

    fn detach_many(&self, positions: Vec<usize>) -> Result<bool> {
        if positions.is_empty() {
            return Ok(false);
        }
        let batch = Batch::begin(self.core.id);
        let changed = self
            .core
            .detach_positions(&batch, positions, !batch.is_explicit())?;
        batch.finish()?;
        Ok(changed)
    }

    pub fn cursor(&self) -> ListCursor<'_, E> {
        ListCursor {
            list: self,
            position: 0,
            current: None,
            expected_mod_count: self.core.store.borrow().mod_count(),
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn add_list_element_listener(&self, listener: Rc<dyn ListElementListener<E>>) {
        self.core.listeners.add(listener);
    }

    pub fn remove_list_element_listener(&self, listener: &Rc<dyn ListElementListener<E>>) -> bool {
        self.core.listeners.remove(listener)
    }

    pub fn set_membership_hook(&self, hook: Option<Rc<dyn MembershipHook<E>>>) {
        *self.core.hook.borrow_mut() = hook;
    }
}

impl<E: 'static> fmt::Debug for MaList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaList")
            .field("id", &self.core.id)
            .field("len", &self.core.store.borrow().len())
            .field("bidi", &self.core.options.bidi)
            .finish()
    }
}

/// Cursor returned by [`MaList::cursor`].
pub struct ListCursor<'a, E: 'static> {
    list: &'a MaList<E>,
    position: usize,
    current: Option<usize>,
    expected_mod_count: u64,
}

impl<E: Clone + 'static> ListCursor<'_, E> {
    fn check(&self) -> Result<()> {
        if self.list.core.store.borrow().mod_count() != self.expected_mod_count {
            return Err(Error::illegal_state(
                StateErrorKind::ConcurrentModification,
                "list modified outside this cursor",
            ));
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<E>> {
        self.check()?;
        let element = self.list.get(self.position);
        if element.is_some() {
            self.current = Some(self.position);
            self.position += 1;
        } else {
            self.current = None;
        }
        Ok(element)
    }

    pub fn remove(&mut self) -> Result<()> {
        self.check()?;
        let index = self.current.take().ok_or_else(|| {
            Error::illegal_state(StateErrorKind::NoCurrentElement, "no element to remove")
        })?;
        let batch = Batch::begin(self.list.core.id);
        self.list
            .core
            .detach_at(&batch, index, !batch.is_explicit())?;
        self.position = index;
        self.expected_mod_count = self.list.core.store.borrow().mod_count();
        batch.finish()
    }
}
