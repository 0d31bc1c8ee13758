//! The managed map.
//!
//! Keys follow the key options (hash, insertion or sorted layout). With a
//! bidi value policy the map is injective: putting a value held under
//! another key first detaches that entry.

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use omkit_core::{Error, Result, StateErrorKind};

use crate::comparator::{DefaultComparator, EqualityComparator};
use crate::dispatch::{Batch, next_collection_id};
use crate::event::MapElementEvent;
use crate::frozen::{FrozenContext, FrozenHost};
use crate::hook::MembershipHook;
use crate::listener::{Listeners, MapElementListener};
use crate::options::{BidiType, CollectionOptions};
use crate::store::{BaseEntries, EntryResume, SlotKey};

/// Frozen-context host for the key side of a map.
struct KeyHost<K: 'static, V: 'static> {
    map: Weak<MapCore<K, V>>,
}

/// Frozen-context host for the value side of a bidi map.
struct ValueHost<K: 'static, V: 'static> {
    map: Weak<MapCore<K, V>>,
}

struct MapCore<K: 'static, V: 'static> {
    id: u64,
    keys: CollectionOptions<K>,
    values: CollectionOptions<V>,
    store: RefCell<BaseEntries<K, V>>,
    listeners: Listeners<dyn MapElementListener<K, V>>,
    key_hook: RefCell<Option<Rc<dyn MembershipHook<K>>>>,
    value_hook: RefCell<Option<Rc<dyn MembershipHook<V>>>>,
    key_host: Rc<dyn FrozenHost<K>>,
    value_host: Rc<dyn FrozenHost<V>>,
}

impl<K: Clone + 'static, V: Clone + 'static> MapCore<K, V> {
    fn key_context(&self) -> FrozenContext<K> {
        FrozenContext::single(Rc::downgrade(&self.key_host))
    }

    fn value_context(&self) -> FrozenContext<V> {
        FrozenContext::single(Rc::downgrade(&self.value_host))
    }

    fn notify(&self, batch: &Batch, event: MapElementEvent<K, V>) {
        batch.notify(&self.listeners, event, |l, e| l.modified(e));
    }

    fn entered(&self, slot: SlotKey, key: &K, value: &V) -> Result<()> {
        self.entered_key(key)?;
        self.entered_value(slot, value)
    }

    fn entered_key(&self, key: &K) -> Result<()> {
        if let Some(freezer) = self.keys.comparator.freezer() {
            freezer.freeze(key, self.key_context());
        }
        let hook = self.key_hook.borrow().clone();
        match hook {
            Some(hook) => hook.attached(key),
            None => Ok(()),
        }
    }

    fn entered_value(&self, slot: SlotKey, value: &V) -> Result<()> {
        if let Some(freezer) = self.values.comparator.freezer() {
            if self.store.borrow().is_value_indexed(slot) {
                freezer.freeze(value, self.value_context());
            }
        }
        let hook = self.value_hook.borrow().clone();
        match hook {
            Some(hook) => hook.attached(value),
            None => Ok(()),
        }
    }

    fn left(&self, key: &K, value: &V) -> Result<()> {
        self.left_key(key)?;
        self.left_value(value)
    }

    fn left_key(&self, key: &K) -> Result<()> {
        if let Some(freezer) = self.keys.comparator.freezer() {
            freezer.unfreeze(key, &self.key_context());
        }
        let hook = self.key_hook.borrow().clone();
        match hook {
            Some(hook) => hook.detached(key),
            None => Ok(()),
        }
    }

    fn left_value(&self, value: &V) -> Result<()> {
        if let Some(freezer) = self.values.comparator.freezer() {
            freezer.unfreeze(value, &self.value_context());
        }
        let hook = self.value_hook.borrow().clone();
        match hook {
            Some(hook) => hook.detached(value),
            None => Ok(()),
        }
    }

    fn detach_slot(&self, batch: &Batch, slot: SlotKey, implicit: bool) -> Result<Option<(K, V)>> {
        let removed = self.store.borrow_mut().remove(slot);
        let Some((key, value)) = removed else {
            return Ok(None);
        };
        self.notify(batch, MapElementEvent::detach(key.clone(), value.clone(), implicit));
        self.left(&key, &value)?;
        Ok(Some((key, value)))
    }

    fn put(&self, batch: &Batch, key: K, value: V) -> Result<Option<V>> {
        let (existing, conflict) = {
            let store = self.store.borrow();
            let existing = store.find_key(&key);
            if let Some(slot) = existing {
                if let Some(old) = store.value(slot) {
                    if store.values_equal(old, &value) {
                        return Ok(Some(old.clone()));
                    }
                }
            }
            let conflict = store.bidi_conflict(&value).filter(|&c| Some(c) != existing);
            (existing, conflict)
        };
        if let Some(conflict) = conflict {
            self.detach_slot(batch, conflict, true)?;
        }
        let implicit = !batch.is_explicit();
        match existing {
            Some(slot) => {
                let (stored_key, old) = {
                    let mut store = self.store.borrow_mut();
                    let stored_key = store.key(slot).cloned();
                    (stored_key, store.replace_value(slot, value.clone()))
                };
                let (Some(stored_key), Some(old)) = (stored_key, old) else {
                    return Ok(None);
                };
                self.notify(
                    batch,
                    MapElementEvent::replace(
                        (stored_key.clone(), old.clone()),
                        implicit,
                        (stored_key, value.clone()),
                        implicit,
                    ),
                );
                self.left_value(&old)?;
                self.entered_value(slot, &value)?;
                Ok(Some(old))
            }
            None => {
                let slot = self.store.borrow_mut().insert(key.clone(), value.clone());
                self.notify(batch, MapElementEvent::attach(key.clone(), value.clone(), implicit));
                self.entered(slot, &key, &value)?;
                Ok(None)
            }
        }
    }

    fn resume_key(&self, slot: SlotKey) -> Result<()> {
        let batch = Batch::begin_implicit(self.id);
        let resumed = self.store.borrow_mut().resume_key(slot);
        let current = {
            let store = self.store.borrow();
            store.entry(slot).map(|(k, v)| (k.clone(), v.clone()))
        };
        if let (Some(EntryResume { image, victim }), Some((key, value))) = (resumed, current) {
            match victim {
                None => self.notify(
                    &batch,
                    MapElementEvent::replace((image, value.clone()), true, (key, value), true),
                ),
                Some((victim_key, victim_value)) => {
                    self.notify(&batch, MapElementEvent::detach(image, value.clone(), true));
                    self.notify(
                        &batch,
                        MapElementEvent::replace(
                            (victim_key.clone(), victim_value.clone()),
                            true,
                            (key, value),
                            true,
                        ),
                    );
                    self.left(&victim_key, &victim_value)?;
                }
            }
        }
        batch.finish()
    }

    fn resume_value(&self, slot: SlotKey) -> Result<()> {
        let batch = Batch::begin_implicit(self.id);
        let resumed = self.store.borrow_mut().resume_value(slot);
        let current = {
            let store = self.store.borrow();
            store.entry(slot).map(|(k, v)| (k.clone(), v.clone()))
        };
        if let (Some(EntryResume { image, victim }), Some((key, value))) = (resumed, current) {
            match victim {
                None => self.notify(
                    &batch,
                    MapElementEvent::replace((key.clone(), image), true, (key, value), true),
                ),
                Some((victim_key, victim_value)) => {
                    self.notify(&batch, MapElementEvent::detach(key.clone(), image, true));
                    self.notify(
                        &batch,
                        MapElementEvent::replace(
                            (victim_key.clone(), victim_value.clone()),
                            true,
                            (key, value),
                            true,
                        ),
                    );
                    self.left(&victim_key, &victim_value)?;
                }
            }
        }
        batch.finish()
    }
}

impl<K: Clone + 'static, V: Clone + 'static> FrozenHost<K> for KeyHost<K, V> {
    fn suspend(&self, key: &K) -> Option<SlotKey> {
        let map = self.map.upgrade()?;
        let freezer = map.keys.comparator.freezer()?;
        let image = freezer.snapshot(key);
        let mut store = map.store.borrow_mut();
        let slot = store.find_key(key)?;
        store.suspend_key(slot, image).then_some(slot)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn resume(&self, slot: SlotKey) -> Result<()> {
        match self.map.upgrade() {
            Some(map) => map.resume_key(slot),
            None => Ok(()),
        }
    }
}

impl<K: Clone + 'static, V: Clone + 'static> FrozenHost<V> for ValueHost<K, V> {
    fn suspend(&self, value: &V) -> Option<SlotKey> {
        let map = self.map.upgrade()?;
        let freezer = map.values.comparator.freezer()?;
        let image = freezer.snapshot(value);
        let mut store = map.store.borrow_mut();
        let slot = store.bidi_conflict(value)?;
        store.suspend_value(slot, image).then_some(slot)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn resume(&self, slot: SlotKey) -> Result<()> {
        match self.map.upgrade() {
            Some(map) => map.resume_value(slot),
            None => Ok(()),
        }
    }
}

/// A map that reports every entry change.
///
/// ```
/// use std::rc::Rc;
/// use omkit_collection::{
///     BidiType, CollectionOptions, EventRecorder, MaMap, MapElementListener,
/// };
///
/// let map = MaMap::with_options(
///     CollectionOptions::default(),
///     CollectionOptions::default().bidi(BidiType::AllValues),
/// )
/// .unwrap();
/// map.put("k1", "v").unwrap();
/// let recorder = EventRecorder::new();
/// map.add_map_element_listener(Rc::new(recorder.clone()) as Rc<dyn MapElementListener<&str, &str>>);
/// map.put("k2", "v").unwrap();
/// assert_eq!(
///     recorder.take(),
///     "detached(key=k1,value=v)attached(key=k2,value=v)"
/// );
/// ```
pub struct MaMap<K: 'static, V: 'static> {
    core: Rc<MapCore<K, V>>,
}

impl<K: 'static, V: 'static> Clone for MaMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<K, V> Default for MaMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + Hash + Eq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MaMap<K, V>
where
    K: Clone + Hash + Eq + 'static,
    V: Clone + Hash + Eq + 'static,
{
    pub fn new() -> Self {
        Self::from_parts(
            CollectionOptions::default(),
            CollectionOptions::default(),
            Rc::new(DefaultComparator),
        )
    }
}

impl<K: Clone + 'static, V: Clone + 'static> MaMap<K, V> {
    /// Build from key and value options. The value side needs an equality
    /// comparator; its bidi policy makes the map injective.
    pub fn with_options(keys: CollectionOptions<K>, values: CollectionOptions<V>) -> Result<Self> {
        let comparator = values.require_equality("values")?;
        Ok(Self::from_parts(keys, values, comparator))
    }

    fn from_parts(
        keys: CollectionOptions<K>,
        values: CollectionOptions<V>,
        comparator: Rc<dyn EqualityComparator<V>>,
    ) -> Self {
        let store = BaseEntries::new(
            keys.comparator.clone(),
            keys.order,
            Some((comparator, values.bidi)),
        );
        let core = Rc::new_cyclic(|this: &Weak<MapCore<K, V>>| MapCore {
            id: next_collection_id(),
            keys,
            values,
            store: RefCell::new(store),
            listeners: Listeners::default(),
            key_hook: RefCell::new(None),
            value_hook: RefCell::new(None),
            key_host: Rc::new(KeyHost { map: this.clone() }) as Rc<dyn FrozenHost<K>>,
            value_host: Rc::new(ValueHost { map: this.clone() }) as Rc<dyn FrozenHost<V>>,
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
        self.core.values.bidi
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

    pub fn get(&self, key: &K) -> Option<V> {
        let store = self.core.store.borrow();
        store.find_key(key).and_then(|s| store.value(s).cloned())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.core.store.borrow().find_key(key).is_some()
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.core.store.borrow().find_value(value).is_some()
    }

    /// The key holding `value`. Uses the inverse index when the bidi policy
    /// applies to `value`, a scan otherwise.
    pub fn get_key_by_value(&self, value: &V) -> Option<K> {
        let store = self.core.store.borrow();
        store.find_value(value).and_then(|s| store.key(s).cloned())
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        let store = self.core.store.borrow();
        store
            .slots_in_order()
            .into_iter()
            .filter_map(|s| store.entry(s).map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    pub fn is_suspended(&self) -> bool {
        self.core.store.borrow().has_suspended()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Associate `value` with `key`, returning the previous value.
    ///
    /// Putting a value equal (under the value comparator) to the current one
    /// changes nothing and fires nothing.
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.core.keys.check("key", &key)?;
        self.core.values.check("value", &value)?;
        let batch = Batch::begin(self.core.id);
        let old = self.core.put(&batch, key, value)?;
        batch.finish()?;
        Ok(old)
    }

    /// Put every entry in one batch.
    ///
    /// Later entries win over earlier ones with an equal key, and (under a
    /// bidi policy) over earlier ones with an equal value.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<()> {
        let entries: Vec<(K, V)> = entries.into_iter().collect();
        for (key, value) in &entries {
            self.core.keys.check("key", key)?;
            self.core.values.check("value", value)?;
        }
        let entries = {
            let store = self.core.store.borrow();
            let keys = &self.core.keys.comparator;
            let mut out: Vec<(K, V)> = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let unique_value = store.indexes_value(&value);
                out.retain(|(k, v)| {
                    !(keys.equals(k, &key) || (unique_value && store.values_equal(v, &value)))
                });
                out.push((key, value));
            }
            out
        };
        if entries.is_empty() {
            return Ok(());
        }
        let batch = Batch::begin(self.core.id);
        for (key, value) in entries {
            self.core.put(&batch, key, value)?;
        }
        batch.finish()
    }

    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let Some(slot) = self.core.store.borrow().find_key(key) else {
            return Ok(None);
        };
        let batch = Batch::begin(self.core.id);
        let removed = self.core.detach_slot(&batch, slot, !batch.is_explicit())?;
        batch.finish()?;
        Ok(removed.map(|(_, v)| v))
    }

    /// Remove the entry holding `value`, returning its key.
    pub fn remove_by_value(&self, value: &V) -> Result<Option<K>> {
        let Some(slot) = self.core.store.borrow().find_value(value) else {
            return Ok(None);
        };
        let batch = Batch::begin(self.core.id);
        let removed = self.core.detach_slot(&batch, slot, !batch.is_explicit())?;
        batch.finish()?;
        Ok(removed.map(|(k, _)| k))
    }

    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) -> Result<bool> {
        let doomed: Vec<SlotKey> = {
            let store = self.core.store.borrow();
            store
                .slots_in_order()
                .into_iter()
                .filter(|&s| store.entry(s).is_some_and(|(k, v)| !keep(k, v)))
                .collect()
        };
        if doomed.is_empty() {
            return Ok(false);
        }
        let batch = Batch::begin(self.core.id);
        let implicit = !batch.is_explicit();
        for slot in doomed {
            self.core.detach_slot(&batch, slot, implicit)?;
        }
        batch.finish()?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let batch = Batch::begin(self.core.id);
        let removed = self.core.store.borrow_mut().clear();
        let implicit = !batch.is_explicit();
        for (key, value) in removed {
            self.core
                .notify(&batch, MapElementEvent::detach(key.clone(), value.clone(), implicit));
            self.core.left(&key, &value)?;
        }
        batch.finish()
    }

    pub fn cursor(&self) -> MapCursor<'_, K, V> {
        let store = self.core.store.borrow();
        MapCursor {
            map: self,
            order: store.slots_in_order(),
            position: 0,
            current: None,
            expected_mod_count: store.mod_count(),
        }
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn add_map_element_listener(&self, listener: Rc<dyn MapElementListener<K, V>>) {
        self.core.listeners.add(listener);
    }

    pub fn remove_map_element_listener(&self, listener: &Rc<dyn MapElementListener<K, V>>) -> bool {
        self.core.listeners.remove(listener)
    }

    pub fn set_key_hook(&self, hook: Option<Rc<dyn MembershipHook<K>>>) {
        *self.core.key_hook.borrow_mut() = hook;
    }

    pub fn set_value_hook(&self, hook: Option<Rc<dyn MembershipHook<V>>>) {
        *self.core.value_hook.borrow_mut() = hook;
    }
}

impl<K: 'static, V: 'static> fmt::Debug for MaMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaMap")
            .field("id", &self.core.id)
            .field("len", &self.core.store.borrow().len())
            .field("bidi", &self.core.values.bidi)
            .finish()
    }
}

/// Cursor returned by [`MaMap::cursor`].
pub struct MapCursor<'a, K: 'static, V: 'static> {
    map: &'a MaMap<K, V>,
    order: Vec<SlotKey>,
    position: usize,
    current: Option<SlotKey>,
    expected_mod_count: u64,
}

impl<K: Clone + 'static, V: Clone + 'static> MapCursor<'_, K, V> {
    fn check(&self) -> Result<()> {
        if self.map.core.store.borrow().mod_count() != self.expected_mod_count {
            return Err(Error::illegal_state(
                StateErrorKind::ConcurrentModification,
                "map modified outside this cursor",
            ));
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<(K, V)>> {
        self.check()?;
        let store = self.map.core.store.borrow();
        while let Some(&slot) = self.order.get(self.position) {
            self.position += 1;
            if let Some((k, v)) = store.entry(slot) {
                self.current = Some(slot);
                return Ok(Some((k.clone(), v.clone())));
            }
        }
        self.current = None;
        Ok(None)
    }

    pub fn remove(&mut self) -> Result<()> {
        self.check()?;
        let slot = self.current.take().ok_or_else(|| {
            Error::illegal_state(StateErrorKind::NoCurrentElement, "no entry to remove")
        })?;
        let batch = Batch::begin(self.map.core.id);
        self.map
            .core
            .detach_slot(&batch, slot, !batch.is_explicit())?;
        self.expected_mod_count = self.map.core.store.borrow().mod_count();
        batch.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{DefaultComparator, FrozenEqualityComparator, NaturalOrder, NullableComparator};
    use crate::listener::EventRecorder;
    use crate::testing::Unstable;
    use omkit_core::PropertyVersion;
    use proptest::prelude::*;
    use std::collections::{HashMap, HashSet};

    fn recorded<K, V>(map: &MaMap<K, V>) -> EventRecorder
    where
        K: fmt::Display + Clone + 'static,
        V: fmt::Display + Clone + 'static,
    {
        let recorder = EventRecorder::new();
        map.add_map_element_listener(Rc::new(recorder.clone()) as Rc<dyn MapElementListener<K, V>>);
        recorder
    }

    fn bidi_map<K, V>() -> MaMap<K, V>
    where
        K: Clone + Hash + Eq + 'static,
        V: Clone + Hash + Eq + 'static,
    {
        MaMap::with_options(
            CollectionOptions::default().insertion_ordered(),
            CollectionOptions::default().bidi(BidiType::AllValues),
        )
        .unwrap()
    }

    #[test]
    fn test_put_get_replace_remove() {
        let map = MaMap::new();
        let log = recorded(&map);
        assert_eq!(map.put("a", 1).unwrap(), None);
        assert_eq!(map.put("a", 2).unwrap(), Some(1));
        assert_eq!(map.get(&"a"), Some(2));
        assert_eq!(map.remove(&"a").unwrap(), Some(2));
        assert_eq!(map.remove(&"a").unwrap(), None);
        assert_eq!(
            log.take(),
            "attached(key=a,value=1)detached(key=a,value=1)attached(key=a,value=2)detached(key=a,value=2)"
        );
    }

    #[test]
    fn test_put_equal_value_is_silent() {
        let map = MaMap::new();
        map.put("a", 1).unwrap();
        let log = recorded(&map);
        assert_eq!(map.put("a", 1).unwrap(), Some(1));
        assert_eq!(log.take(), "");
    }

    #[test]
    fn test_bidi_put_moves_value_to_new_key() {
        let map = bidi_map();
        map.put("k1", "v").unwrap();
        let flags = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&flags);
        let listener: Rc<dyn MapElementListener<&'static str, &'static str>> =
            Rc::new(move |e: &MapElementEvent<&'static str, &'static str>| -> Result<()> {
                sink.borrow_mut().push((
                    e.is_implicit(PropertyVersion::Detach),
                    e.is_implicit(PropertyVersion::Attach),
                ));
                Ok(())
            });
        map.add_map_element_listener(listener);
        let log = recorded(&map);

        map.put("k2", "v").unwrap();
        assert_eq!(log.take(), "detached(key=k1,value=v)attached(key=k2,value=v)");
        assert_eq!(*flags.borrow(), vec![(true, false), (false, false)]);
        assert_eq!(map.entries(), vec![("k2", "v")]);
        assert_eq!(map.get_key_by_value(&"v"), Some("k2"));
    }

    #[test]
    fn test_bidi_put_over_existing_key_evicts_other_holder() {
        let map = bidi_map();
        map.put_all([("k1", "v"), ("k2", "w")]).unwrap();
        let log = recorded(&map);
        assert_eq!(map.put("k2", "v").unwrap(), Some("w"));
        assert_eq!(
            log.take(),
            "detached(key=k1,value=v)detached(key=k2,value=w)attached(key=k2,value=v)"
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_put_all_keeps_last_duplicate() {
        let map = bidi_map();
        let log = recorded(&map);
        map.put_all([("a", 1), ("b", 2), ("a", 3), ("c", 2)]).unwrap();
        assert_eq!(log.take(), "attached(key=a,value=3)attached(key=c,value=2)");
        assert_eq!(map.entries(), vec![("a", 3), ("c", 2)]);
    }

    #[test]
    fn test_non_null_values_allow_repeated_nulls() {
        let map = MaMap::with_options(
            CollectionOptions::default(),
            CollectionOptions::new(NullableComparator(DefaultComparator)).bidi(BidiType::NonNullValues),
        )
        .unwrap();
        map.put(1, None).unwrap();
        map.put(2, None).unwrap();
        map.put(3, Some("x")).unwrap();
        map.put(4, Some("x")).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get_key_by_value(&Some("x")), Some(4));
        assert!(map.contains_value(&None));
    }

    #[test]
    fn test_value_order_comparator_is_rejected() {
        let err = MaMap::<i32, i32>::with_options(
            CollectionOptions::default(),
            CollectionOptions::sorted(NaturalOrder),
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_remove_by_value_and_retain() {
        let map = bidi_map();
        map.put_all([("a", 1), ("b", 2), ("c", 3)]).unwrap();
        assert_eq!(map.remove_by_value(&2).unwrap(), Some("b"));
        assert_eq!(map.remove_by_value(&9).unwrap(), None);
        let log = recorded(&map);
        assert!(map.retain(|_, v| *v > 1).unwrap());
        assert_eq!(log.take(), "detached(key=a,value=1)");
        assert_eq!(map.keys(), vec!["c"]);
        assert_eq!(map.values(), vec![3]);
    }

    #[test]
    fn test_sorted_keys() {
        let map = MaMap::with_options(CollectionOptions::sorted(NaturalOrder), CollectionOptions::default())
            .unwrap();
        map.put_all([(3, "c"), (1, "a"), (2, "b")]).unwrap();
        assert_eq!(map.keys(), vec![1, 2, 3]);
        let log = recorded(&map);
        map.clear().unwrap();
        assert_eq!(
            log.take(),
            "detached(key=1,value=a)detached(key=2,value=b)detached(key=3,value=c)"
        );
    }

    #[test]
    fn test_unstable_key_rehash_and_collision() {
        let map: MaMap<Unstable, i32> = MaMap::with_options(
            CollectionOptions::new(FrozenEqualityComparator(DefaultComparator)).insertion_ordered(),
            CollectionOptions::default(),
        )
        .unwrap();
        let a = Unstable::new("a");
        let b = Unstable::new("b");
        map.put_all([(a.clone(), 1), (b.clone(), 2)]).unwrap();
        let log = recorded(&map);

        a.set_val("c").unwrap();
        assert_eq!(
            log.take(),
            "detached(key=unstable(a),value=1)attached(key=unstable(c),value=1)"
        );

        a.set_val("b").unwrap();
        assert_eq!(
            log.take(),
            "detached(key=unstable(c),value=1)\
             detached(key=unstable(b),value=2)attached(key=unstable(b),value=1)"
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Unstable::new("b")), Some(1));
        assert_eq!(b.hosts(), 0);
    }

    #[test]
    fn test_unstable_bidi_value_rehash() {
        let map: MaMap<i32, Unstable> = MaMap::with_options(
            CollectionOptions::default().insertion_ordered(),
            CollectionOptions::new(FrozenEqualityComparator(DefaultComparator)).bidi(BidiType::AllValues),
        )
        .unwrap();
        let a = Unstable::new("a");
        let b = Unstable::new("b");
        map.put_all([(1, a.clone()), (2, b.clone())]).unwrap();
        assert_eq!(a.hosts(), 1);
        let log = recorded(&map);

        a.set_val("z").unwrap();
        assert_eq!(
            log.take(),
            "detached(key=1,value=unstable(a))attached(key=1,value=unstable(z))"
        );
        assert_eq!(map.get_key_by_value(&Unstable::new("z")), Some(1));

        a.set_val("b").unwrap();
        assert_eq!(
            log.take(),
            "detached(key=1,value=unstable(z))\
             detached(key=2,value=unstable(b))attached(key=1,value=unstable(b))"
        );
        assert_eq!(map.keys(), vec![1]);
    }

    #[test]
    fn test_cursor() {
        let map = MaMap::with_options(
            CollectionOptions::<i32>::default().insertion_ordered(),
            CollectionOptions::<i32>::default(),
        )
        .unwrap();
        map.put_all([(1, 10), (2, 20)]).unwrap();
        let mut cursor = map.cursor();
        assert_eq!(cursor.next().unwrap(), Some((1, 10)));
        cursor.remove().unwrap();
        assert_eq!(cursor.next().unwrap(), Some((2, 20)));
        assert_eq!(cursor.next().unwrap(), None);
        assert!(cursor.remove().is_err());
        assert_eq!(map.entries(), vec![(2, 20)]);
    }

    proptest! {
        #[test]
        fn prop_bidi_map_stays_injective(
            ops in proptest::collection::vec((any::<bool>(), 0u8..6, 0u8..6), 0..64)
        ) {
            let map = bidi_map();
            let mut model: HashMap<u8, u8> = HashMap::new();
            for (put, key, value) in ops {
                if put {
                    model.retain(|k, v| *k == key || *v != value);
                    model.insert(key, value);
                    map.put(key, value).unwrap();
                } else {
                    prop_assert_eq!(map.remove(&key).unwrap(), model.remove(&key));
                }
            }
            let mut entries = map.entries();
            entries.sort_unstable();
            let mut expected: Vec<(u8, u8)> = model.into_iter().collect();
            expected.sort_unstable();
            prop_assert_eq!(&entries, &expected);
            let values: HashSet<u8> = entries.iter().map(|(_, v)| *v).collect();
            prop_assert_eq!(values.len(), entries.len());
        }
    }

    #[test]
    fn test_forbidden_null_key_or_value_leaves_map_untouched() {
        let map = MaMap::with_options(
            CollectionOptions::new(NullableComparator(DefaultComparator)).forbid_null(),
            CollectionOptions::new(NullableComparator(DefaultComparator)).forbid_null(),
        )
        .unwrap();
        map.put(Some(1), Some("a")).unwrap();
        let events = Rc::new(std::cell::Cell::new(0));
        let count = Rc::clone(&events);
        let listener: Rc<dyn MapElementListener<Option<i32>, Option<&str>>> =
            Rc::new(move |_: &MapElementEvent<Option<i32>, Option<&str>>| -> Result<()> {
                count.set(count.get() + 1);
                Ok(())
            });
        map.add_map_element_listener(listener);

        let err = map.put(None, Some("b")).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("key"));
        let err = map.put(Some(1), None).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("value"));
        assert!(map.put_all([(Some(2), Some("c")), (Some(3), None)]).is_err());
        assert_eq!(events.get(), 0);
        assert_eq!(map.entries(), vec![(Some(1), Some("a"))]);
    }
}
