use std::rc::Rc;

use slotmap::SlotMap;

use super::{HashIndex, SlotKey, SortedIndex};
use crate::comparator::{EqualityComparator, UnifiedComparator};
use crate::options::{BidiType, KeyOrder};

struct Slot<K, V> {
    key: K,
    value: V,
    key_hash: u64,
    value_hash: u64,
    value_indexed: bool,
    // Some while the key (resp. value) is released from its index.
    key_image: Option<K>,
    value_image: Option<V>,
    prev: Option<SlotKey>,
    next: Option<SlotKey>,
}

enum KeyIndex {
    Hash(HashIndex),
    Sorted(SortedIndex),
}

struct ValueSide<V> {
    comparator: Rc<dyn EqualityComparator<V>>,
    bidi: BidiType,
    index: HashIndex,
    suspended: Vec<SlotKey>,
}

impl<V> ValueSide<V> {
    fn indexes(&self, value: &V) -> bool {
        self.bidi.applies_to(self.comparator.is_null(value))
    }
}

/// What a rehash did: the pre-image of the moved half, and the entry it
/// evicted, if the new bucket was occupied.
pub(crate) struct EntryResume<I, K, V> {
    pub(crate) image: I,
    pub(crate) victim: Option<(K, V)>,
}

/// Key/value slots with a key index (hash or sorted) and, for
/// bidirectional maps, an inverse value index.
pub(crate) struct BaseEntries<K, V> {
    slots: SlotMap<SlotKey, Slot<K, V>>,
    keys: KeyIndex,
    key_cmp: UnifiedComparator<K>,
    order: KeyOrder,
    head: Option<SlotKey>,
    tail: Option<SlotKey>,
    suspended_keys: Vec<SlotKey>,
    values: Option<ValueSide<V>>,
    mod_count: u64,
}

impl<K, V> BaseEntries<K, V> {
    pub(crate) fn new(
        key_cmp: UnifiedComparator<K>,
        order: KeyOrder,
        values: Option<(Rc<dyn EqualityComparator<V>>, BidiType)>,
    ) -> Self {
        let keys = if key_cmp.is_sorted() {
            KeyIndex::Sorted(SortedIndex::new())
        } else {
            KeyIndex::Hash(HashIndex::new())
        };
        Self {
            slots: SlotMap::with_key(),
            keys,
            key_cmp,
            order,
            head: None,
            tail: None,
            suspended_keys: Vec::new(),
            values: values.map(|(comparator, bidi)| ValueSide {
                comparator,
                bidi,
                index: HashIndex::new(),
                suspended: Vec::new(),
            }),
            mod_count: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub(crate) fn has_suspended(&self) -> bool {
        !self.suspended_keys.is_empty()
            || self.values.as_ref().is_some_and(|v| !v.suspended.is_empty())
    }

    pub(crate) fn key(&self, slot: SlotKey) -> Option<&K> {
        self.slots.get(slot).map(|s| &s.key)
    }

    pub(crate) fn value(&self, slot: SlotKey) -> Option<&V> {
        self.slots.get(slot).map(|s| &s.value)
    }

    pub(crate) fn entry(&self, slot: SlotKey) -> Option<(&K, &V)> {
        self.slots.get(slot).map(|s| (&s.key, &s.value))
    }

    /// Whether the value half of `slot` is currently in the inverse index.
    pub(crate) fn is_value_indexed(&self, slot: SlotKey) -> bool {
        self.slots.get(slot).is_some_and(|s| s.value_indexed)
    }

    /// Slot whose key equals `key`, falling back to a scan of suspended keys.
    pub(crate) fn find_key(&self, key: &K) -> Option<SlotKey> {
        let slots = &self.slots;
        let cmp = &self.key_cmp;
        let indexed = match &self.keys {
            KeyIndex::Hash(index) => index.find(cmp.hash(key), |s| cmp.equals(&slots[s].key, key)),
            KeyIndex::Sorted(index) => index.find(|s| cmp.compare(&slots[s].key, key)),
        };
        indexed.or_else(|| {
            self.suspended_keys
                .iter()
                .copied()
                .find(|&s| cmp.equals(&slots[s].key, key))
        })
    }

    /// The slot a bidirectional put of `value` must evict, if any.
    pub(crate) fn bidi_conflict(&self, value: &V) -> Option<SlotKey> {
        let side = self.values.as_ref()?;
        if !side.indexes(value) {
            return None;
        }
        let slots = &self.slots;
        side.index
            .find(side.comparator.hash(value), |s| {
                side.comparator.equals(&slots[s].value, value)
            })
            .or_else(|| {
                side.suspended
                    .iter()
                    .copied()
                    .find(|&s| side.comparator.equals(&slots[s].value, value))
            })
    }

    /// First slot (in iteration order) holding a value equal to `value`.
    pub(crate) fn find_value(&self, value: &V) -> Option<SlotKey> {
        if let Some(slot) = self.bidi_conflict(value) {
            return Some(slot);
        }
        let side = self.values.as_ref()?;
        self.slots_in_order()
            .into_iter()
            .find(|&s| side.comparator.equals(&self.slots[s].value, value))
    }

    /// Whether the inverse index would hold `value`.
    pub(crate) fn indexes_value(&self, value: &V) -> bool {
        self.values.as_ref().is_some_and(|side| side.indexes(value))
    }

    pub(crate) fn values_equal(&self, a: &V, b: &V) -> bool {
        self.values
            .as_ref()
            .is_some_and(|side| side.comparator.equals(a, b))
    }

    /// Insert an entry whose key and (bidirectional) value are known to be
    /// absent.
    pub(crate) fn insert(&mut self, key: K, value: V) -> SlotKey {
        let key_hash = self.key_cmp.hash(&key);
        let (value_hash, value_indexed) = match &self.values {
            Some(side) => (side.comparator.hash(&value), side.indexes(&value)),
            None => (0, false),
        };
        let slot = self.slots.insert(Slot {
            key,
            value,
            key_hash,
            value_hash,
            value_indexed,
            key_image: None,
            value_image: None,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index_key(slot);
        if value_indexed {
            if let Some(side) = &mut self.values {
                side.index.insert(value_hash, slot);
            }
        }
        self.mod_count += 1;
        tracing::trace!(len = self.slots.len(), "Entry inserted");
        slot
    }

    pub(crate) fn remove(&mut self, slot: SlotKey) -> Option<(K, V)> {
        let (key_suspended, value_suspended, value_indexed, value_hash, prev, next) = {
            let s = self.slots.get(slot)?;
            (
                s.key_image.is_some(),
                s.value_image.is_some(),
                s.value_indexed,
                s.value_hash,
                s.prev,
                s.next,
            )
        };
        if key_suspended {
            self.suspended_keys.retain(|&s| s != slot);
        } else {
            self.unindex_key(slot);
        }
        if let Some(side) = &mut self.values {
            if value_suspended {
                side.suspended.retain(|&s| s != slot);
            } else if value_indexed {
                side.index.remove(value_hash, slot);
            }
        }
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        let removed = self.slots.remove(slot)?;
        self.mod_count += 1;
        tracing::trace!(len = self.slots.len(), "Entry removed");
        Some((removed.key, removed.value))
    }

    /// Swap the value of `slot`, keeping the inverse index in step.
    pub(crate) fn replace_value(&mut self, slot: SlotKey, value: V) -> Option<V> {
        let entry = self.slots.get_mut(slot)?;
        if let Some(side) = &mut self.values {
            if entry.value_image.take().is_some() {
                side.suspended.retain(|&s| s != slot);
            } else if entry.value_indexed {
                side.index.remove(entry.value_hash, slot);
            }
            entry.value_hash = side.comparator.hash(&value);
            entry.value_indexed = side.indexes(&value);
            if entry.value_indexed {
                side.index.insert(entry.value_hash, slot);
            }
        }
        Some(std::mem::replace(&mut entry.value, value))
    }

    // ------------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------------

    /// Release the key of `slot` from the index, remembering `image` as its
    /// pre-mutation state.
    pub(crate) fn suspend_key(&mut self, slot: SlotKey, image: K) -> bool {
        match self.slots.get(slot) {
            Some(s) if s.key_image.is_none() => {}
            _ => return false,
        }
        self.unindex_key(slot);
        self.slots[slot].key_image = Some(image);
        self.suspended_keys.push(slot);
        true
    }

    /// Rehash the key of `slot`, evicting the entry its new bucket collides
    /// with.
    ///
    /// # Panics
    ///
    /// Panics if the new bucket still holds an equal key after one eviction.
    pub(crate) fn resume_key(&mut self, slot: SlotKey) -> Option<EntryResume<K, K, V>> {
        let image = self.slots.get_mut(slot)?.key_image.take()?;
        self.suspended_keys.retain(|&s| s != slot);
        let hash = self.key_cmp.hash(&self.slots[slot].key);
        self.slots[slot].key_hash = hash;
        let victim = self
            .colliding_key(slot)
            .and_then(|victim| self.remove(victim));
        assert!(
            self.colliding_key(slot).is_none(),
            "rehash of one key collided with more than one occupant"
        );
        self.index_key(slot);
        Some(EntryResume { image, victim })
    }

    pub(crate) fn suspend_value(&mut self, slot: SlotKey, image: V) -> bool {
        let Some(side) = &mut self.values else {
            return false;
        };
        let Some(entry) = self.slots.get_mut(slot) else {
            return false;
        };
        if !entry.value_indexed || entry.value_image.is_some() {
            return false;
        }
        side.index.remove(entry.value_hash, slot);
        side.suspended.push(slot);
        entry.value_image = Some(image);
        true
    }

    /// # Panics
    ///
    /// Panics if the new bucket still holds an equal value after one eviction.
    pub(crate) fn resume_value(&mut self, slot: SlotKey) -> Option<EntryResume<V, K, V>> {
        let image = self.slots.get_mut(slot)?.value_image.take()?;
        let side = self.values.as_mut()?;
        side.suspended.retain(|&s| s != slot);
        let (hash, indexed) = {
            let value = &self.slots[slot].value;
            (side.comparator.hash(value), side.indexes(value))
        };
        {
            let entry = &mut self.slots[slot];
            entry.value_hash = hash;
            entry.value_indexed = indexed;
        }
        let victim = if indexed {
            self.colliding_value(slot)
                .and_then(|victim| self.remove(victim))
        } else {
            None
        };
        if indexed {
            assert!(
                self.colliding_value(slot).is_none(),
                "rehash of one value collided with more than one occupant"
            );
            if let Some(side) = &mut self.values {
                side.index.insert(hash, slot);
            }
        }
        Some(EntryResume { image, victim })
    }

    // ------------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------------

    /// Slots in iteration order.
    ///
    /// Sorted layouts list suspended keys after the indexed ones.
    pub(crate) fn slots_in_order(&self) -> Vec<SlotKey> {
        match (&self.keys, self.order) {
            (KeyIndex::Sorted(index), _) => {
                let mut out = index.in_order();
                out.extend_from_slice(&self.suspended_keys);
                out
            }
            (KeyIndex::Hash(_), KeyOrder::Insertion) => {
                let mut out = Vec::with_capacity(self.slots.len());
                let mut cursor = self.head;
                while let Some(slot) = cursor {
                    out.push(slot);
                    cursor = self.slots[slot].next;
                }
                out
            }
            (KeyIndex::Hash(_), _) => self.slots.keys().collect(),
        }
    }

    /// Remove everything, returning the entries in iteration order.
    pub(crate) fn clear(&mut self) -> Vec<(K, V)> {
        let order = self.slots_in_order();
        let mut out = Vec::with_capacity(order.len());
        for slot in order {
            if let Some(s) = self.slots.remove(slot) {
                out.push((s.key, s.value));
            }
        }
        match &mut self.keys {
            KeyIndex::Hash(index) => index.clear(),
            KeyIndex::Sorted(index) => index.clear(),
        }
        if let Some(side) = &mut self.values {
            side.index.clear();
            side.suspended.clear();
        }
        self.suspended_keys.clear();
        self.head = None;
        self.tail = None;
        if !out.is_empty() {
            self.mod_count += 1;
        }
        out
    }

    // ------------------------------------------------------------------------
    // Index bookkeeping
    // ------------------------------------------------------------------------

    fn index_key(&mut self, slot: SlotKey) {
        let slots = &self.slots;
        let cmp = &self.key_cmp;
        match &mut self.keys {
            KeyIndex::Hash(index) => index.insert(slots[slot].key_hash, slot),
            KeyIndex::Sorted(index) => {
                let key = &slots[slot].key;
                index.insert(slot, |s| cmp.compare(&slots[s].key, key));
            }
        }
    }

    fn unindex_key(&mut self, slot: SlotKey) {
        let slots = &self.slots;
        let cmp = &self.key_cmp;
        match &mut self.keys {
            KeyIndex::Hash(index) => {
                index.remove(slots[slot].key_hash, slot);
            }
            KeyIndex::Sorted(index) => {
                // Finds the slot even if its key drifted without a
                // suspension window.
                let key = &slots[slot].key;
                index.remove(slot, |s| cmp.compare(&slots[s].key, key));
            }
        }
    }

    fn colliding_key(&self, slot: SlotKey) -> Option<SlotKey> {
        let slots = &self.slots;
        let cmp = &self.key_cmp;
        let key = &slots[slot].key;
        match &self.keys {
            KeyIndex::Hash(index) => index.find(slots[slot].key_hash, |s| {
                s != slot && cmp.equals(&slots[s].key, key)
            }),
            KeyIndex::Sorted(index) => index
                .find(|s| cmp.compare(&slots[s].key, key))
                .filter(|&s| s != slot),
        }
    }

    fn colliding_value(&self, slot: SlotKey) -> Option<SlotKey> {
        let side = self.values.as_ref()?;
        let slots = &self.slots;
        let value = &slots[slot].value;
        side.index.find(slots[slot].value_hash, |s| {
            s != slot && side.comparator.equals(&slots[s].value, value)
        })
    }
}

impl<K, V> BaseEntries<K, V> {
    #[cfg(test)]
    fn check_invariants(&self) {
        let indexed_keys = match &self.keys {
            KeyIndex::Hash(index) => index.len(),
            KeyIndex::Sorted(index) => {
                let order = index.in_order();
                assert!(order.windows(2).all(|w| self
                    .key_cmp
                    .compare(&self.slots[w[0]].key, &self.slots[w[1]].key)
                    == std::cmp::Ordering::Less));
                index.len()
            }
        };
        assert_eq!(indexed_keys + self.suspended_keys.len(), self.slots.len());
        if let Some(side) = &self.values {
            let expected = self.slots.values().filter(|s| s.value_indexed).count();
            assert_eq!(side.index.len() + side.suspended.len(), expected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{DefaultComparator, KeyComparator, NaturalOrder};

    fn hash_entries() -> BaseEntries<&'static str, i32> {
        BaseEntries::new(
            UnifiedComparator::equality(DefaultComparator),
            KeyOrder::Insertion,
            Some((Rc::new(DefaultComparator), BidiType::AllValues)),
        )
    }

    fn keys(entries: &BaseEntries<&'static str, i32>) -> Vec<&'static str> {
        entries
            .slots_in_order()
            .into_iter()
            .map(|s| *entries.key(s).unwrap())
            .collect()
    }

    #[test]
    fn test_insert_find_remove_keeps_insertion_order() {
        let mut e = hash_entries();
        let a = e.insert("a", 1);
        e.insert("b", 2);
        e.insert("c", 3);
        assert_eq!(keys(&e), vec!["a", "b", "c"]);
        assert_eq!(e.find_key(&"b"), e.bidi_conflict(&2));
        assert_eq!(e.remove(a), Some(("a", 1)));
        assert_eq!(keys(&e), vec!["b", "c"]);
        assert!(e.find_key(&"a").is_none());
        e.check_invariants();
    }

    #[test]
    fn test_replace_value_reindexes() {
        let mut e = hash_entries();
        let a = e.insert("a", 1);
        assert_eq!(e.replace_value(a, 9), Some(1));
        assert!(e.bidi_conflict(&1).is_none());
        assert_eq!(e.bidi_conflict(&9), Some(a));
        e.check_invariants();
    }

    #[test]
    fn test_sorted_layout() {
        let mut e: BaseEntries<i32, ()> =
            BaseEntries::new(UnifiedComparator::order(NaturalOrder), KeyOrder::Sorted, None);
        for k in [5, 1, 3] {
            e.insert(k, ());
        }
        let order: Vec<i32> = e
            .slots_in_order()
            .into_iter()
            .map(|s| *e.key(s).unwrap())
            .collect();
        assert_eq!(order, vec![1, 3, 5]);
        assert!(e.find_key(&3).is_some());
        assert!(e.find_key(&4).is_none());
        e.check_invariants();
    }

    #[test]
    fn test_sorted_layout_under_churn() {
        let mut e: BaseEntries<i32, ()> =
            BaseEntries::new(UnifiedComparator::order(NaturalOrder), KeyOrder::Sorted, None);
        let slots: Vec<SlotKey> = (0..200).map(|i| e.insert((i * 37) % 200, ())).collect();
        for (i, &slot) in slots.iter().enumerate() {
            if i % 3 == 0 {
                e.remove(slot);
            }
        }
        e.check_invariants();
        let order: Vec<i32> = e
            .slots_in_order()
            .into_iter()
            .map(|s| *e.key(s).unwrap())
            .collect();
        let mut expected: Vec<i32> = (0..200)
            .filter(|i| i % 3 != 0)
            .map(|i| (i * 37) % 200)
            .collect();
        expected.sort_unstable();
        assert_eq!(order, expected);
        assert!(e.find_key(&37).is_some());
        assert!(e.find_key(&0).is_none());
    }

    #[test]
    fn test_suspend_and_resume_key_reports_victim() {
        // Keys compare by first letter so "a1" and "a2" collide.
        let mut e: BaseEntries<String, i32> = BaseEntries::new(
            UnifiedComparator::equality(KeyComparator::new(|s: &String| {
                s.chars().next()
            })),
            KeyOrder::Insertion,
            None,
        );
        let x = e.insert("x".to_string(), 1);
        let a = e.insert("a".to_string(), 2);
        assert!(e.suspend_key(x, "x".to_string()));
        assert!(e.has_suspended());
        // Still reachable through the fallback scan while suspended.
        assert_eq!(e.find_key(&"x".to_string()), Some(x));
        e.check_invariants();

        e.slots[x].key = "a-moved".to_string();
        let resumed = e.resume_key(x).unwrap();
        assert_eq!(resumed.image, "x");
        assert_eq!(resumed.victim, Some(("a".to_string(), 2)));
        assert!(e.key(a).is_none());
        assert_eq!(e.find_key(&"a".to_string()), Some(x));
        assert!(!e.has_suspended());
        e.check_invariants();
    }

    #[test]
    fn test_resume_without_suspension_is_none() {
        let mut e = hash_entries();
        let a = e.insert("a", 1);
        assert!(e.resume_key(a).is_none());
        assert!(e.resume_value(a).is_none());
    }

    #[test]
    fn test_clear_returns_entries_in_order() {
        let mut e = hash_entries();
        e.insert("a", 1);
        e.insert("b", 2);
        let before = e.mod_count();
        assert_eq!(e.clear(), vec![("a", 1), ("b", 2)]);
        assert_eq!(e.len(), 0);
        assert!(e.mod_count() > before);
        e.check_invariants();
    }
}
