use std::rc::Rc;

use slotmap::SlotMap;

use super::{HashIndex, SlotKey};
use crate::comparator::EqualityComparator;
use crate::options::BidiType;

struct ListSlot<E> {
    element: E,
    hash: u64,
    indexed: bool,
    image: Option<E>,
}

/// Outcome of rehashing one list element.
pub(crate) struct ListResume<E> {
    pub(crate) image: E,
    /// Index of the element before the eviction.
    pub(crate) position: usize,
    /// The evicted copy and its index.
    pub(crate) victim: Option<(usize, E)>,
    /// Index of the element after the eviction.
    pub(crate) new_position: usize,
}

/// Positional storage with an optional uniqueness index.
///
/// Only elements the bidi mode applies to are indexed; everything else is
/// found by scanning.
pub(crate) struct ListElements<E> {
    slots: SlotMap<SlotKey, ListSlot<E>>,
    order: Vec<SlotKey>,
    comparator: Rc<dyn EqualityComparator<E>>,
    bidi: BidiType,
    index: HashIndex,
    suspended: Vec<SlotKey>,
    mod_count: u64,
}

impl<E> ListElements<E> {
    pub(crate) fn new(comparator: Rc<dyn EqualityComparator<E>>, bidi: BidiType) -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
            comparator,
            bidi,
            index: HashIndex::new(),
            suspended: Vec::new(),
            mod_count: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub(crate) fn get(&self, index: usize) -> Option<&E> {
        self.order.get(index).map(|&s| &self.slots[s].element)
    }

    pub(crate) fn element(&self, slot: SlotKey) -> Option<&E> {
        self.slots.get(slot).map(|s| &s.element)
    }

    pub(crate) fn position(&self, slot: SlotKey) -> Option<usize> {
        self.order.iter().position(|&s| s == slot)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &E> + '_ {
        self.order.iter().map(|&s| &self.slots[s].element)
    }

    pub(crate) fn equals(&self, a: &E, b: &E) -> bool {
        self.comparator.equals(a, b)
    }

    pub(crate) fn is_unique(&self, element: &E) -> bool {
        self.bidi.applies_to(self.comparator.is_null(element))
    }

    /// The slot holding the unique copy of `element`, if uniqueness applies.
    pub(crate) fn find_unique(&self, element: &E) -> Option<SlotKey> {
        if !self.is_unique(element) {
            return None;
        }
        let slots = &self.slots;
        self.index
            .find(self.comparator.hash(element), |s| {
                self.comparator.equals(&slots[s].element, element)
            })
            .or_else(|| {
                self.suspended
                    .iter()
                    .copied()
                    .find(|&s| self.comparator.equals(&slots[s].element, element))
            })
    }

    pub(crate) fn index_of(&self, element: &E) -> Option<usize> {
        if self.is_unique(element) {
            return self.find_unique(element).and_then(|s| self.position(s));
        }
        self.iter().position(|e| self.comparator.equals(e, element))
    }

    pub(crate) fn last_index_of(&self, element: &E) -> Option<usize> {
        if self.is_unique(element) {
            return self.index_of(element);
        }
        self.order
            .iter()
            .rposition(|&s| self.comparator.equals(&self.slots[s].element, element))
    }

    /// Insert at `index`. Uniqueness must already have been resolved.
    pub(crate) fn insert(&mut self, index: usize, element: E) -> SlotKey {
        let hash = self.comparator.hash(&element);
        let indexed = self.is_unique(&element);
        let slot = self.slots.insert(ListSlot {
            element,
            hash,
            indexed,
            image: None,
        });
        self.order.insert(index, slot);
        if indexed {
            self.index.insert(hash, slot);
        }
        self.mod_count += 1;
        slot
    }

    pub(crate) fn remove_at(&mut self, index: usize) -> Option<E> {
        let slot = *self.order.get(index)?;
        self.order.remove(index);
        self.release(slot)
    }

    pub(crate) fn remove_slot(&mut self, slot: SlotKey) -> Option<(usize, E)> {
        let index = self.position(slot)?;
        self.order.remove(index);
        self.release(slot).map(|e| (index, e))
    }

    fn release(&mut self, slot: SlotKey) -> Option<E> {
        let removed = self.slots.remove(slot)?;
        if removed.image.is_some() {
            self.suspended.retain(|&s| s != slot);
        } else if removed.indexed {
            self.index.remove(removed.hash, slot);
        }
        self.mod_count += 1;
        Some(removed.element)
    }

    pub(crate) fn replace_at(&mut self, index: usize, element: E) -> Option<E> {
        let slot = *self.order.get(index)?;
        let hash = self.comparator.hash(&element);
        let indexed = self.is_unique(&element);
        let entry = self.slots.get_mut(slot)?;
        if entry.image.take().is_some() {
            self.suspended.retain(|&s| s != slot);
        } else if entry.indexed {
            self.index.remove(entry.hash, slot);
        }
        entry.hash = hash;
        entry.indexed = indexed;
        if indexed {
            self.index.insert(hash, slot);
        }
        self.mod_count += 1;
        Some(std::mem::replace(&mut entry.element, element))
    }

    pub(crate) fn clear(&mut self) -> Vec<E> {
        let order = std::mem::take(&mut self.order);
        let out = order
            .into_iter()
            .filter_map(|s| self.slots.remove(s).map(|slot| slot.element))
            .collect::<Vec<_>>();
        self.index.clear();
        self.suspended.clear();
        if !out.is_empty() {
            self.mod_count += 1;
        }
        out
    }

    // ------------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------------

    pub(crate) fn suspend(&mut self, slot: SlotKey, image: E) -> bool {
        let Some(entry) = self.slots.get_mut(slot) else {
            return false;
        };
        if !entry.indexed || entry.image.is_some() {
            return false;
        }
        self.index.remove(entry.hash, slot);
        entry.image = Some(image);
        self.suspended.push(slot);
        true
    }

    /// # Panics
    ///
    /// Panics if the new bucket still holds an equal element after one
    /// eviction.
    pub(crate) fn resume(&mut self, slot: SlotKey) -> Option<ListResume<E>> {
        let image = self.slots.get_mut(slot)?.image.take()?;
        self.suspended.retain(|&s| s != slot);
        let position = self.position(slot)?;
        let (hash, indexed) = {
            let element = &self.slots[slot].element;
            (self.comparator.hash(element), self.is_unique(element))
        };
        {
            let entry = &mut self.slots[slot];
            entry.hash = hash;
            entry.indexed = indexed;
        }
        let mut victim = None;
        if indexed {
            victim = self
                .colliding(slot)
                .and_then(|other| self.remove_slot(other));
            assert!(
                self.colliding(slot).is_none(),
                "rehash of one element collided with more than one occupant"
            );
            self.index.insert(hash, slot);
        }
        let new_position = match &victim {
            Some((at, _)) if *at < position => position - 1,
            _ => position,
        };
        Some(ListResume {
            image,
            position,
            victim,
            new_position,
        })
    }

    fn colliding(&self, slot: SlotKey) -> Option<SlotKey> {
        let slots = &self.slots;
        let element = &slots[slot].element;
        self.index.find(slots[slot].hash, |s| {
            s != slot && self.comparator.equals(&slots[s].element, element)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{DefaultComparator, KeyComparator};

    fn unique() -> ListElements<&'static str> {
        ListElements::new(Rc::new(DefaultComparator), BidiType::AllValues)
    }

    fn contents<E: Clone>(list: &ListElements<E>) -> Vec<E> {
        list.iter().cloned().collect()
    }

    #[test]
    fn test_positional_insert_and_remove() {
        let mut l = unique();
        l.insert(0, "b");
        l.insert(0, "a");
        l.insert(2, "c");
        assert_eq!(contents(&l), vec!["a", "b", "c"]);
        assert_eq!(l.index_of(&"c"), Some(2));
        assert_eq!(l.remove_at(1), Some("b"));
        assert!(l.find_unique(&"b").is_none());
        assert_eq!(contents(&l), vec!["a", "c"]);
    }

    #[test]
    fn test_non_unique_list_scans() {
        let mut l: ListElements<i32> =
            ListElements::new(Rc::new(DefaultComparator), BidiType::None);
        l.insert(0, 1);
        l.insert(1, 2);
        l.insert(2, 1);
        assert!(l.find_unique(&1).is_none());
        assert_eq!(l.index_of(&1), Some(0));
        assert_eq!(l.last_index_of(&1), Some(2));
    }

    #[test]
    fn test_replace_at_reindexes() {
        let mut l = unique();
        l.insert(0, "a");
        assert_eq!(l.replace_at(0, "z"), Some("a"));
        assert!(l.find_unique(&"a").is_none());
        assert_eq!(l.index_of(&"z"), Some(0));
    }

    #[test]
    fn test_resume_evicts_earlier_copy() {
        let mut l: ListElements<String> = ListElements::new(
            Rc::new(KeyComparator::new(|s: &String| s.chars().next())),
            BidiType::AllValues,
        );
        l.insert(0, "a".to_string());
        let moving = l.insert(1, "x".to_string());
        assert!(l.suspend(moving, "x".to_string()));
        l.slots[moving].element = "a2".to_string();

        let resumed = l.resume(moving).unwrap();
        assert_eq!(resumed.image, "x");
        assert_eq!(resumed.position, 1);
        assert_eq!(resumed.victim, Some((0, "a".to_string())));
        assert_eq!(resumed.new_position, 0);
        assert_eq!(contents(&l), vec!["a2".to_string()]);
    }

    #[test]
    fn test_clear() {
        let mut l = unique();
        l.insert(0, "a");
        l.insert(1, "b");
        assert_eq!(l.clear(), vec!["a", "b"]);
        assert_eq!(l.len(), 0);
        assert!(l.find_unique(&"a").is_none());
    }
}
