use hashbrown::HashTable;

use super::SlotKey;

/// Hash index from element hash to slot.
///
/// Equality is supplied by the caller on every lookup, so the index can be
/// shared between key and value sides and between comparators.
#[derive(Debug, Default)]
pub(crate) struct HashIndex {
    table: HashTable<(u64, SlotKey)>,
}

impl HashIndex {
    pub(crate) fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn find(&self, hash: u64, mut eq: impl FnMut(SlotKey) -> bool) -> Option<SlotKey> {
        self.table
            .find(hash, |&(h, slot)| h == hash && eq(slot))
            .map(|&(_, slot)| slot)
    }

    /// The caller guarantees no equal entry is present.
    pub(crate) fn insert(&mut self, hash: u64, slot: SlotKey) {
        self.table.insert_unique(hash, (hash, slot), |&(h, _)| h);
    }

    pub(crate) fn remove(&mut self, hash: u64, slot: SlotKey) -> bool {
        match self.table.find_entry(hash, |&(h, s)| h == hash && s == slot) {
            Ok(entry) => {
                entry.remove();
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_find_insert_remove() {
        let mut slots: SlotMap<SlotKey, &str> = SlotMap::with_key();
        let a = slots.insert("a");
        let b = slots.insert("b");
        let mut index = HashIndex::new();
        index.insert(7, a);
        index.insert(7, b);
        assert_eq!(index.len(), 2);

        assert_eq!(index.find(7, |s| slots[s] == "b"), Some(b));
        assert_eq!(index.find(8, |s| slots[s] == "b"), None);

        assert!(index.remove(7, a));
        assert!(!index.remove(7, a));
        assert_eq!(index.find(7, |s| slots[s] == "a"), None);
        assert_eq!(index.len(), 1);

        index.clear();
        assert_eq!(index.len(), 0);
    }
}
