use std::cmp::Ordering;

use slotmap::SecondaryMap;

use super::SlotKey;

#[derive(Debug, Clone, Copy)]
struct Node {
    priority: u64,
    left: Option<SlotKey>,
    right: Option<SlotKey>,
}

/// Ordered index over slots, kept as a treap.
///
/// The index never sees keys. Every search takes a `locate` closure that
/// orders an indexed slot against the sought key, so one index serves any
/// `OrderComparator`. Lookup, insertion and removal take expected
/// O(log n) steps.
#[derive(Debug, Default)]
pub(crate) struct SortedIndex {
    nodes: SecondaryMap<SlotKey, Node>,
    root: Option<SlotKey>,
    seed: u64,
}

// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl SortedIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    /// The slot `locate` reports as `Equal`.
    pub(crate) fn find(&self, mut locate: impl FnMut(SlotKey) -> Ordering) -> Option<SlotKey> {
        let mut cursor = self.root;
        while let Some(slot) = cursor {
            cursor = match locate(slot) {
                Ordering::Less => self.nodes[slot].right,
                Ordering::Greater => self.nodes[slot].left,
                Ordering::Equal => return Some(slot),
            };
        }
        None
    }

    /// Index `slot`. `locate` orders an indexed slot against the new one.
    pub(crate) fn insert(&mut self, slot: SlotKey, mut locate: impl FnMut(SlotKey) -> Ordering) {
        self.seed = self.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        self.nodes.insert(
            slot,
            Node {
                priority: mix(self.seed),
                left: None,
                right: None,
            },
        );
        let root = self.root;
        let (below, above) = self.split(root, &mut |s| locate(s) != Ordering::Greater);
        let joined = self.merge(below, Some(slot));
        self.root = self.merge(joined, above);
    }

    /// Unindex `slot`. `locate` orders an indexed slot against the key
    /// `slot` was indexed under.
    ///
    /// A key that drifted since indexing is not found by search; the index
    /// is then rebuilt without it.
    pub(crate) fn remove(&mut self, slot: SlotKey, mut locate: impl FnMut(SlotKey) -> Ordering) -> bool {
        if !self.nodes.contains_key(slot) {
            return false;
        }
        let root = self.root;
        match self.detach(root, slot, &mut locate) {
            Some(root) => self.root = root,
            None => {
                let order: Vec<SlotKey> = self.in_order().into_iter().filter(|&s| s != slot).collect();
                self.rebuild(order);
            }
        }
        self.nodes.remove(slot);
        true
    }

    /// Slots in ascending order.
    pub(crate) fn in_order(&self) -> Vec<SlotKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cursor = self.root;
        loop {
            while let Some(slot) = cursor {
                stack.push(slot);
                cursor = self.nodes[slot].left;
            }
            let Some(slot) = stack.pop() else {
                break;
            };
            out.push(slot);
            cursor = self.nodes[slot].right;
        }
        out
    }

    fn split<F>(&mut self, tree: Option<SlotKey>, goes_below: &mut F) -> (Option<SlotKey>, Option<SlotKey>)
    where
        F: FnMut(SlotKey) -> bool,
    {
        let Some(top) = tree else {
            return (None, None);
        };
        if goes_below(top) {
            let right = self.nodes[top].right;
            let (below, above) = self.split(right, goes_below);
            self.nodes[top].right = below;
            (Some(top), above)
        } else {
            let left = self.nodes[top].left;
            let (below, above) = self.split(left, goes_below);
            self.nodes[top].left = above;
            (below, Some(top))
        }
    }

    // Every slot of `low` orders before every slot of `high`.
    fn merge(&mut self, low: Option<SlotKey>, high: Option<SlotKey>) -> Option<SlotKey> {
        match (low, high) {
            (None, tree) | (tree, None) => tree,
            (Some(l), Some(h)) => {
                if self.nodes[l].priority > self.nodes[h].priority {
                    let right = self.nodes[l].right;
                    self.nodes[l].right = self.merge(right, Some(h));
                    Some(l)
                } else {
                    let left = self.nodes[h].left;
                    self.nodes[h].left = self.merge(Some(l), left);
                    Some(h)
                }
            }
        }
    }

    /// New root of `tree` once `slot` is cut out, or `None` if the search
    /// path missed it.
    fn detach<F>(&mut self, tree: Option<SlotKey>, slot: SlotKey, locate: &mut F) -> Option<Option<SlotKey>>
    where
        F: FnMut(SlotKey) -> Ordering,
    {
        let top = tree?;
        if top == slot {
            let node = self.nodes[top];
            return Some(self.merge(node.left, node.right));
        }
        match locate(top) {
            Ordering::Less => {
                let right = self.nodes[top].right;
                self.nodes[top].right = self.detach(right, slot, locate)?;
            }
            Ordering::Greater => {
                let left = self.nodes[top].left;
                self.nodes[top].left = self.detach(left, slot, locate)?;
            }
            Ordering::Equal => return None,
        }
        Some(tree)
    }

    fn rebuild(&mut self, order: Vec<SlotKey>) {
        self.root = None;
        for slot in order {
            if let Some(node) = self.nodes.get_mut(slot) {
                node.left = None;
                node.right = None;
            }
            let root = self.root;
            self.root = self.merge(root, Some(slot));
        }
    }
}
