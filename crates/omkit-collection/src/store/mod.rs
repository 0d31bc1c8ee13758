//! Bucket store: slot storage plus the hash / sorted indexes over it.
//!
//! Slots live in a `SlotMap` so a slot key stays valid while its element is
//! released from the index during a suspension window. Indexes store slot
//! keys (with their hash, for the hash index) and never own elements.

mod elements;
mod entries;
mod index;
mod sorted;

pub(crate) use elements::{ListElements, ListResume};
pub(crate) use entries::{BaseEntries, EntryResume};
pub(crate) use index::HashIndex;
pub(crate) use sorted::SortedIndex;

slotmap::new_key_type! {
    /// Stable handle of one slot in a bucket store.
    pub(crate) struct SlotKey;
}
