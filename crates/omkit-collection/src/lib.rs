//! Managed collections for omkit.
//!
//! `omkit-collection` is the **collection layer**. It provides sets, lists and
//! maps that report every change as an event and keep themselves consistent
//! when their elements change underneath them.
//!
//! # Role In The Architecture
//!
//! - **Managed collections**: [`MaSet`], [`MaList`] and [`MaMap`] are
//!   handles over a shared core. Every mutation fires attach, detach or
//!   replace events, with each half marked implicit when the collection
//!   produced it as a side effect.
//! - **Bidi uniqueness**: lists and map values can be made unique
//!   ([`BidiType`]); re-adding a present element detaches its old slot first.
//! - **Frozen elements**: elements whose hash-relevant state may change
//!   carry a [`FrozenCell`]. Mutating them through [`FrozenCell::mutate`]
//!   rebuckets them in every collection that indexes them, with one event
//!   per collection.
//! - **Batches**: events are queued and delivered when the outermost
//!   operation finishes ([`Batch`]), so listeners see a settled graph.
//!
//! Collections are single-threaded (`Rc` based). Association ends in
//! `omkit-model` plug into them through [`MembershipHook`].

pub mod comparator;
pub mod dispatch;
pub mod event;
pub mod frozen;
pub mod hook;
pub mod list;
pub mod listener;
pub mod map;
pub mod options;
pub mod set;

mod store;

#[cfg(test)]
mod testing;

pub use comparator::{
    DefaultComparator, EqualityComparator, Freezable, Freezer, FrozenEqualityComparator,
    FrozenOrderComparator, IdentityComparator, KeyComparator, NaturalOrder, NullableComparator,
    OrderComparator, UnifiedComparator,
};
pub use dispatch::{Batch, LoadEventPolicy, LoadPhase, next_collection_id};
pub use event::{ElementEvent, ListElementEvent, MapElementEvent};
pub use frozen::{FrozenCell, FrozenContext};
pub use hook::MembershipHook;
pub use list::{ListCursor, MaList};
pub use listener::{ElementListener, EventRecorder, ListElementListener, MapElementListener};
pub use map::{MaMap, MapCursor};
pub use options::{BidiType, CollectionOptions, KeyOrder, Validator};
pub use set::{MaSet, SetCursor};
