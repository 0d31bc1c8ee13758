//! Membership hooks: the seam association ends use to mirror a collection.

use omkit_core::Result;

/// Told about every element that enters or leaves a set or list.
///
/// Hooks run synchronously inside the mutating operation, after the
/// structural change and before any listener is notified. A hook may mutate
/// other collections; those changes join the current batch as implicit
/// events. A failing hook aborts the operation and the queued events.
pub trait MembershipHook<E> {
    fn attached(&self, element: &E) -> Result<()>;

    fn detached(&self, element: &E) -> Result<()>;
}
