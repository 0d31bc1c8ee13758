//! Listener traits and registration lists.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use omkit_core::Result;

use crate::event::{ElementEvent, ListElementEvent, MapElementEvent};

/// Observer of a set.
pub trait ElementListener<E> {
    fn modified(&self, event: &ElementEvent<E>) -> Result<()>;
}

/// Observer of a list.
pub trait ListElementListener<E> {
    fn modified(&self, event: &ListElementEvent<E>) -> Result<()>;
}

/// Observer of a map.
pub trait MapElementListener<K, V> {
    fn modified(&self, event: &MapElementEvent<K, V>) -> Result<()>;
}

impl<E, F> ElementListener<E> for F
where
    F: Fn(&ElementEvent<E>) -> Result<()>,
{
    fn modified(&self, event: &ElementEvent<E>) -> Result<()> {
        self(event)
    }
}

impl<E, F> ListElementListener<E> for F
where
    F: Fn(&ListElementEvent<E>) -> Result<()>,
{
    fn modified(&self, event: &ListElementEvent<E>) -> Result<()> {
        self(event)
    }
}

impl<K, V, F> MapElementListener<K, V> for F
where
    F: Fn(&MapElementEvent<K, V>) -> Result<()>,
{
    fn modified(&self, event: &MapElementEvent<K, V>) -> Result<()> {
        self(event)
    }
}

/// Registration list shared between a collection and its queued deliveries.
pub(crate) struct Listeners<L: ?Sized> {
    inner: Rc<RefCell<Vec<Rc<L>>>>,
}

impl<L: ?Sized> Clone for Listeners<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<L: ?Sized> fmt::Debug for Listeners<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.inner.borrow().len())
            .finish()
    }
}

impl<L: ?Sized> Listeners<L> {
    pub(crate) fn add(&self, listener: Rc<L>) {
        self.inner.borrow_mut().push(listener);
    }

    /// Remove by `Rc` identity. Only the first registration is removed.
    pub(crate) fn remove(&self, listener: &Rc<L>) -> bool {
        let mut inner = self.inner.borrow_mut();
        match inner
            .iter()
            .position(|l| std::ptr::addr_eq(Rc::as_ptr(l), Rc::as_ptr(listener)))
        {
            Some(pos) => {
                inner.remove(pos);
                true
            }
            None => {
                tracing::warn!("Removing a listener that was never registered");
                false
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// The registrations as of now. Removals made while the snapshot is
    /// being notified do not affect it.
    pub(crate) fn snapshot(&self) -> Vec<Rc<L>> {
        self.inner.borrow().clone()
    }
}

// ============================================================================
// EventRecorder
// ============================================================================

/// Listener that appends the compact `Display` form of every event it sees.
///
/// ```
/// use std::rc::Rc;
/// use omkit_collection::{ElementListener, EventRecorder, MaSet};
///
/// let set = MaSet::<String>::new();
/// let recorder = EventRecorder::new();
/// set.add_element_listener(Rc::new(recorder.clone()) as Rc<dyn ElementListener<String>>);
/// set.add("a".to_string()).unwrap();
/// assert_eq!(recorder.take(), "attached(element=a)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    log: Rc<RefCell<String>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return everything recorded so far and start over.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn peek(&self) -> String {
        self.log.borrow().clone()
    }

    /// Append one event. Used by listener impls outside this crate.
    pub fn record(&self, event: &dyn fmt::Display) {
        self.log.borrow_mut().push_str(&event.to_string());
    }
}

impl<E: fmt::Display> ElementListener<E> for EventRecorder {
    fn modified(&self, event: &ElementEvent<E>) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

impl<E: fmt::Display> ListElementListener<E> for EventRecorder {
    fn modified(&self, event: &ListElementEvent<E>) -> Result<()> {
        self.record(event);
        Ok(())
    }
}

impl<K: fmt::Display, V: fmt::Display> MapElementListener<K, V> for EventRecorder {
    fn modified(&self, event: &MapElementEvent<K, V>) -> Result<()> {
        self.record(event);
        Ok(())
    }
}
