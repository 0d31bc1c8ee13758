//! Fixtures shared by the unit tests of this crate.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use omkit_core::Result;

use crate::comparator::Freezable;
use crate::frozen::FrozenCell;

struct Inner {
    val: RefCell<String>,
    frozen: FrozenCell<Unstable>,
}

/// An element whose equality follows a mutable field.
#[derive(Clone)]
pub(crate) struct Unstable(Rc<Inner>);

impl Unstable {
    pub(crate) fn new(val: &str) -> Self {
        Self(Rc::new(Inner {
            val: RefCell::new(val.to_string()),
            frozen: FrozenCell::new(),
        }))
    }

    pub(crate) fn val(&self) -> String {
        self.0.val.borrow().clone()
    }

    pub(crate) fn set_val(&self, val: &str) -> Result<()> {
        self.0
            .frozen
            .mutate(self, || *self.0.val.borrow_mut() = val.to_string())
    }

    pub(crate) fn hosts(&self) -> usize {
        self.0.frozen.context().map_or(0, |ctx| ctx.host_count())
    }
}

impl Freezable for Unstable {
    fn frozen_cell(&self) -> &FrozenCell<Self> {
        &self.0.frozen
    }

    fn snapshot(&self) -> Self {
        Unstable::new(&self.val())
    }
}

impl PartialEq for Unstable {
    fn eq(&self, other: &Self) -> bool {
        *self.0.val.borrow() == *other.0.val.borrow()
    }
}

impl Eq for Unstable {}

impl Hash for Unstable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.val.borrow().hash(state);
    }
}

impl PartialOrd for Unstable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Unstable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.val().cmp(&other.val())
    }
}

impl fmt::Display for Unstable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unstable({})", self.0.val.borrow())
    }
}

impl fmt::Debug for Unstable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
