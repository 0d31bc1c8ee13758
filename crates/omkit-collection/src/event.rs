//! Immutable event records.
//!
//! An event carries a detached half (pre-image), an attached half
//! (post-image), or both. Each half is independently marked implicit when
//! the collection produced it as a side effect rather than at the caller's
//! request.
//!
//! `Display` renders the compact form used throughout the tests:
//! `detached(key=k1,value=v)attached(key=k2,value=v)`.

use std::fmt;

use omkit_core::{ModificationType, PropertyVersion};

#[derive(Debug, Clone, PartialEq)]
struct Halves<P> {
    detached: Option<P>,
    attached: Option<P>,
    detached_implicit: bool,
    attached_implicit: bool,
}

impl<P> Halves<P> {
    fn attach(payload: P, implicit: bool) -> Self {
        Self {
            detached: None,
            attached: Some(payload),
            detached_implicit: false,
            attached_implicit: implicit,
        }
    }

    fn detach(payload: P, implicit: bool) -> Self {
        Self {
            detached: Some(payload),
            attached: None,
            detached_implicit: implicit,
            attached_implicit: false,
        }
    }

    fn replace(old: P, old_implicit: bool, new: P, new_implicit: bool) -> Self {
        Self {
            detached: Some(old),
            attached: Some(new),
            detached_implicit: old_implicit,
            attached_implicit: new_implicit,
        }
    }

    fn modification_type(&self) -> ModificationType {
        match (self.detached.is_some(), self.attached.is_some()) {
            (true, true) => ModificationType::Replace,
            (true, false) => ModificationType::Detach,
            _ => ModificationType::Attach,
        }
    }

    fn half(&self, version: PropertyVersion) -> Option<&P> {
        match version {
            PropertyVersion::Detach => self.detached.as_ref(),
            PropertyVersion::Attach => self.attached.as_ref(),
        }
    }

    fn is_implicit(&self, version: PropertyVersion) -> bool {
        match version {
            PropertyVersion::Detach => self.detached.is_some() && self.detached_implicit,
            PropertyVersion::Attach => self.attached.is_some() && self.attached_implicit,
        }
    }

    fn write(
        &self,
        f: &mut fmt::Formatter<'_>,
        body: impl Fn(&P, &mut fmt::Formatter<'_>) -> fmt::Result,
    ) -> fmt::Result {
        if let Some(p) = &self.detached {
            f.write_str("detached(")?;
            body(p, f)?;
            f.write_str(")")?;
        }
        if let Some(p) = &self.attached {
            f.write_str("attached(")?;
            body(p, f)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

// ============================================================================
// ElementEvent
// ============================================================================

/// A change of set membership.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementEvent<E> {
    halves: Halves<E>,
}

impl<E> ElementEvent<E> {
    pub fn attach(element: E, implicit: bool) -> Self {
        Self {
            halves: Halves::attach(element, implicit),
        }
    }

    pub fn detach(element: E, implicit: bool) -> Self {
        Self {
            halves: Halves::detach(element, implicit),
        }
    }

    pub fn replace(old: E, old_implicit: bool, new: E, new_implicit: bool) -> Self {
        Self {
            halves: Halves::replace(old, old_implicit, new, new_implicit),
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        self.halves.modification_type()
    }

    pub fn is_implicit(&self, version: PropertyVersion) -> bool {
        self.halves.is_implicit(version)
    }

    pub fn element(&self, version: PropertyVersion) -> Option<&E> {
        self.halves.half(version)
    }
}

impl<E: fmt::Display> fmt::Display for ElementEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.halves
            .write(f, |e, f| write!(f, "element={}", e))
    }
}

// ============================================================================
// ListElementEvent
// ============================================================================

/// A change of list content at an index.
///
/// Indexes refer to the list as it was when the half happened: a detached
/// index is the position before removal, an attached index the position
/// after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ListElementEvent<E> {
    halves: Halves<(usize, E)>,
}

impl<E> ListElementEvent<E> {
    pub fn attach(index: usize, element: E, implicit: bool) -> Self {
        Self {
            halves: Halves::attach((index, element), implicit),
        }
    }

    pub fn detach(index: usize, element: E, implicit: bool) -> Self {
        Self {
            halves: Halves::detach((index, element), implicit),
        }
    }

    pub fn replace(
        old: (usize, E),
        old_implicit: bool,
        new: (usize, E),
        new_implicit: bool,
    ) -> Self {
        Self {
            halves: Halves::replace(old, old_implicit, new, new_implicit),
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        self.halves.modification_type()
    }

    pub fn is_implicit(&self, version: PropertyVersion) -> bool {
        self.halves.is_implicit(version)
    }

    pub fn index(&self, version: PropertyVersion) -> Option<usize> {
        self.halves.half(version).map(|(i, _)| *i)
    }

    pub fn element(&self, version: PropertyVersion) -> Option<&E> {
        self.halves.half(version).map(|(_, e)| e)
    }
}

impl<E: fmt::Display> fmt::Display for ListElementEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.halves
            .write(f, |(i, e), f| write!(f, "index={},element={}", i, e))
    }
}

// ============================================================================
// MapElementEvent
// ============================================================================

/// A change of one map entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MapElementEvent<K, V> {
    halves: Halves<(K, V)>,
}

impl<K, V> MapElementEvent<K, V> {
    pub fn attach(key: K, value: V, implicit: bool) -> Self {
        Self {
            halves: Halves::attach((key, value), implicit),
        }
    }

    pub fn detach(key: K, value: V, implicit: bool) -> Self {
        Self {
            halves: Halves::detach((key, value), implicit),
        }
    }

    pub fn replace(old: (K, V), old_implicit: bool, new: (K, V), new_implicit: bool) -> Self {
        Self {
            halves: Halves::replace(old, old_implicit, new, new_implicit),
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        self.halves.modification_type()
    }

    pub fn is_implicit(&self, version: PropertyVersion) -> bool {
        self.halves.is_implicit(version)
    }

    pub fn key(&self, version: PropertyVersion) -> Option<&K> {
        self.halves.half(version).map(|(k, _)| k)
    }

    pub fn value(&self, version: PropertyVersion) -> Option<&V> {
        self.halves.half(version).map(|(_, v)| v)
    }
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for MapElementEvent<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.halves
            .write(f, |(k, v), f| write!(f, "key={},value={}", k, v))
    }
}
