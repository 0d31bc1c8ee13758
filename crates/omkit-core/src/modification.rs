//! Shape of a change: which halves of a slot an event carries.

use std::fmt;

/// The half of a slot change an accessor refers to.
///
/// `Detach` is the pre-image (what left the slot), `Attach` the post-image
/// (what entered it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyVersion {
    Detach,
    Attach,
}

/// The closed set of modification shapes: {ATTACH}, {DETACH} or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationType {
    /// Something entered a slot.
    Attach,
    /// Something left a slot.
    Detach,
    /// One value left and another entered, reported together.
    Replace,
}

impl ModificationType {
    /// Build the shape from which halves are present.
    ///
    /// Returns `None` when neither half is present.
    pub const fn from_halves(detached: bool, attached: bool) -> Option<Self> {
        match (detached, attached) {
            (true, true) => Some(ModificationType::Replace),
            (true, false) => Some(ModificationType::Detach),
            (false, true) => Some(ModificationType::Attach),
            (false, false) => None,
        }
    }

    /// Whether this modification carries the given half.
    pub const fn contains(self, version: PropertyVersion) -> bool {
        match (self, version) {
            (ModificationType::Replace, _) => true,
            (ModificationType::Attach, PropertyVersion::Attach) => true,
            (ModificationType::Detach, PropertyVersion::Detach) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationType::Attach => write!(f, "ATTACH"),
            ModificationType::Detach => write!(f, "DETACH"),
            ModificationType::Replace => write!(f, "ATTACH|DETACH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_halves() {
        assert_eq!(
            ModificationType::from_halves(true, true),
            Some(ModificationType::Replace)
        );
        assert_eq!(
            ModificationType::from_halves(false, true),
            Some(ModificationType::Attach)
        );
        assert_eq!(ModificationType::from_halves(false, false), None);
    }

    #[test]
    fn test_contains() {
        assert!(ModificationType::Replace.contains(PropertyVersion::Detach));
        assert!(ModificationType::Replace.contains(PropertyVersion::Attach));
        assert!(!ModificationType::Attach.contains(PropertyVersion::Detach));
        assert!(ModificationType::Detach.contains(PropertyVersion::Detach));
    }
}
