//! Association metadata.
//!
//! Associations are declared once, as `static` descriptors next to the
//! entity types, and never change at runtime. The ends in this crate carry a
//! reference to their descriptor; the registry links descriptors to their
//! inverses.

use omkit_collection::BidiType;

/// Multiplicity of an association, seen from its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// `Person::passport` mirrored by `Passport::holder`.
    OneToOne,
    /// `Employee::department`.
    #[default]
    ManyToOne,
    /// `Department::employees`.
    OneToMany,
    /// `Student::courses` mirrored by `Course::students`.
    ManyToMany,
}

impl AssociationKind {
    /// The kind the inverse side must declare.
    pub const fn inverse(self) -> Self {
        match self {
            AssociationKind::OneToOne => AssociationKind::OneToOne,
            AssociationKind::ManyToOne => AssociationKind::OneToMany,
            AssociationKind::OneToMany => AssociationKind::ManyToOne,
            AssociationKind::ManyToMany => AssociationKind::ManyToMany,
        }
    }

    /// Whether the owner holds a collection rather than a single reference.
    pub const fn is_collection(self) -> bool {
        matches!(self, AssociationKind::OneToMany | AssociationKind::ManyToMany)
    }
}

/// What a list end does when asked to add an element it already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DuplicatePolicy {
    /// The previous occupant is implicitly detached and the element moves.
    #[default]
    Evict,
    /// The call fails with an invalid-argument error and nothing changes.
    Reject,
}

/// Static description of one association end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationInfo {
    /// Field name on the owner.
    pub name: &'static str,

    /// Entity name of the owner.
    pub owner: &'static str,

    /// Entity name of the other side.
    pub target: &'static str,

    pub kind: AssociationKind,

    /// Field on the target that mirrors this one, for bidirectional
    /// associations.
    pub inverse: Option<&'static str>,

    /// Whether this end owns the association in the persistent model.
    pub owning: bool,

    /// Uniqueness policy of list ends.
    pub bidi: BidiType,

    pub duplicates: DuplicatePolicy,
}

impl AssociationInfo {
    #[must_use]
    pub const fn new(
        name: &'static str,
        owner: &'static str,
        target: &'static str,
        kind: AssociationKind,
    ) -> Self {
        Self {
            name,
            owner,
            target,
            kind,
            inverse: None,
            owning: false,
            bidi: BidiType::AllValues,
            duplicates: DuplicatePolicy::Evict,
        }
    }

    /// Name the field on the target that mirrors this end.
    #[must_use]
    pub const fn inverse(mut self, field: &'static str) -> Self {
        self.inverse = Some(field);
        self
    }

    #[must_use]
    pub const fn owning(mut self, value: bool) -> Self {
        self.owning = value;
        self
    }

    #[must_use]
    pub const fn bidi(mut self, bidi: BidiType) -> Self {
        self.bidi = bidi;
        self
    }

    #[must_use]
    pub const fn duplicates(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    pub const fn is_bidirectional(&self) -> bool {
        self.inverse.is_some()
    }

    /// `Owner.field`, used in log lines and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

impl Default for AssociationInfo {
    fn default() -> Self {
        Self::new("", "", "", AssociationKind::default())
    }
}
