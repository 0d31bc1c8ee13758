//! Declaration-ordered lookup of association descriptors.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use omkit_collection::Batch;
use omkit_core::{Error, Result};

use crate::info::AssociationInfo;

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<AssociationRegistry>>> = const { RefCell::new(Vec::new()) };
}

/// Every association descriptor known to a model, in declaration order.
///
/// The registry is filled once at startup. The declaration rank of a
/// descriptor is its position in registration order across all owners.
#[derive(Debug, Default, Clone)]
pub struct AssociationRegistry {
    declared: Vec<&'static AssociationInfo>,
}

impl AssociationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. A second descriptor with the same owner and
    /// name is rejected.
    pub fn register(&mut self, info: &'static AssociationInfo) -> Result<()> {
        if self.find(info.owner, info.name).is_some() {
            return Err(Error::invalid_argument(
                "association",
                format!("'{}' is already registered", info.qualified_name()),
            ));
        }
        tracing::debug!(association = %info.qualified_name(), "Registering association");
        self.declared.push(info);
        Ok(())
    }

    pub fn with(mut self, info: &'static AssociationInfo) -> Result<Self> {
        self.register(info)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    /// Descriptors owned by `owner`, in declaration order.
    pub fn descriptors(&self, owner: &str) -> Vec<&'static AssociationInfo> {
        self.declared
            .iter()
            .copied()
            .filter(|info| info.owner == owner)
            .collect()
    }

    pub fn find(&self, owner: &str, name: &str) -> Option<&'static AssociationInfo> {
        self.declared
            .iter()
            .copied()
            .find(|info| info.owner == owner && info.name == name)
    }

    /// The descriptor on the target that mirrors `info`.
    pub fn inverse_of(&self, info: &AssociationInfo) -> Option<&'static AssociationInfo> {
        self.find(info.target, info.inverse?)
    }

    /// Position of `info` in declaration order.
    pub fn rank(&self, info: &AssociationInfo) -> Option<usize> {
        self.declared
            .iter()
            .position(|d| d.owner == info.owner && d.name == info.name)
    }

    /// Validate the registry and make its declaration order the delivery
    /// order of mirrored collections on this thread, until the returned
    /// guard drops. Guards nest; the innermost registry wins.
    pub fn activate(self) -> Result<ActiveRegistry> {
        self.validate()?;
        tracing::debug!(associations = self.declared.len(), "Activating association registry");
        ACTIVE.with_borrow_mut(|active| active.push(Rc::new(self)));
        Ok(ActiveRegistry {
            _not_send: PhantomData,
        })
    }

    /// Check that every bidirectional descriptor has a matching inverse.
    ///
    /// The inverse must exist on the target, point back at the owner field,
    /// and declare the inverse kind. At most one side may be owning.
    pub fn validate(&self) -> Result<()> {
        for info in &self.declared {
            let Some(inverse_name) = info.inverse else {
                continue;
            };
            let inverse = self.find(info.target, inverse_name).ok_or_else(|| {
                Error::invalid_argument(
                    "inverse",
                    format!(
                        "'{}' names inverse '{}.{}' which is not registered",
                        info.qualified_name(),
                        info.target,
                        inverse_name
                    ),
                )
            })?;
            if inverse.inverse != Some(info.name) || inverse.target != info.owner {
                return Err(Error::invalid_argument(
                    "inverse",
                    format!(
                        "'{}' does not point back at '{}'",
                        inverse.qualified_name(),
                        info.qualified_name()
                    ),
                ));
            }
            if inverse.kind != info.kind.inverse() {
                return Err(Error::invalid_argument(
                    "kind",
                    format!(
                        "'{}' is {:?} but its inverse '{}' is {:?}",
                        info.qualified_name(),
                        info.kind,
                        inverse.qualified_name(),
                        inverse.kind
                    ),
                ));
            }
            if info.owning && inverse.owning {
                return Err(Error::invalid_argument(
                    "owning",
                    format!(
                        "both '{}' and '{}' claim to own the association",
                        info.qualified_name(),
                        inverse.qualified_name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Guard returned by [`AssociationRegistry::activate`].
#[derive(Debug)]
pub struct ActiveRegistry {
    _not_send: PhantomData<*const ()>,
}

impl ActiveRegistry {
    /// Declaration rank of `info` in the innermost active registry.
    pub fn rank_of(info: &AssociationInfo) -> Option<usize> {
        ACTIVE.with_borrow(|active| active.last().and_then(|registry| registry.rank(info)))
    }
}

impl Drop for ActiveRegistry {
    fn drop(&mut self) {
        ACTIVE.with_borrow_mut(|active| active.pop());
    }
}

/// Rank the end `origin` by its descriptor in the open batch.
pub(crate) fn declare_mirror(origin: u64, info: &AssociationInfo) {
    if let Some(rank) = ActiveRegistry::rank_of(info) {
        Batch::declare(origin, rank);
    }
}
