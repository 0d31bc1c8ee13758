//! Equality, hashing and ordering strategies.
//!
//! A managed collection never calls `Hash`/`Eq` on its elements directly.
//! It asks the comparator it was built with, which decouples "identity
//! inside this collection" from the element type's own notion of equality.
//!
//! A comparator becomes *frozen-aware* by returning a [`Freezer`] from
//! [`EqualityComparator::freezer`]. The collection then registers itself on
//! every element it indexes, so the element can announce a pending change to
//! its hash-relevant state (see [`crate::frozen`]).

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::frozen::{FrozenCell, FrozenContext};

/// Hash/equality strategy used by hashed collections.
pub trait EqualityComparator<T> {
    /// Hash consistent with [`equals`](Self::equals).
    fn hash(&self, value: &T) -> u64;

    fn equals(&self, a: &T, b: &T) -> bool;

    /// Whether `value` is the null of its domain.
    ///
    /// Null values are exempt from `BidiType::NonNullValues` uniqueness and
    /// rejected by collections configured with `forbid_null`.
    fn is_null(&self, _value: &T) -> bool {
        false
    }

    /// The frozen-aware capability of this comparator, if any.
    fn freezer(&self) -> Option<&dyn Freezer<T>> {
        None
    }
}

/// Total-order strategy used by sorted collections.
///
/// Two elements are the same member of a sorted collection when `compare`
/// returns [`Ordering::Equal`].
pub trait OrderComparator<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;

    fn is_null(&self, _value: &T) -> bool {
        false
    }

    fn freezer(&self) -> Option<&dyn Freezer<T>> {
        None
    }
}

/// Registers and unregisters collections on elements whose hash-relevant
/// state may change while they are members.
pub trait Freezer<T> {
    /// Called when `element` enters the index of the collection behind `ctx`.
    fn freeze(&self, element: &T, ctx: FrozenContext<T>);

    /// Called when `element` leaves the index of the collection behind `ctx`.
    fn unfreeze(&self, element: &T, ctx: &FrozenContext<T>);

    /// An immutable copy of `element`, used as the pre-image of rehash events.
    fn snapshot(&self, element: &T) -> T;
}

/// Capability for domain objects that take part in the frozen protocol.
///
/// Implementors keep an explicit [`FrozenCell`] field and route mutations of
/// hash-relevant state through [`FrozenCell::mutate`].
pub trait Freezable: Sized + 'static {
    fn frozen_cell(&self) -> &FrozenCell<Self>;

    /// Detached copy of the current state.
    fn snapshot(&self) -> Self;
}

pub(crate) fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// Stock comparators
// ============================================================================

/// Uses the element's own `Hash` and `Eq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl<T: Hash + Eq> EqualityComparator<T> for DefaultComparator {
    fn hash(&self, value: &T) -> u64 {
        hash_one(value)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

/// Reference identity for `Rc` handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityComparator;

impl<X: ?Sized> EqualityComparator<Rc<X>> for IdentityComparator {
    fn hash(&self, value: &Rc<X>) -> u64 {
        hash_one(&Rc::as_ptr(value).cast::<()>())
    }

    fn equals(&self, a: &Rc<X>, b: &Rc<X>) -> bool {
        Rc::ptr_eq(a, b)
    }
}

/// Equality by a derived key.
///
/// ```
/// use omkit_collection::{EqualityComparator, KeyComparator};
///
/// let by_len = KeyComparator::new(|s: &String| s.len());
/// assert!(by_len.equals(&"ab".to_string(), &"cd".to_string()));
/// ```
pub struct KeyComparator<F, K> {
    key: F,
    _key: PhantomData<fn() -> K>,
}

impl<F, K> KeyComparator<F, K> {
    pub fn new(key: F) -> Self {
        Self {
            key,
            _key: PhantomData,
        }
    }
}

impl<T, F, K> EqualityComparator<T> for KeyComparator<F, K>
where
    F: Fn(&T) -> K,
    K: Hash + Eq,
{
    fn hash(&self, value: &T) -> u64 {
        hash_one(&(self.key)(value))
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        (self.key)(a) == (self.key)(b)
    }
}

impl<T, F, K> OrderComparator<T> for KeyComparator<F, K>
where
    F: Fn(&T) -> K,
    K: Ord,
{
    fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.key)(a).cmp(&(self.key)(b))
    }
}

/// The element's own `Ord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<T: Ord> OrderComparator<T> for NaturalOrder {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        a.cmp(b)
    }
}

/// Lifts a comparator over `T` to `Option<T>`, treating `None` as null.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullableComparator<C>(pub C);

impl<T, C: EqualityComparator<T>> EqualityComparator<Option<T>> for NullableComparator<C> {
    fn hash(&self, value: &Option<T>) -> u64 {
        value.as_ref().map_or(0, |v| self.0.hash(v))
    }

    fn equals(&self, a: &Option<T>, b: &Option<T>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.0.equals(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    fn is_null(&self, value: &Option<T>) -> bool {
        value.is_none()
    }
}

// ============================================================================
// Frozen-aware adapters
// ============================================================================

/// Makes any equality comparator frozen-aware for [`Freezable`] elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenEqualityComparator<C>(pub C);

impl<T: Freezable, C: EqualityComparator<T>> EqualityComparator<T>
    for FrozenEqualityComparator<C>
{
    fn hash(&self, value: &T) -> u64 {
        self.0.hash(value)
    }

    fn equals(&self, a: &T, b: &T) -> bool {
        self.0.equals(a, b)
    }

    fn is_null(&self, value: &T) -> bool {
        self.0.is_null(value)
    }

    fn freezer(&self) -> Option<&dyn Freezer<T>> {
        Some(self)
    }
}

impl<T: Freezable, C> Freezer<T> for FrozenEqualityComparator<C> {
    fn freeze(&self, element: &T, ctx: FrozenContext<T>) {
        element.frozen_cell().combine(ctx);
    }

    fn unfreeze(&self, element: &T, ctx: &FrozenContext<T>) {
        element.frozen_cell().remove(ctx);
    }

    fn snapshot(&self, element: &T) -> T {
        element.snapshot()
    }
}

/// Makes any order comparator frozen-aware for [`Freezable`] elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrozenOrderComparator<C>(pub C);

impl<T: Freezable, C: OrderComparator<T>> OrderComparator<T> for FrozenOrderComparator<C> {
    fn compare(&self, a: &T, b: &T) -> Ordering {
        self.0.compare(a, b)
    }

    fn is_null(&self, value: &T) -> bool {
        self.0.is_null(value)
    }

    fn freezer(&self) -> Option<&dyn Freezer<T>> {
        Some(self)
    }
}

impl<T: Freezable, C> Freezer<T> for FrozenOrderComparator<C> {
    fn freeze(&self, element: &T, ctx: FrozenContext<T>) {
        element.frozen_cell().combine(ctx);
    }

    fn unfreeze(&self, element: &T, ctx: &FrozenContext<T>) {
        element.frozen_cell().remove(ctx);
    }

    fn snapshot(&self, element: &T) -> T {
        element.snapshot()
    }
}

// ============================================================================
// UnifiedComparator
// ============================================================================

/// Either kind of comparator, as held by a collection.
pub enum UnifiedComparator<T> {
    Equality(Rc<dyn EqualityComparator<T>>),
    Order(Rc<dyn OrderComparator<T>>),
}

impl<T> UnifiedComparator<T> {
    pub fn equality(comparator: impl EqualityComparator<T> + 'static) -> Self {
        UnifiedComparator::Equality(Rc::new(comparator))
    }

    pub fn order(comparator: impl OrderComparator<T> + 'static) -> Self {
        UnifiedComparator::Order(Rc::new(comparator))
    }

    pub fn is_sorted(&self) -> bool {
        matches!(self, UnifiedComparator::Order(_))
    }

    /// Hash for hashed layouts; sorted layouts never consult it.
    pub fn hash(&self, value: &T) -> u64 {
        match self {
            UnifiedComparator::Equality(c) => c.hash(value),
            UnifiedComparator::Order(_) => 0,
        }
    }

    pub fn equals(&self, a: &T, b: &T) -> bool {
        match self {
            UnifiedComparator::Equality(c) => c.equals(a, b),
            UnifiedComparator::Order(c) => c.compare(a, b) == Ordering::Equal,
        }
    }

    /// Only meaningful for [`UnifiedComparator::Order`]; equality comparators
    /// report `Equal` or `Less`.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        match self {
            UnifiedComparator::Equality(c) => {
                if c.equals(a, b) {
                    Ordering::Equal
                } else {
                    Ordering::Less
                }
            }
            UnifiedComparator::Order(c) => c.compare(a, b),
        }
    }

    pub fn is_null(&self, value: &T) -> bool {
        match self {
            UnifiedComparator::Equality(c) => c.is_null(value),
            UnifiedComparator::Order(c) => c.is_null(value),
        }
    }

    pub fn freezer(&self) -> Option<&dyn Freezer<T>> {
        match self {
            UnifiedComparator::Equality(c) => c.freezer(),
            UnifiedComparator::Order(c) => c.freezer(),
        }
    }

    /// The equality comparator, if this is not an ordering.
    pub fn as_equality(&self) -> Option<&Rc<dyn EqualityComparator<T>>> {
        match self {
            UnifiedComparator::Equality(c) => Some(c),
            UnifiedComparator::Order(_) => None,
        }
    }
}

impl<T> Clone for UnifiedComparator<T> {
    fn clone(&self) -> Self {
        match self {
            UnifiedComparator::Equality(c) => UnifiedComparator::Equality(Rc::clone(c)),
            UnifiedComparator::Order(c) => UnifiedComparator::Order(Rc::clone(c)),
        }
    }
}

impl<T> fmt::Debug for UnifiedComparator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnifiedComparator::Equality(c) => f
                .debug_struct("Equality")
                .field("frozen", &c.freezer().is_some())
                .finish(),
            UnifiedComparator::Order(c) => f
                .debug_struct("Order")
                .field("frozen", &c.freezer().is_some())
                .finish(),
        }
    }
}
