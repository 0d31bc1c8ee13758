//! Construction-time configuration of managed collections.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use omkit_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::comparator::{
    DefaultComparator, EqualityComparator, OrderComparator, UnifiedComparator,
};

/// Uniqueness policy of list elements and map values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidiType {
    /// Duplicates allowed.
    #[default]
    None,
    /// Non-null values are unique; nulls may repeat.
    NonNullValues,
    /// Every value is unique.
    AllValues,
}

impl BidiType {
    pub const fn is_bidi(self) -> bool {
        !matches!(self, BidiType::None)
    }

    /// Whether a value with the given nullness takes part in uniqueness.
    pub const fn applies_to(self, is_null: bool) -> bool {
        match self {
            BidiType::None => false,
            BidiType::NonNullValues => !is_null,
            BidiType::AllValues => true,
        }
    }
}

/// Iteration order of sets and map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrder {
    /// Unspecified order.
    #[default]
    Hash,
    /// Order of first insertion.
    Insertion,
    /// Order of an [`OrderComparator`].
    Sorted,
}

/// A predicate run before an element enters a collection.
pub type Validator<T> = Rc<dyn Fn(&T) -> std::result::Result<(), String>>;

/// Builder for collection construction.
///
/// ```
/// use omkit_collection::{BidiType, CollectionOptions, DefaultComparator};
///
/// let options = CollectionOptions::<String>::new(DefaultComparator)
///     .insertion_ordered()
///     .bidi(BidiType::AllValues)
///     .validator(|s| if s.is_empty() { Err("empty".into()) } else { Ok(()) });
/// assert!(options.check("element", &String::new()).is_err());
/// ```
pub struct CollectionOptions<T> {
    pub(crate) comparator: UnifiedComparator<T>,
    pub(crate) order: KeyOrder,
    pub(crate) bidi: BidiType,
    pub(crate) forbid_null: bool,
    pub(crate) validator: Option<Validator<T>>,
}

impl<T> CollectionOptions<T> {
    /// Hash layout over an equality comparator.
    pub fn new(comparator: impl EqualityComparator<T> + 'static) -> Self {
        Self::from_comparator(UnifiedComparator::equality(comparator))
    }

    /// Sorted layout over an order comparator.
    pub fn sorted(comparator: impl OrderComparator<T> + 'static) -> Self {
        Self::from_comparator(UnifiedComparator::order(comparator))
    }

    pub fn from_comparator(comparator: UnifiedComparator<T>) -> Self {
        let order = if comparator.is_sorted() {
            KeyOrder::Sorted
        } else {
            KeyOrder::Hash
        };
        Self {
            comparator,
            order,
            bidi: BidiType::None,
            forbid_null: false,
            validator: None,
        }
    }

    /// Iterate in insertion order. Ignored by sorted layouts.
    #[must_use]
    pub fn insertion_ordered(mut self) -> Self {
        if !self.comparator.is_sorted() {
            self.order = KeyOrder::Insertion;
        }
        self
    }

    /// Uniqueness policy for list elements or map values.
    #[must_use]
    pub fn bidi(mut self, bidi: BidiType) -> Self {
        self.bidi = bidi;
        self
    }

    /// Reject elements the comparator reports as null.
    #[must_use]
    pub fn forbid_null(mut self) -> Self {
        self.forbid_null = true;
        self
    }

    #[must_use]
    pub fn validator(
        mut self,
        validator: impl Fn(&T) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn comparator(&self) -> &UnifiedComparator<T> {
        &self.comparator
    }

    pub fn key_order(&self) -> KeyOrder {
        self.order
    }

    pub fn bidi_type(&self) -> BidiType {
        self.bidi
    }

    /// Run the null policy and the validator against `value`.
    pub fn check(&self, argument: &'static str, value: &T) -> Result<()> {
        if self.forbid_null && self.comparator.is_null(value) {
            return Err(Error::invalid_argument(argument, "null is not allowed"));
        }
        if let Some(validator) = &self.validator {
            validator(value).map_err(|message| Error::invalid_argument(argument, message))?;
        }
        Ok(())
    }

    /// The equality comparator, rejecting order comparators.
    pub(crate) fn require_equality(
        &self,
        argument: &'static str,
    ) -> Result<Rc<dyn EqualityComparator<T>>> {
        self.comparator.as_equality().cloned().ok_or_else(|| {
            Error::invalid_argument(argument, "an equality comparator is required")
        })
    }
}

impl<T: Hash + Eq + 'static> Default for CollectionOptions<T> {
    fn default() -> Self {
        Self::new(DefaultComparator)
    }
}

impl<T> Clone for CollectionOptions<T> {
    fn clone(&self) -> Self {
        Self {
            comparator: self.comparator.clone(),
            order: self.order,
            bidi: self.bidi,
            forbid_null: self.forbid_null,
            validator: self.validator.clone(),
        }
    }
}

impl<T> fmt::Debug for CollectionOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionOptions")
            .field("comparator", &self.comparator)
            .field("order", &self.order)
            .field("bidi", &self.bidi)
            .field("forbid_null", &self.forbid_null)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{NaturalOrder, NullableComparator};

    #[test]
    fn test_defaults() {
        let options = CollectionOptions::<i32>::default();
        assert_eq!(options.key_order(), KeyOrder::Hash);
        assert_eq!(options.bidi_type(), BidiType::None);
        assert!(options.check("element", &0).is_ok());
    }

    #[test]
    fn test_sorted_ignores_insertion_order() {
        let options = CollectionOptions::<i32>::sorted(NaturalOrder).insertion_ordered();
        assert_eq!(options.key_order(), KeyOrder::Sorted);
        assert!(options.require_equality("comparator").is_err());
    }

    #[test]
    fn test_forbid_null() {
        let options = CollectionOptions::new(NullableComparator(DefaultComparator)).forbid_null();
        let err = options.check("key", &None::<i32>).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("key"));
        assert!(options.check("key", &Some(1)).is_ok());
    }

    #[test]
    fn test_validator_maps_to_invalid_argument() {
        let options =
            CollectionOptions::<i32>::default().validator(|v| {
                if *v < 0 { Err(format!("{v} is negative")) } else { Ok(()) }
            });
        assert!(options.check("element", &1).is_ok());
        let err = options.check("element", &-1).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_bidi_type_serde() {
        let json = serde_json::to_string(&BidiType::NonNullValues).unwrap();
        assert_eq!(json, "\"non_null_values\"");
        let back: BidiType = serde_json::from_str("\"all_values\"").unwrap();
        assert_eq!(back, BidiType::AllValues);
        assert!(BidiType::NonNullValues.applies_to(false));
        assert!(!BidiType::NonNullValues.applies_to(true));
    }
}
