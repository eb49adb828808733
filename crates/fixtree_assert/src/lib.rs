//! Assertion helpers for fixtree test bodies.
//!
//! Every helper either returns `Ok` or a [`Failure`] of kind `AssertionError` carrying a readable message and a
//! structured info mapping (`Expected`, `Actual`, ...). Test bodies chain them with `?`:
//!
//! ```rust
//! use fixtree_assert as assert;
//!
//! fn body() -> fixtree_core::TestOutcome {
//!     assert::equal(&2, &(1 + 1))?;
//!     assert::in_string("ell", "hello")?;
//!     Ok(())
//! }
//! # body().unwrap();
//! ```
//!
//! All helpers are `#[track_caller]`, so the failure stack points at the assertion in the test, not in this crate.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

pub use fixtree_core::{Failure, TestOutcome};

fn repr<T: Debug + ?Sized>(value: &T) -> String {
    format!("{:?}", value)
}

/// Fail unconditionally.
#[track_caller]
pub fn fail(message: impl Into<String>) -> TestOutcome {
    let message = message.into();
    if message.is_empty() {
        Err(Failure::assertion("assert::fail()"))
    } else {
        Err(Failure::assertion(message))
    }
}

/// Assert that `value` is true.
#[track_caller]
pub fn is_true(value: bool) -> TestOutcome {
    if !value {
        return Err(Failure::assertion("expected true, actual false").with_info("Value", "false"));
    }
    Ok(())
}

/// Assert that `value` is false.
#[track_caller]
pub fn is_false(value: bool) -> TestOutcome {
    if value {
        return Err(Failure::assertion("expected false, actual true").with_info("Value", "true"));
    }
    Ok(())
}

/// Assert that two values are equal.
#[track_caller]
pub fn equal<T: PartialEq + Debug + ?Sized>(expected: &T, actual: &T) -> TestOutcome {
    if expected != actual {
        return Err(
            Failure::assertion(format!("expected: {}, actual: {}", repr(expected), repr(actual)))
                .with_info("Expected", repr(expected))
                .with_info("Actual", repr(actual)),
        );
    }
    Ok(())
}

/// Assert that two values are not equal.
#[track_caller]
pub fn not_equal<T: PartialEq + Debug + ?Sized>(expected: &T, actual: &T) -> TestOutcome {
    if expected == actual {
        return Err(
            Failure::assertion(format!("not expected: {}, actual: {}", repr(expected), repr(actual)))
                .with_info("Expected", repr(expected))
                .with_info("Actual", repr(actual)),
        );
    }
    Ok(())
}

/// Structural equality. Identical to [`equal`]: Rust's `PartialEq` is already structural.
#[track_caller]
pub fn deep_equal<T: PartialEq + Debug + ?Sized>(expected: &T, actual: &T) -> TestOutcome {
    equal(expected, actual)
}

/// Assert every element differs pairwise. Slices of different length trivially pass.
#[track_caller]
pub fn not_equal_all<T: PartialEq + Debug>(expected: &[T], actual: &[T]) -> TestOutcome {
    if expected.len() != actual.len() {
        return Ok(());
    }
    for (e, a) in expected.iter().zip(actual) {
        not_equal(e, a)?;
    }
    Ok(())
}

/// Assert `lhs > rhs`.
#[track_caller]
pub fn greater<T: PartialOrd + Debug>(lhs: T, rhs: T) -> TestOutcome {
    if lhs <= rhs {
        return Err(Failure::assertion(format!("{} not greater than {}", repr(&lhs), repr(&rhs))));
    }
    Ok(())
}

/// Assert `lhs < rhs`.
#[track_caller]
pub fn less<T: PartialOrd + Debug>(lhs: T, rhs: T) -> TestOutcome {
    if lhs >= rhs {
        return Err(Failure::assertion(format!("{} not less than {}", repr(&lhs), repr(&rhs))));
    }
    Ok(())
}

/// Assert `lhs >= rhs`.
#[track_caller]
pub fn greater_or_equal<T: PartialOrd + Debug>(lhs: T, rhs: T) -> TestOutcome {
    if lhs < rhs {
        return Err(Failure::assertion(format!(
            "{} not greater than or equal to {}",
            repr(&lhs),
            repr(&rhs)
        )));
    }
    Ok(())
}

/// Assert `lhs <= rhs`.
#[track_caller]
pub fn less_or_equal<T: PartialOrd + Debug>(lhs: T, rhs: T) -> TestOutcome {
    if lhs > rhs {
        return Err(Failure::assertion(format!(
            "{} not less than or equal to {}",
            repr(&lhs),
            repr(&rhs)
        )));
    }
    Ok(())
}

/// Assert `|expected - actual| <= tolerance`.
#[track_caller]
pub fn near_equal(expected: f64, actual: f64, tolerance: f64) -> TestOutcome {
    if (expected - actual).abs() > tolerance || expected.is_nan() != actual.is_nan() {
        return Err(Failure::assertion(format!(
            "expected: {}, actual: {}, tolerance: {}, diff: {}",
            repr(&expected),
            repr(&actual),
            repr(&tolerance),
            repr(&(actual - expected))
        ))
        .with_info("Expected", repr(&expected))
        .with_info("Actual", repr(&actual))
        .with_info("Tolerance", repr(&tolerance)));
    }
    Ok(())
}

/// Element-wise [`near_equal`]; lengths must match.
#[track_caller]
pub fn near_equal_all(expected: &[f64], actual: &[f64], tolerance: f64) -> TestOutcome {
    equal(&expected.len(), &actual.len())?;
    for (e, a) in expected.iter().zip(actual) {
        near_equal(*e, *a, tolerance)?;
    }
    Ok(())
}

/// Assert `needle` occurs in `haystack`.
#[track_caller]
pub fn in_string(needle: &str, haystack: &str) -> TestOutcome {
    if !haystack.contains(needle) {
        return Err(
            Failure::assertion(format!("expected: {} not in string: {}", repr(needle), repr(haystack)))
                .with_info("Expected", repr(needle))
                .with_info("String", repr(haystack)),
        );
    }
    Ok(())
}

/// Assert `needle` does not occur in `haystack`.
#[track_caller]
pub fn not_in_string(needle: &str, haystack: &str) -> TestOutcome {
    if haystack.contains(needle) {
        return Err(
            Failure::assertion(format!("unexpected: {} in string: {}", repr(needle), repr(haystack)))
                .with_info("Expected", repr(needle))
                .with_info("String", repr(haystack)),
        );
    }
    Ok(())
}

/// Assert some element of `items` equals `expected`.
#[track_caller]
pub fn in_array<T: PartialEq + Debug>(expected: &T, items: &[T]) -> TestOutcome {
    if !items.contains(expected) {
        return Err(Failure::assertion(format!(
            "expected: {} not found in array: {}",
            repr(expected),
            repr(items)
        ))
        .with_info("Expected", repr(expected))
        .with_info("Array", repr(items)));
    }
    Ok(())
}

/// Assert no element of `items` equals `unexpected`.
#[track_caller]
pub fn not_in_array<T: PartialEq + Debug>(unexpected: &T, items: &[T]) -> TestOutcome {
    if items.contains(unexpected) {
        return Err(Failure::assertion(format!(
            "unexpected: {} found in array: {}",
            repr(unexpected),
            repr(items)
        ))
        .with_info("Expected", repr(unexpected))
        .with_info("Array", repr(items)));
    }
    Ok(())
}

/// Key lookup for [`has_key`] / [`not_has_key`].
pub trait KeyedCollection<K: ?Sized> {
    fn contains_key_of(&self, key: &K) -> bool;
    fn keys_repr(&self) -> String;
}

impl<K: Eq + Hash + Debug, V> KeyedCollection<K> for HashMap<K, V> {
    fn contains_key_of(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn keys_repr(&self) -> String {
        let mut keys: Vec<String> = self.keys().map(repr).collect();
        keys.sort();
        format!("[{}]", keys.join(", "))
    }
}

impl<K: Ord + Debug, V> KeyedCollection<K> for BTreeMap<K, V> {
    fn contains_key_of(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn keys_repr(&self) -> String {
        repr(&self.keys().collect::<Vec<_>>())
    }
}

/// Assert `key` is present in `collection`.
#[track_caller]
pub fn has_key<K: Debug, C: KeyedCollection<K>>(key: &K, collection: &C) -> TestOutcome {
    if !collection.contains_key_of(key) {
        return Err(Failure::assertion(format!(
            "Key {} is not in object: {}",
            repr(key),
            collection.keys_repr()
        )));
    }
    Ok(())
}

/// Assert `key` is absent from `collection`.
#[track_caller]
pub fn not_has_key<K: Debug, C: KeyedCollection<K>>(key: &K, collection: &C) -> TestOutcome {
    if collection.contains_key_of(key) {
        return Err(Failure::assertion(format!(
            "Unexpected key {} is found in object: {}",
            repr(key),
            collection.keys_repr()
        )));
    }
    Ok(())
}

/// Assert an `Option` is `None`.
#[track_caller]
pub fn is_none<T: Debug>(value: &Option<T>) -> TestOutcome {
    if value.is_some() {
        return Err(Failure::assertion(format!("expected: None, actual: {}", repr(value)))
            .with_info("Expected", "None")
            .with_info("Actual", repr(value)));
    }
    Ok(())
}

/// Assert an `Option` is `Some`.
#[track_caller]
pub fn is_some<T: Debug>(value: &Option<T>) -> TestOutcome {
    if value.is_none() {
        return Err(Failure::assertion("not expected: None, actual: None").with_info("Actual", "None"));
    }
    Ok(())
}

/// Assert `f` returns `Err`, and hand the error back for further checks.
///
/// # Errors
///
/// Fails with `did not throw` when `f` returns `Ok`.
#[track_caller]
pub fn throws<T: Debug, E>(f: impl FnOnce() -> Result<T, E>) -> Result<E, Failure> {
    match f() {
        Err(err) => Ok(err),
        Ok(value) => Err(Failure::assertion("did not throw").with_info("Returned", repr(&value))),
    }
}

/// Assert `f` panics, and hand back the panic message.
#[track_caller]
pub fn panics<R>(f: impl FnOnce() -> R) -> Result<String, Failure> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => Err(Failure::assertion("did not panic")),
        Err(payload) => Ok(Failure::from_panic(payload).message),
    }
}

/// Assert a type-erased value is a `T`.
#[track_caller]
pub fn instance_of<T: Any>(value: &dyn Any) -> TestOutcome {
    if !value.is::<T>() {
        let type_name = std::any::type_name::<T>();
        return Err(Failure::assertion(format!("value not instance of {type_name}")).with_info("Type", type_name));
    }
    Ok(())
}
