//! Request body validation.
//!
//! Every validator reduces to [`BodyValidator::validate`] over the raw body.
//! The adapters here decode the body first (as text, as a JSON value, or
//! into a typed value) and hand it to a user predicate. A decode failure or
//! a panicking predicate counts as "does not match".

use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Decides whether a raw request body satisfies an expectation.
pub trait BodyValidator: Send + Sync {
    fn validate(&self, body: &[u8]) -> bool;
}

impl<F> BodyValidator for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn validate(&self, body: &[u8]) -> bool {
        guarded(|| self(body))
    }
}

/// Validates the body as (lossily decoded) UTF-8 text.
pub struct TextValidator<F> {
    predicate: F,
}

impl<F> TextValidator<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> BodyValidator for TextValidator<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, body: &[u8]) -> bool {
        let text = String::from_utf8_lossy(body);
        guarded(|| (self.predicate)(&text))
    }
}

/// Validates the body as an untyped JSON document.
pub struct JsonValidator<F> {
    predicate: F,
}

impl<F> JsonValidator<F>
where
    F: Fn(&serde_json::Value) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> BodyValidator for JsonValidator<F>
where
    F: Fn(&serde_json::Value) -> bool + Send + Sync,
{
    fn validate(&self, body: &[u8]) -> bool {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(value) => guarded(|| (self.predicate)(&value)),
            Err(_) => false,
        }
    }
}

/// Validates the body after deserializing it into `T`.
pub struct TypedValidator<T, F> {
    predicate: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> TypedValidator<T, F>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _marker: PhantomData,
        }
    }
}

impl<T, F> BodyValidator for TypedValidator<T, F>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn validate(&self, body: &[u8]) -> bool {
        match serde_json::from_slice::<T>(body) {
            Ok(value) => guarded(|| (self.predicate)(&value)),
            Err(_) => false,
        }
    }
}

impl<F> fmt::Debug for TextValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TextValidator")
    }
}

impl<F> fmt::Debug for JsonValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonValidator")
    }
}

impl<T, F> fmt::Debug for TypedValidator<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedValidator<{}>", std::any::type_name::<T>())
    }
}

/// Run a user predicate, mapping a panic to `false`.
///
/// The process panic hook still runs, so a rejected `assert!` is printed to
/// stderr.
fn guarded(predicate: impl FnOnce() -> bool) -> bool {
    catch_unwind(AssertUnwindSafe(predicate)).unwrap_or(false)
}
