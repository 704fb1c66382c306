// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use crate::BoxError;

/// Loads the value for a key from the origin when no cache holds it.
///
/// The returned buffer is handed over to the cache, which keeps it immutable from then on.
/// Closures of the shape `Fn(&str) -> Result<Vec<u8>, BoxError>` implement this trait.
///
/// # Examples
///
/// ```
/// use peercache::{BoxError, Getter};
///
/// struct Shouter;
///
/// impl Getter for Shouter {
///     fn get(&self, key: &str) -> Result<Vec<u8>, BoxError> {
///         Ok(key.to_uppercase().into_bytes())
///     }
/// }
///
/// assert_eq!(Shouter.get("hey").unwrap(), b"HEY");
/// ```
pub trait Getter: Send + Sync {
    /// Produces the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns whatever error the origin reports. The error is handed to every caller waiting on
    /// this load and nothing is cached.
    fn get(&self, key: &str) -> Result<Vec<u8>, BoxError>;
}

impl<F> Getter for F
where
    F: Fn(&str) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Vec<u8>, BoxError> {
        self(key)
    }
}

/// Wraps a closure as a [`Getter`], pinning down its signature so that the closure's argument and
/// error types need no annotations.
///
/// # Examples
///
/// ```
/// use peercache::{Getter, getter_fn};
///
/// let origin = getter_fn(|key| Ok(format!("value of {key}").into_bytes()));
/// assert_eq!(origin.get("a").unwrap(), b"value of a");
/// ```
pub fn getter_fn<F>(f: F) -> GetterFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    GetterFn(f)
}

/// A [`Getter`] backed by a closure. Created by [`getter_fn`].
#[derive(Clone, Copy)]
pub struct GetterFn<F>(F);

impl<F> Getter for GetterFn<F>
where
    F: Fn(&str) -> Result<Vec<u8>, BoxError> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Vec<u8>, BoxError> {
        (self.0)(key)
    }
}

impl<F> fmt::Debug for GetterFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterFn").finish_non_exhaustive()
    }
}
