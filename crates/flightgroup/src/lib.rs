// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Suppresses duplicate concurrent work on blocking threads.
//!
//! This crate provides [`FlightGroup`], a mechanism for collapsing concurrent calls that ask for
//! the same piece of work (identified by a key) into a single execution. The first caller for a
//! key (the "leader") runs the supplied closure on its own thread. Callers that arrive while the
//! leader is still running (the "followers") block until it finishes and receive a clone of its
//! outcome.
//!
//! # When to Use
//!
//! - **Cache population**: prevent a thundering herd of origin fetches on a cache miss
//! - **Remote calls**: forward one request to a peer instead of one per waiting thread
//! - **Expensive computation**: compute once, hand the result to everyone who asked
//!
//! # Example
//!
//! ```
//! use flightgroup::FlightGroup;
//!
//! let group: FlightGroup<String, u64> = FlightGroup::new();
//!
//! let landing = group.work("answer".to_string(), || 42);
//! assert_eq!(landing.outcome(), Ok(&42));
//! assert!(!landing.is_shared());
//! ```
//!
//! # Lifetime of a Flight
//!
//! A flight exists only while its closure runs. As soon as the leader has stored the outcome,
//! the flight is deregistered, so a later call for the same key starts a fresh execution.
//! Nothing is cached beyond the in-flight window.
//!
//! # Panic Safety
//!
//! A panic inside the closure does not strand the followers. The leader catches it and every
//! caller of that flight, the leader included, receives the same [`Panicked`] error carrying the
//! panic message.
//!
//! # Cancellation
//!
//! There is none. A closure that never returns blocks every follower of its key indefinitely;
//! callers that need bounded latency must impose their own deadline around the work.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

type Registry<K, T> = Arc<Mutex<HashMap<K, Arc<Flight<T>>>>>;

/// The closure of a flight panicked before producing a value.
///
/// Every caller that participated in the flight observes an equal copy of this error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("flight aborted: {message}")]
pub struct Panicked {
    message: String,
}

impl Panicked {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "closure panicked with a non-string payload".to_string());
        Self { message }
    }

    fn abandoned() -> Self {
        Self {
            message: "leader left the flight without an outcome".to_string(),
        }
    }

    /// The message the closure panicked with.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The outcome of [`FlightGroup::work`] as seen by one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landing<T> {
    outcome: Result<T, Panicked>,
    shared: bool,
}

impl<T> Landing<T> {
    /// The value produced by the flight, or the panic that aborted it.
    pub fn outcome(&self) -> Result<&T, &Panicked> {
        self.outcome.as_ref()
    }

    /// Consumes the landing and returns the outcome.
    pub fn into_outcome(self) -> Result<T, Panicked> {
        self.outcome
    }

    /// `true` when the outcome was produced by another caller's closure.
    ///
    /// Exactly one caller per flight sees `false`: the leader that ran the closure.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.shared
    }
}

/// One registered execution: a slot for the outcome and a signal for the followers.
struct Flight<T> {
    slot: Mutex<Option<Result<T, Panicked>>>,
    landed: Condvar,
    followers: AtomicUsize,
}

impl<T: Clone> Flight<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            landed: Condvar::new(),
            followers: AtomicUsize::new(0),
        }
    }

    fn wait(&self) -> Result<T, Panicked> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            self.landed.wait(&mut slot);
        }
    }

    fn land(&self, outcome: Result<T, Panicked>) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(outcome);
        }
        drop(slot);
        self.landed.notify_all();
    }
}

/// RAII guard held by the leader.
///
/// Dropping it deregisters the flight and, if the leader never stored an outcome, wakes the
/// followers with a [`Panicked`] error so that no thread stays parked on a dead flight.
struct LeaderGuard<'a, K, T>
where
    K: Hash + Eq,
    T: Clone,
{
    key: Option<K>,
    flight: Arc<Flight<T>>,
    registry: &'a Registry<K, T>,
}

impl<K, T> Drop for LeaderGuard<'_, K, T>
where
    K: Hash + Eq,
    T: Clone,
{
    fn drop(&mut self) {
        self.flight.land(Err(Panicked::abandoned()));

        if let Some(key) = self.key.take() {
            let mut registry = self.registry.lock();
            if registry.get(&key).is_some_and(|current| Arc::ptr_eq(current, &self.flight)) {
                registry.remove(&key);
            }
        }
    }
}

/// Represents a class of work and creates a space in which units of work can be executed with
/// duplicate suppression.
///
/// The group is `Send + Sync` when its key and value types are, and is usually shared between
/// threads behind an [`Arc`] or a plain reference with a scoped thread.
pub struct FlightGroup<K, T> {
    registry: Registry<K, T>,
}

impl<K, T> Default for FlightGroup<K, T> {
    fn default() -> Self {
        Self {
            registry: Arc::default(),
        }
    }
}

impl<K, T> fmt::Debug for FlightGroup<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGroup")
            .field("in_flight", &self.registry.lock().len())
            .finish()
    }
}

impl<K, T> FlightGroup<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executes `func` for `key`, making sure only one execution per key is in flight at a time.
    ///
    /// If another caller is already running work for `key`, this call blocks until that work
    /// completes and returns a clone of its outcome without invoking `func`. Otherwise `func`
    /// runs on the calling thread and its outcome is handed to every caller that joined meanwhile.
    pub fn work<F>(&self, key: K, func: F) -> Landing<T>
    where
        F: FnOnce() -> T,
    {
        let mut registry = self.registry.lock();
        if let Some(flight) = registry.get(&key) {
            let flight = Arc::clone(flight);
            flight.followers.fetch_add(1, Ordering::AcqRel);
            drop(registry);
            return Landing {
                outcome: flight.wait(),
                shared: true,
            };
        }

        let flight = Arc::new(Flight::new());
        registry.insert(key.clone(), Arc::clone(&flight));
        drop(registry);

        let guard = LeaderGuard {
            key: Some(key),
            flight: Arc::clone(&flight),
            registry: &self.registry,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(func)).map_err(|payload| Panicked::from_payload(payload.as_ref()));
        flight.land(outcome.clone());
        drop(guard);

        Landing { outcome, shared: false }
    }

    /// Returns the number of keys that currently have work in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns `true` if work for `key` is currently in flight.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.registry.lock().contains_key(key)
    }

    /// Returns how many callers have joined the flight for `key` as followers so far.
    ///
    /// Zero when nothing is in flight for `key`.
    #[must_use]
    pub fn followers(&self, key: &K) -> usize {
        self.registry
            .lock()
            .get(key)
            .map_or(0, |flight| flight.followers.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicked_from_str_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Panicked::from_payload(payload.as_ref()).message(), "boom");
    }

    #[test]
    fn panicked_from_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom".to_string());
        assert_eq!(Panicked::from_payload(payload.as_ref()).message(), "boom");
    }

    #[test]
    fn panicked_from_opaque_payload() {
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert!(Panicked::from_payload(payload.as_ref()).message().contains("non-string"));
    }

    #[test]
    fn panicked_display() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Panicked::from_payload(payload.as_ref()).to_string(), "flight aborted: boom");
    }

    #[test]
    fn land_keeps_first_outcome() {
        let flight: Flight<u32> = Flight::new();
        flight.land(Ok(1));
        flight.land(Err(Panicked::abandoned()));
        assert_eq!(flight.wait(), Ok(1));
    }

    #[test]
    fn guard_deregisters_flight() {
        let group: FlightGroup<&str, u32> = FlightGroup::new();
        let flight = Arc::new(Flight::new());
        group.registry.lock().insert("key", Arc::clone(&flight));
        assert!(group.is_in_flight(&"key"));

        drop(LeaderGuard {
            key: Some("key"),
            flight: Arc::clone(&flight),
            registry: &group.registry,
        });

        assert!(!group.is_in_flight(&"key"));
        assert_eq!(flight.wait(), Err(Panicked::abandoned()));
    }

    #[test]
    fn guard_leaves_foreign_flight_registered() {
        let group: FlightGroup<&str, u32> = FlightGroup::new();
        let registered = Arc::new(Flight::new());
        group.registry.lock().insert("key", Arc::clone(&registered));

        drop(LeaderGuard {
            key: Some("key"),
            flight: Arc::new(Flight::new()),
            registry: &group.registry,
        });

        assert!(group.is_in_flight(&"key"));
    }

    #[test]
    fn debug_reports_in_flight_count() {
        let group: FlightGroup<String, String> = FlightGroup::new();
        let debug_str = format!("{group:?}");
        assert!(debug_str.contains("FlightGroup"));
        assert!(debug_str.contains("in_flight: 0"));
    }
}
