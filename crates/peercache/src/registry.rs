// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::{Getter, Group};

/// A set of [`Group`]s addressable by name.
///
/// Peers address a group by its name, so a process normally keeps all of its groups in the
/// [`global`](Self::global) registry. Independent registries are useful for embedding several
/// isolated caches in one process and for tests.
#[derive(Default)]
pub struct Registry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry, creating it on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Creates a group caching up to `cache_bytes` bytes of values loaded from `getter`, and
    /// registers it under `name`.
    ///
    /// A group previously registered under `name` is replaced. Holders of the old group keep a
    /// working instance, but lookups by name return the new one.
    pub fn new_group(&self, name: impl Into<String>, cache_bytes: usize, getter: impl Getter + 'static) -> Arc<Group> {
        self.register(Group::builder(name).cache_bytes(cache_bytes).getter(getter).build())
    }

    /// Registers an already built group under its name, replacing any group of the same name.
    pub fn register(&self, group: Group) -> Arc<Group> {
        let group = Arc::new(group);
        let replaced = self
            .groups
            .write()
            .insert(group.name().to_string(), Arc::clone(&group));

        if replaced.is_some() {
            tracing::event!(
                name: "peercache.group_replaced",
                tracing::Level::WARN,
                group.name = %group.name(),
                "group replaced",
            );
        }

        group
    }

    /// Returns the group registered under `name`.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Returns the names of all registered groups, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("groups", &self.names()).finish()
    }
}

/// Creates a group in the [global registry](Registry::global). See [`Registry::new_group`].
pub fn new_group(name: impl Into<String>, cache_bytes: usize, getter: impl Getter + 'static) -> Arc<Group> {
    Registry::global().new_group(name, cache_bytes, getter)
}

/// Looks a group up in the [global registry](Registry::global).
#[must_use]
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    Registry::global().group(name)
}
