//! SharedStore - the locked key/value map behind every cell

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::cell::StateCell;
use crate::error::StateError;

type StoreValue = Box<dyn Any + Send + Sync>;

/// Whether a store is reachable by other preloader copies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    /// Found or created through a process-wide anchor
    Shared,
    /// Private fallback, other copies will not see it
    Local,
}

/// Process-wide key/value store guarded by a single coarse lock
pub struct SharedStore {
    entries: Mutex<HashMap<String, StoreValue>>,
    scope: StoreScope,
}

impl SharedStore {
    pub(crate) fn new(scope: StoreScope) -> Self {
        debug!(?scope, "SharedStore::new: called");
        Self {
            entries: Mutex::new(HashMap::new()),
            scope,
        }
    }

    /// Create a store meant to be handed to other copies by a host
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new(StoreScope::Shared))
    }

    /// Create a store private to the caller
    pub fn local() -> Arc<Self> {
        Arc::new(Self::new(StoreScope::Local))
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    pub fn is_shared(&self) -> bool {
        self.scope == StoreScope::Shared
    }

    /// Lock the store for a compound sequence of operations
    ///
    /// The lock is not reentrant: code running with a guard (initializers,
    /// signal subscribers) must use that guard instead of locking again.
    pub fn lock(&self) -> StoreGuard<'_> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("SharedStore::lock: recovering from a poisoned lock");
            poisoned.into_inner()
        });
        StoreGuard { entries }
    }

    /// Check whether a key holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// Read a clone of the value under `key`
    pub fn read<T: Any + Clone>(&self, key: &str) -> Result<Option<T>, StateError> {
        Ok(self.lock().get::<T>(key)?.cloned())
    }

    /// Unconditionally write `value` under `key`
    pub fn write<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.lock().insert(key, value);
    }

    /// Get a cell bound to `namespace::key`, offering `initializer` at `version`
    /// to the election for that key
    pub fn get_or_create<T, F>(&self, namespace: &str, key: &str, version: u16, initializer: F) -> StateCell<T>
    where
        T: Any + Send + Sync,
        F: Fn(&mut StoreGuard<'_>) -> T + Send + Sync + 'static,
    {
        StateCell::register(self, namespace, key, version, initializer)
    }
}

impl std::fmt::Debug for SharedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStore").field("scope", &self.scope).finish_non_exhaustive()
    }
}

/// Exclusive access to the store for the lifetime of the guard
pub struct StoreGuard<'a> {
    entries: MutexGuard<'a, HashMap<String, StoreValue>>,
}

impl StoreGuard<'_> {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Borrow the value under `key`
    ///
    /// Returns `TypeMismatch` when the key exists but holds another type, which
    /// happens when two copies disagree on what a key contains.
    pub fn get<T: Any>(&self, key: &str) -> Result<Option<&T>, StateError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => (**value).downcast_ref::<T>().map(Some).ok_or_else(|| mismatch::<T>(key)),
        }
    }

    /// Mutably borrow the value under `key`
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Result<Option<&mut T>, StateError> {
        match self.entries.get_mut(key) {
            None => Ok(None),
            Some(value) => (**value).downcast_mut::<T>().map(Some).ok_or_else(|| mismatch::<T>(key)),
        }
    }

    /// Store `value` under `key`, returning whether a previous value was replaced
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> bool {
        self.entries.insert(key.into(), Box::new(value)).is_some()
    }

    /// Remove the value under `key`, returning whether it existed
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn mismatch<T>(key: &str) -> StateError {
    StateError::TypeMismatch {
        key: key.to_string(),
        expected: type_name::<T>(),
    }
}
