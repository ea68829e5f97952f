//! StateCell - typed accessor with versioned initializer election
//!
//! Each cell owns two keys in the store:
//! - `{namespace}::{key}` holds the value once materialized
//! - `{namespace}::{key}__initializer` holds the winning [`Initializer`]
//!
//! Every copy offers its own initializer with a version number. Until the
//! value is first read, an offer with a version greater than or equal to the
//! installed one replaces it. The first read runs the winner and freezes the
//! election.
//!
//! ```text
//!   Unregistered ──offer──▶ Registered(v) ──offer(w >= v)──▶ Registered(w)
//!                                │
//!                              read
//!                                ▼
//!                         Materialized(v)   (further offers are ignored)
//! ```
//!
//! Reads take the store guard, so check, compute and write happen under one
//! lock and two first reads can never both run an initializer.

use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::StateError;
use crate::store::{SharedStore, StoreGuard};

type InitFn<T> = Arc<dyn Fn(&mut StoreGuard<'_>) -> T + Send + Sync>;

/// A versioned factory for a cell value
pub struct Initializer<T> {
    pub version: u16,
    function: InitFn<T>,
}

impl<T> Initializer<T> {
    pub fn new<F>(version: u16, function: F) -> Self
    where
        F: Fn(&mut StoreGuard<'_>) -> T + Send + Sync + 'static,
    {
        Self {
            version,
            function: Arc::new(function),
        }
    }

    fn run(&self, guard: &mut StoreGuard<'_>) -> T {
        (self.function)(guard)
    }
}

impl<T> Clone for Initializer<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            function: Arc::clone(&self.function),
        }
    }
}

impl<T> std::fmt::Debug for Initializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Initializer").field("version", &self.version).finish_non_exhaustive()
    }
}

/// Where a cell stands in the election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Unregistered,
    Registered { version: u16 },
    /// `version` is `None` when the value was written without any initializer
    Materialized { version: Option<u16> },
}

/// Typed handle on one key of the [`SharedStore`]
pub struct StateCell<T> {
    key: String,
    initializer_key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            initializer_key: self.initializer_key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCell").field("key", &self.key).finish()
    }
}

impl<T: Any + Send + Sync> StateCell<T> {
    /// Bind a cell without offering an initializer
    pub fn new(namespace: &str, key: &str) -> Self {
        let key = format!("{namespace}::{key}");
        let initializer_key = format!("{key}__initializer");
        Self {
            key,
            initializer_key,
            _marker: PhantomData,
        }
    }

    /// Bind a cell and offer `initializer` at `version` to the election
    pub fn register<F>(store: &SharedStore, namespace: &str, key: &str, version: u16, initializer: F) -> Self
    where
        F: Fn(&mut StoreGuard<'_>) -> T + Send + Sync + 'static,
    {
        let cell = Self::new(namespace, key);
        let in_use = {
            let mut guard = store.lock();
            cell.offer(&mut guard, Initializer::new(version, initializer))
        };

        debug!(
            key = %cell.key,
            offered = version,
            in_use = ?in_use,
            "StateCell::register: got initializer ver. {}, use ver. {:?}",
            version,
            in_use
        );
        cell
    }

    /// Offer an initializer under an already held lock
    ///
    /// Returns the version of the initializer in effect afterwards.
    pub fn offer(&self, guard: &mut StoreGuard<'_>, incoming: Initializer<T>) -> Option<u16> {
        let existing = match guard.get::<Initializer<T>>(&self.initializer_key) {
            Ok(existing) => existing.map(|initializer| initializer.version),
            Err(e) => {
                error!(key = %self.key, error = %e, "StateCell::offer: incompatible initializer installed, keeping it");
                return None;
            }
        };

        if guard.contains(&self.key) {
            debug!(key = %self.key, "StateCell::offer: value already materialized, election is closed");
            return existing;
        }

        match existing {
            Some(version) if version > incoming.version => Some(version),
            _ => {
                let version = incoming.version;
                guard.insert(self.initializer_key.clone(), incoming);
                Some(version)
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the value has been read or written at least once
    pub fn is_initialized(&self, guard: &StoreGuard<'_>) -> bool {
        guard.contains(&self.key)
    }

    pub fn state(&self, guard: &StoreGuard<'_>) -> CellState {
        let version = guard
            .get::<Initializer<T>>(&self.initializer_key)
            .ok()
            .flatten()
            .map(|initializer| initializer.version);

        match (guard.contains(&self.key), version) {
            (true, version) => CellState::Materialized { version },
            (false, Some(version)) => CellState::Registered { version },
            (false, None) => CellState::Unregistered,
        }
    }

    /// Run the winning initializer unless the value already exists
    ///
    /// Returns `false` if the value was already initialized. The initializer
    /// receives the guard and must not read this same cell.
    pub fn maybe_initialize(&self, guard: &mut StoreGuard<'_>) -> Result<bool, StateError> {
        if guard.contains(&self.key) {
            return Ok(false);
        }

        let initializer = guard
            .get::<Initializer<T>>(&self.initializer_key)?
            .cloned()
            .ok_or_else(|| StateError::NoInitializer { key: self.key.clone() })?;

        let value = initializer.run(guard);
        guard.insert(self.key.clone(), value);

        debug!(
            key = %self.key,
            version = initializer.version,
            "StateCell::maybe_initialize: initialized state value"
        );
        Ok(true)
    }

    /// Read a clone of the value, materializing it first if needed
    pub fn get(&self, guard: &mut StoreGuard<'_>) -> Result<T, StateError>
    where
        T: Clone,
    {
        self.with_mut(guard, |value| value.clone())
    }

    /// Mutate the value in place, materializing it first if needed
    pub fn with_mut<R>(&self, guard: &mut StoreGuard<'_>, f: impl FnOnce(&mut T) -> R) -> Result<R, StateError> {
        self.maybe_initialize(guard)?;
        let value = guard.get_mut::<T>(&self.key)?.ok_or_else(|| StateError::TypeMismatch {
            key: self.key.clone(),
            expected: type_name::<T>(),
        })?;
        Ok(f(value))
    }

    /// Unconditionally overwrite the value
    pub fn set(&self, guard: &mut StoreGuard<'_>, value: T) {
        guard.insert(self.key.clone(), value);
    }

    /// Delete the value; the next read runs the initializer again
    pub fn remove(&self, guard: &mut StoreGuard<'_>) -> bool {
        guard.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offer_versions(store: &SharedStore, versions: &[u16]) -> StateCell<u16> {
        let mut cell = None;
        for &version in versions {
            cell = Some(store.get_or_create("test", "elected", version, move |_| version));
        }
        cell.unwrap()
    }

    #[test]
    fn test_highest_version_wins() {
        let store = SharedStore::local();
        let cell = offer_versions(&store, &[3, 1, 5, 2]);

        let mut guard = store.lock();
        assert_eq!(cell.state(&guard), CellState::Registered { version: 5 });
        assert_eq!(cell.get(&mut guard).unwrap(), 5);
        assert_eq!(cell.state(&guard), CellState::Materialized { version: Some(5) });
    }

    #[test]
    fn test_equal_version_replaces() {
        let store = SharedStore::local();
        let _first = store.get_or_create("test", "tie", 2, |_| "first");
        let cell = store.get_or_create("test", "tie", 2, |_| "second");

        let mut guard = store.lock();
        assert_eq!(cell.get(&mut guard).unwrap(), "second");
    }

    #[test]
    fn test_election_frozen_after_materialization() {
        let store = SharedStore::local();
        let cell = offer_versions(&store, &[1]);
        {
            let mut guard = store.lock();
            assert_eq!(cell.get(&mut guard).unwrap(), 1);
        }

        let later = store.get_or_create("test", "elected", 9, |_| 9u16);

        let mut guard = store.lock();
        assert_eq!(later.get(&mut guard).unwrap(), 1);
        assert_eq!(later.state(&guard), CellState::Materialized { version: Some(1) });
    }

    #[test]
    fn test_initializer_runs_once() {
        let store = SharedStore::local();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let cell = store.get_or_create("test", "once", 1, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![1u8, 2, 3]
        });

        let mut guard = store.lock();
        assert!(cell.maybe_initialize(&mut guard).unwrap());
        assert!(!cell.maybe_initialize(&mut guard).unwrap());
        assert_eq!(cell.get(&mut guard).unwrap(), vec![1, 2, 3]);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_reinitializes() {
        let store = SharedStore::local();
        let cell = store.get_or_create("test", "removable", 1, |_| 7u8);

        let mut guard = store.lock();
        cell.set(&mut guard, 1);
        assert_eq!(cell.get(&mut guard).unwrap(), 1);

        assert!(cell.remove(&mut guard));
        assert!(!cell.is_initialized(&guard));
        assert_eq!(cell.get(&mut guard).unwrap(), 7);
    }

    #[test]
    fn test_read_without_initializer() {
        let store = SharedStore::local();
        let cell = StateCell::<u8>::new("test", "orphan");

        let mut guard = store.lock();
        assert_eq!(cell.state(&guard), CellState::Unregistered);
        let err = cell.get(&mut guard).unwrap_err();
        assert!(matches!(err, StateError::NoInitializer { .. }));

        cell.set(&mut guard, 3);
        assert_eq!(cell.state(&guard), CellState::Materialized { version: None });
    }

    #[test]
    fn test_initializer_can_read_other_cells() {
        let store = SharedStore::local();
        let base = store.get_or_create("test", "base", 1, |_| 10u32);
        let derived_base = base.clone();
        let derived = store.get_or_create("test", "derived", 1, move |guard| {
            derived_base.get(guard).unwrap_or_default() * 2
        });

        let mut guard = store.lock();
        assert_eq!(derived.get(&mut guard).unwrap(), 20);
        assert!(base.is_initialized(&guard));
    }

    #[test]
    fn test_with_mut_updates_in_place() {
        let store = SharedStore::local();
        let cell = store.get_or_create("test", "list", 1, |_| Vec::<String>::new());

        let mut guard = store.lock();
        cell.with_mut(&mut guard, |list| list.push("a".to_string())).unwrap();
        let len = cell.with_mut(&mut guard, |list| list.len()).unwrap();
        assert_eq!(len, 1);
    }

    proptest! {
        #[test]
        fn prop_max_version_wins(versions in proptest::collection::vec(0u16..100, 1..12)) {
            let store = SharedStore::local();
            let cell = offer_versions(&store, &versions);

            let mut guard = store.lock();
            let expected = versions.iter().copied().max().unwrap();
            prop_assert_eq!(cell.get(&mut guard).unwrap(), expected);
        }
    }
}
