//! FeatureSingleton - one owner-tagged implementation per named feature
//!
//! Every copy registers its implementation of a feature. Before anyone
//! resolves the feature, the highest version wins (ties go to the latest
//! registrant). The first resolve runs the winning implementation once and
//! pins the result; later registrations are ignored with a warning.
//!
//! `resolve` also reports whether the caller's owner is the one in charge,
//! which lets several copies agree on which of them drives a shared concern.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::StateError;
use crate::store::{SharedStore, StoreGuard};

type Implementation<T> = Arc<dyn Fn() -> T + Send + Sync>;

struct FeatureSlot<T> {
    version: u16,
    owner: String,
    implementation: Implementation<T>,
    value: Option<T>,
}

/// Handle on a named feature, tagged with the owner using it
#[derive(Debug, Clone)]
pub struct FeatureSingleton<T> {
    key: String,
    owner: String,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Any + Clone + Send + Sync> FeatureSingleton<T> {
    /// Offer `implementation` for feature `name`
    ///
    /// The implementation must not touch the store; it runs under the lock.
    pub fn register<F>(store: &SharedStore, name: &str, version: u16, owner: &str, implementation: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let feature = Self {
            key: format!("feature::{name}"),
            owner: owner.to_string(),
            _marker: std::marker::PhantomData,
        };

        let mut guard = store.lock();
        let existing = match guard.get::<FeatureSlot<T>>(&feature.key) {
            Ok(slot) => slot.map(|slot| (slot.version, slot.owner.clone(), slot.value.is_some())),
            Err(e) => {
                warn!(feature = %name, error = %e, "FeatureSingleton::register: incompatible feature slot, ignoring");
                return feature;
            }
        };

        match existing {
            Some((_, in_charge, true)) => {
                warn!(
                    feature = %name,
                    %owner,
                    %in_charge,
                    "FeatureSingleton::register: feature already resolved, registration ignored"
                );
            }
            Some((existing_version, in_charge, false)) if existing_version > version => {
                debug!(
                    feature = %name,
                    %owner,
                    version,
                    existing_version,
                    %in_charge,
                    "FeatureSingleton::register: newer implementation already registered"
                );
            }
            _ => {
                debug!(feature = %name, %owner, version, "FeatureSingleton::register: installing implementation");
                guard.insert(
                    feature.key.clone(),
                    FeatureSlot {
                        version,
                        owner: owner.to_string(),
                        implementation: Arc::new(implementation),
                        value: None,
                    },
                );
            }
        }
        feature
    }

    /// Resolve the feature, returning its value and whether this owner is in charge
    pub fn resolve(&self, store: &SharedStore) -> Result<(T, bool), StateError> {
        let mut guard = store.lock();
        self.resolve_in(&mut guard)
    }

    /// Same as [`resolve`](Self::resolve) for callers already holding the lock
    pub fn resolve_in(&self, guard: &mut StoreGuard<'_>) -> Result<(T, bool), StateError> {
        let slot = guard
            .get_mut::<FeatureSlot<T>>(&self.key)?
            .ok_or_else(|| StateError::NoInitializer { key: self.key.clone() })?;

        let value = match &slot.value {
            Some(value) => value.clone(),
            None => {
                let value = (slot.implementation)();
                slot.value = Some(value.clone());
                debug!(
                    feature = %self.key,
                    owner = %slot.owner,
                    version = slot.version,
                    "FeatureSingleton::resolve_in: resolved implementation"
                );
                value
            }
        };
        Ok((value, slot.owner == self.owner))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}
