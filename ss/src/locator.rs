//! Store discovery
//!
//! A preloader copy never owns the store; it asks a [`StoreLocator`] for it.
//! The default [`ProcessAnchor`] lives in this crate, so every copy linked
//! against the same `sharedstate` release finds the same instance.
//! [`HostAnchor`] covers hosts that load plugins as dynamic libraries, where
//! each library carries its own statics and the host must hand the store over.

use std::sync::{Arc, Once, OnceLock};

use tracing::{debug, error, info};

use crate::error::StateError;
use crate::store::{SharedStore, StoreScope};

static PROCESS_STORE: OnceLock<Arc<SharedStore>> = OnceLock::new();
static FALLBACK_LOGGED: Once = Once::new();

/// Finds the store shared by every preloader copy in the process
pub trait StoreLocator: Send + Sync {
    fn locate(&self) -> Result<Arc<SharedStore>, StateError>;
}

/// The process-wide anchor held by this crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAnchor;

impl StoreLocator for ProcessAnchor {
    fn locate(&self) -> Result<Arc<SharedStore>, StateError> {
        let mut created = false;
        let store = PROCESS_STORE.get_or_init(|| {
            created = true;
            Arc::new(SharedStore::new(StoreScope::Shared))
        });

        if created {
            info!("ProcessAnchor::locate: created process shared state");
        } else {
            debug!("ProcessAnchor::locate: found process shared state");
        }
        Ok(Arc::clone(store))
    }
}

/// A store handed over explicitly by the host
#[derive(Debug, Clone, Default)]
pub struct HostAnchor {
    store: Option<Arc<SharedStore>>,
}

impl HostAnchor {
    pub fn new(store: Arc<SharedStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A host that did not provide any store
    pub fn missing() -> Self {
        Self { store: None }
    }
}

impl StoreLocator for HostAnchor {
    fn locate(&self) -> Result<Arc<SharedStore>, StateError> {
        self.store
            .clone()
            .ok_or_else(|| StateError::Unavailable("host did not provide a shared store".to_string()))
    }
}

/// Locate the shared store, degrading to a private one when that fails
///
/// The first failure in the process is logged as an error; later ones only at
/// debug level. The returned fallback has [`StoreScope::Local`], so other
/// copies will not see anything written to it.
pub fn resolve(locator: &dyn StoreLocator) -> Arc<SharedStore> {
    match locator.locate() {
        Ok(store) => store,
        Err(e) => {
            let mut first = false;
            FALLBACK_LOGGED.call_once(|| first = true);
            if first {
                error!(error = %e, "resolve: failed to locate shared state, coordination stays local to this copy");
            } else {
                debug!(error = %e, "resolve: shared state still unavailable, using a local store");
            }
            SharedStore::local()
        }
    }
}
