//! Cells every preloader copy registers in the shared store
//!
//! | Key                                  | Type                             | Initializer                  |
//! |--------------------------------------|----------------------------------|------------------------------|
//! | `cooperative_preloading.operations`  | `Binding<Vec<PortableOperation>>`| empty list on the channel    |
//! | `cooperative_preloading.changed`     | `Signal`                         | subscribes the aggregate handler |
//! | `cooperative_preloading.autoload`    | `Option<String>`                 | runs the boot gate           |
//! | `cooperative_preloading.warned`      | `bool`                           | `false`                      |
//!
//! Initializers capture a weak reference to the registering instance, so the
//! copy whose initializer wins the election is the one that reacts to changes.

use std::sync::Weak;

use sharedstate::{Binding, PortableOperation, SharedStore, Signal, StateCell};
use tracing::warn;

use super::aggregate;
use super::config::PreloaderConfig;
use super::core::Inner;
use crate::gate;

pub(crate) struct SharedCells {
    pub(crate) operations: StateCell<Binding<Vec<PortableOperation>>>,
    pub(crate) changed: StateCell<Signal>,
    pub(crate) requested_autoload: StateCell<Option<String>>,
    pub(crate) warned: StateCell<bool>,
}

impl SharedCells {
    pub(crate) fn register(store: &SharedStore, config: &PreloaderConfig, version: u16, instance: Weak<Inner>) -> Self {
        let namespace = config.namespace.as_str();

        let channel = config.binding_channel.clone();
        let operations = store.get_or_create(namespace, "cooperative_preloading.operations", version, move |_| {
            Binding::new(channel.clone(), Vec::new())
        });

        let subscriber = instance.clone();
        let changed = store.get_or_create(namespace, "cooperative_preloading.changed", version, move |_| {
            let mut signal = Signal::new();
            let instance = subscriber.clone();
            signal.subscribe("aggregate", move |guard| match instance.upgrade() {
                Some(inner) => aggregate::on_aggregate_changed(&inner, guard),
                None => warn!("SharedCells: preloader in charge of the aggregate was dropped"),
            });
            signal
        });

        let gatekeeper = instance;
        let requested_autoload =
            store.get_or_create(namespace, "cooperative_preloading.autoload", version, move |guard| {
                match gatekeeper.upgrade() {
                    Some(inner) => gate::prevent_autoload(&inner, guard),
                    None => {
                        warn!("SharedCells: preloader owning the boot gate was dropped, autoload not gated");
                        None
                    }
                }
            });

        let warned = store.get_or_create(namespace, "cooperative_preloading.warned", version, |_| false);

        Self {
            operations,
            changed,
            requested_autoload,
            warned,
        }
    }
}
