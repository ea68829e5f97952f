//! SharedState - process-wide coordination point for preloader copies
//!
//! Several plugins may each bundle their own, mutually incompatible version of
//! the preloader. Statics declared inside the preloader are private to each
//! copy, so they cannot be used to agree on anything. This crate is the one
//! piece every copy links against in the same semver-stable version, which
//! makes its process anchor the single store all of them find.
//!
//! Everything placed in the store must be a type all copies agree on: std and
//! tokio types, or the types declared here. Changing the layout of the types in
//! this crate is a breaking change for every preloader release at once.
//!
//! # Architecture
//!
//! ```text
//!   preloader v1 ──┐                 ┌── StateCell<T>      (versioned initializer election)
//!   preloader v2 ──┼── StoreLocator ─┤── Signal            (change callbacks)
//!   preloader v3 ──┘        │        ├── Binding<T>        (reactive value for presentation)
//!                           ▼        └── FeatureSingleton  (owner-tagged implementation slot)
//!                      SharedStore
//!               Mutex<HashMap<String, Box<dyn Any>>>
//! ```
//!
//! Compound sequences lock the store once and work through the
//! [`StoreGuard`]; the store is intentionally not a concurrent map because
//! callers decide how many operations must be atomic together.
//!
//! # Example
//!
//! ```
//! use sharedstate::{ProcessAnchor, resolve};
//!
//! let store = resolve(&ProcessAnchor);
//! let counter = store.get_or_create("demo", "counter", 1, |_| 0u32);
//!
//! let mut guard = store.lock();
//! counter.with_mut(&mut guard, |value| *value += 1).unwrap();
//! assert_eq!(counter.get(&mut guard).unwrap(), 1);
//! ```

mod binding;
mod cell;
mod error;
mod feature;
mod locator;
mod portable;
mod signal;
mod store;

pub use binding::Binding;
pub use cell::{CellState, Initializer, StateCell};
pub use error::StateError;
pub use feature::FeatureSingleton;
pub use locator::{HostAnchor, ProcessAnchor, StoreLocator, resolve};
pub use portable::{PortableOperation, STATE_DONE, STATE_FAILED, STATE_PENDING, STATE_RUNNING};
pub use signal::{Signal, Subscriber};
pub use store::{SharedStore, StoreGuard, StoreScope};
