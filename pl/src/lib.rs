//! Preloader - cooperative preloading for independently versioned plugins
//!
//! Plugins register preloading operations (work that has to finish before a
//! save is loaded) with the preloader copy they bundle. The copies find each
//! other through a [`sharedstate`] store, keep one merged operation list, show
//! one progress notification, and hold back the host's autoload until every
//! operation is done.
//!
//! # Modules
//!
//! - [`operation`] - operation state machine and its adapters
//! - [`coordinator`] - the per-plugin [`Preloader`] and the shared list
//! - [`gate`] - autoload gating and resumption
//! - [`status`] - aggregate progress and notification texts
//! - [`presentation`] - main-menu state while preloading
//! - [`host`] - what the preloader needs from the host application
//! - [`main_context`] - single-threaded executor for step sequences
//! - [`sim`] - simulated host driving the `pl` binary
//! - [`config`] / [`cli`] - simulator configuration and command line

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod host;
pub mod main_context;
pub mod operation;
pub mod presentation;
pub mod sim;
pub mod status;

pub use config::Config;
pub use coordinator::{Preloader, PreloaderBuilder, PreloaderConfig};
pub use error::{HostError, OperationError, PreloadError};
pub use host::{BootPhase, DialogSink, ErrorDialog, Host, Notification, NotificationSink, Tick, TracingSink};
pub use main_context::MainContext;
pub use operation::{
    Execution, FutureOperation, HandleOperation, OperationHandle, OperationState, OperationTask, PreloadingOperation,
    Step,
};
pub use presentation::{MenuPresenter, MenuState};
pub use status::AggregateStatus;
