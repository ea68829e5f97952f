//! Coordinator - aggregates operations from every preloader copy
//!
//! Each plugin builds its own [`Preloader`]. Until the host's first tick,
//! snapshots stay in an instance-local list. On that tick the shared list is
//! created by the winning initializer and every instance migrates its local
//! snapshots into it exactly once. One tick later the autoload gate is
//! decided over the merged list; no aggregate recompute runs before that.
//!
//! ```text
//!   Preloader v1 ──┐ snapshots        ┌──────────────────────────────┐
//!   Preloader v2 ──┼─────────────────▶│ shared list (Binding)        │──▶ presentation
//!   Preloader v3 ──┘                  └──────────────┬───────────────┘
//!                                                    │ changed Signal
//!                                                    ▼
//!                                     aggregate handler (election winner)
//!                                        ├─▶ NotificationSink
//!                                        └─▶ boot gate / resume
//! ```

mod aggregate;
mod config;
mod core;
mod shared;

pub use self::config::PreloaderConfig;
pub use self::core::{Preloader, PreloaderBuilder};

pub(crate) use self::core::Inner;
