//! Host boundary - what the preloader needs from the application around it
//!
//! Three collaborators, all object-safe so every preloader copy can hold them
//! behind `Arc<dyn ...>`:
//! - [`Host`]: boot phase, autoload gate and next-tick scheduling
//! - [`NotificationSink`]: the single merged progress notification
//! - [`DialogSink`]: blocking error dialogs

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::HostError;

/// Work to run once on the host's next frame
pub type Tick = Box<dyn FnOnce() + Send>;

/// Where the host is in its boot sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootPhase {
    /// Interactive main menu, nothing is being loaded
    MainMenu,
    /// The host is about to load the requested autoload target
    Autoload,
    /// Anything else; the gate logs it and stays out of the way
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    Progressing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationAction {
    /// The user acknowledges the notification to close it
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub progress: ProgressState,
    pub percent: u8,
    pub action: Option<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDialog {
    pub title: String,
    pub message: String,
    /// Technical detail shown folded under the message
    pub details: Option<String>,
}

pub trait Host: Send + Sync {
    fn phase(&self) -> BootPhase;

    /// The save the host was asked to load on boot, if any
    fn requested_autoload(&self) -> Option<String>;

    /// Neutralize the autoload request so the host falls back to its menu
    fn force_fallback(&self) -> Result<(), HostError>;

    fn resume_autoload(&self, target: &str) -> Result<(), HostError>;

    fn schedule_next_tick(&self, task: Tick);
}

pub trait NotificationSink: Send + Sync {
    /// Show `notification`, replacing any with the same id
    fn replace(&self, notification: Notification);

    fn remove(&self, id: &str, delay: Option<Duration>);
}

pub trait DialogSink: Send + Sync {
    fn show_error(&self, dialog: ErrorDialog);
}

/// Sink that only writes to the log, used when no UI is attached
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn replace(&self, notification: Notification) {
        info!(
            id = %notification.id,
            title = %notification.title,
            body = %notification.body,
            progress = ?notification.progress,
            percent = notification.percent,
            "notification"
        );
    }

    fn remove(&self, id: &str, delay: Option<Duration>) {
        info!(%id, ?delay, "notification removed");
    }
}

impl DialogSink for TracingSink {
    fn show_error(&self, dialog: ErrorDialog) {
        error!(
            title = %dialog.title,
            message = %dialog.message,
            details = ?dialog.details,
            "error dialog"
        );
    }
}
