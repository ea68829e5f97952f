//! Preloader configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Preloader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloaderConfig {
    /// Namespace of every shared state key; copies must agree on it
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Identifier of the merged progress notification
    #[serde(rename = "notification-id", default = "default_notification_id")]
    pub notification_id: String,

    /// Delay before a successful notification is removed
    #[serde(rename = "removal-delay-ms", default = "default_removal_delay_ms")]
    pub removal_delay_ms: u64,

    /// Channel name of the operations binding
    #[serde(rename = "binding-channel", default = "default_binding_channel")]
    pub binding_channel: String,

    /// Run future operations on the worker pool unless told otherwise
    #[serde(rename = "worker-pool", default = "default_worker_pool")]
    pub worker_pool: bool,
}

fn default_namespace() -> String {
    debug!("default_namespace: called");
    "preloader".to_string()
}

fn default_notification_id() -> String {
    debug!("default_notification_id: called");
    "preloader.cooperative_preloading.preloader".to_string()
}

fn default_removal_delay_ms() -> u64 {
    debug!("default_removal_delay_ms: called");
    2000
}

fn default_binding_channel() -> String {
    debug!("default_binding_channel: called");
    "preloader.cooperative_preloading.operations".to_string()
}

fn default_worker_pool() -> bool {
    debug!("default_worker_pool: called");
    true
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        debug!("PreloaderConfig::default: called");
        Self {
            namespace: default_namespace(),
            notification_id: default_notification_id(),
            removal_delay_ms: default_removal_delay_ms(),
            binding_channel: default_binding_channel(),
            worker_pool: default_worker_pool(),
        }
    }
}

impl PreloaderConfig {
    /// Get the notification removal delay as a Duration
    pub fn removal_delay(&self) -> Duration {
        debug!(removal_delay_ms = %self.removal_delay_ms, "PreloaderConfig::removal_delay: called");
        Duration::from_millis(self.removal_delay_ms)
    }
}
