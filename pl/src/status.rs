//! Aggregate status - the merged view over every registered operation

use sharedstate::PortableOperation;

use crate::host::{Notification, NotificationAction, ProgressState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateStatus {
    pub total: usize,
    /// Done or Failed
    pub finished: usize,
    pub failed: usize,
    /// Distinct owners of running operations, in list order
    pub running_owners: Vec<String>,
}

impl AggregateStatus {
    pub fn compute(operations: &[PortableOperation]) -> Self {
        let mut status = Self {
            total: operations.len(),
            ..Default::default()
        };

        for operation in operations {
            if operation.is_terminal() {
                status.finished += 1;
            }
            if operation.is_failed() {
                status.failed += 1;
            }
            if operation.is_running() && !status.running_owners.contains(&operation.owner) {
                status.running_owners.push(operation.owner.clone());
            }
        }
        status
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished == self.total
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.finished * 100) / self.total) as u8
    }

    pub fn progress(&self) -> ProgressState {
        if !self.is_finished() {
            ProgressState::Progressing
        } else if self.any_failed() {
            ProgressState::Failed
        } else {
            ProgressState::Complete
        }
    }

    /// `autoload` is the gated autoload target, if any
    pub fn title(&self, autoload: Option<&str>) -> String {
        match autoload {
            _ if self.is_finished() && self.any_failed() => "Some plugins failed to preload".to_string(),
            _ if self.is_finished() => "Plugins preloaded successfully".to_string(),
            Some(target) => format!("Delayed auto load of “{target}”"),
            None => "Please wait, some plugins are preloading…".to_string(),
        }
    }

    pub fn body(&self, autoload: Option<&str>) -> String {
        match (autoload.is_some(), self.any_failed(), self.is_finished()) {
            (true, true, _) => "Auto loading was cancelled. Check for errors in notifications/logs.".to_string(),
            (true, false, true) => "All plugins preloaded, auto loading will resume now!".to_string(),
            (true, false, false) => "Save game loading will resume as soon as they’re done.".to_string(),
            (false, true, _) => "Check for errors in notifications, or logs.".to_string(),
            (false, false, true) => "Ready to play!".to_string(),
            (false, false, false) => format!("Waiting for: {}", self.running_owners.join(", ")),
        }
    }

    pub fn notification(&self, id: &str, autoload: Option<&str>) -> Notification {
        let action = (self.is_finished() && self.any_failed()).then_some(NotificationAction::Dismiss);
        Notification {
            id: id.to_string(),
            title: self.title(autoload),
            body: self.body(autoload),
            progress: self.progress(),
            percent: self.percent(),
            action,
        }
    }
}
