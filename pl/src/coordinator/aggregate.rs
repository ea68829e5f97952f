//! Aggregate handler - runs in the instance whose change-signal initializer won
//!
//! Called with the store guard held on every change of the shared list:
//! recompute the status, replace the notification, and once everything
//! finished either schedule its removal and the autoload resume, or leave
//! the failure notification up for the user to dismiss.

use sharedstate::StoreGuard;
use tracing::{debug, error, info, warn};

use super::core::Inner;
use crate::gate;
use crate::status::AggregateStatus;

pub(crate) fn on_aggregate_changed(inner: &Inner, guard: &mut StoreGuard<'_>) {
    let operations = match inner.cells.operations.get(guard) {
        Ok(binding) => binding.snapshot(),
        Err(e) => {
            error!(instance = %inner.label, error = %e, "on_aggregate_changed: shared list unreadable");
            return;
        }
    };

    let autoload = match inner.cells.requested_autoload.get(guard) {
        Ok(target) => target,
        Err(e) => {
            error!(instance = %inner.label, error = %e, "on_aggregate_changed: autoload state unreadable");
            None
        }
    };

    if operations.is_empty() {
        debug!(instance = %inner.label, "on_aggregate_changed: no operations");
        return;
    }

    let status = AggregateStatus::compute(&operations);
    debug!(
        instance = %inner.label,
        total = status.total,
        finished = status.finished,
        failed = status.failed,
        autoload = ?autoload,
        "on_aggregate_changed: recomputed"
    );

    // title and action cannot be updated in place
    let id = inner.config.notification_id.as_str();
    inner.notifications.remove(id, None);
    inner.notifications.replace(status.notification(id, autoload.as_deref()));

    if !status.is_finished() {
        return;
    }

    if status.any_failed() {
        if let Some(target) = &autoload {
            warn!(instance = %inner.label, %target, "on_aggregate_changed: preloading failed, autoload cancelled");
        }
        return;
    }

    info!(instance = %inner.label, total = status.total, "on_aggregate_changed: all operations done");
    inner.notifications.remove(id, Some(inner.config.removal_delay()));

    if let Some(target) = autoload {
        inner.cells.requested_autoload.set(guard, None);
        gate::schedule_resume(&inner.host, target);
    }
}
