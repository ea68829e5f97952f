//! Boot gate - hold back the host's autoload while plugins preload
//!
//! ```text
//!   boot decision, one tick after late initialization
//!        │  (materializes the autoload cell, frozen afterwards)
//!        ▼
//!   prevent_autoload ── nothing outstanding ──▶ None (host boots normally)
//!        │
//!        ├── unexpected phase / host error ──▶ log + one-time dialog, None
//!        │
//!        └── force_fallback, remember target ──▶ Some(target)
//!                                                   │ all Done
//!                                                   ▼
//!                              schedule_resume ──next tick──▶ resume_autoload
//! ```

use std::sync::Arc;

use sharedstate::StoreGuard;
use tracing::{debug, error, info};

use crate::coordinator::Inner;
use crate::host::{BootPhase, ErrorDialog, Host};

pub const UNEXPECTED_PHASE_TITLE: &str = "Do not use the auto-load shortcut!";

const UNEXPECTED_PHASE_MESSAGE: &str = "This is a message from plugins. Some plugins need to preload data before \
     a save is loaded, and the automatic load could not be held back in time. You may experience issues; we \
     recommend restarting and loading your save from the main menu.";

/// Initializer of the requested-autoload cell
///
/// Runs at most once per process, in whichever instance won the election.
pub(crate) fn prevent_autoload(inner: &Inner, guard: &mut StoreGuard<'_>) -> Option<String> {
    let outstanding = match inner.cells.operations.get(guard) {
        Ok(binding) => binding.snapshot().iter().filter(|op| !op.is_terminal()).count(),
        Err(e) => {
            error!(instance = %inner.label, error = %e, "prevent_autoload: shared list unreadable");
            0
        }
    };

    if outstanding == 0 {
        debug!(instance = %inner.label, "prevent_autoload: nothing outstanding, not gating");
        return None;
    }

    let phase = inner.host.phase();
    if let BootPhase::Unexpected(description) = &phase {
        warn_unexpected_phase(
            inner,
            guard,
            format!("Unexpected phase when gating autoload, expected MainMenu or Autoload, got {description}"),
        );
        return None;
    }

    let target = inner.host.requested_autoload();
    if let Err(e) = inner.host.force_fallback() {
        warn_unexpected_phase(inner, guard, format!("Failed to hold back the autoload: {e}"));
        return None;
    }

    match &target {
        Some(target) => info!(
            instance = %inner.label,
            %target,
            outstanding,
            "prevent_autoload: prevented auto load because some plugins are preloading"
        ),
        None => debug!(instance = %inner.label, ?phase, "prevent_autoload: fallback forced, no target requested"),
    }
    target
}

/// Log, then show the warning dialog unless it was already shown in this process
fn warn_unexpected_phase(inner: &Inner, guard: &mut StoreGuard<'_>, details: String) {
    error!(instance = %inner.label, %details, "warn_unexpected_phase: loading sequence issue");

    let already_shown = inner
        .cells
        .warned
        .with_mut(guard, |warned| std::mem::replace(warned, true))
        .unwrap_or_else(|e| {
            error!(error = %e, "warn_unexpected_phase: warning flag unreadable");
            false
        });

    if !already_shown {
        inner.dialogs.show_error(ErrorDialog {
            title: UNEXPECTED_PHASE_TITLE.to_string(),
            message: UNEXPECTED_PHASE_MESSAGE.to_string(),
            details: Some(details),
        });
    }
}

/// Resume the withheld autoload on the host's next tick, outside the store lock
pub(crate) fn schedule_resume(host: &Arc<dyn Host>, target: String) {
    debug!(%target, "schedule_resume: called");
    let resumer = Arc::clone(host);
    host.schedule_next_tick(Box::new(move || resume_autoload(resumer.as_ref(), &target)));
}

fn resume_autoload(host: &dyn Host, target: &str) {
    let phase = host.phase();
    if phase != BootPhase::MainMenu {
        error!(%target, ?phase, "resume_autoload: unexpected phase, expected MainMenu");
        return;
    }

    match host.resume_autoload(target) {
        Ok(()) => info!(%target, "resume_autoload: resumed"),
        Err(e) => error!(%target, error = %e, "resume_autoload: host refused to resume"),
    }
}
