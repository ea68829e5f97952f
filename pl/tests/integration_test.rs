//! Integration tests for the preloader
//!
//! Several preloader instances share one store, the way independently
//! versioned plugins meet in a host process. The host is faked: its ticks
//! only run when a test says so.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eyre::eyre;
use preloader::host::NotificationAction;
use preloader::{
    BootPhase, DialogSink, ErrorDialog, Host, HostError, MainContext, MenuPresenter, MenuState, Notification,
    NotificationSink, OperationError, OperationState, Preloader, Step, Tick,
};
use sharedstate::{HostAnchor, SharedStore};

// =============================================================================
// Fakes
// =============================================================================

struct FakeHost {
    phase: Mutex<BootPhase>,
    requested: Mutex<Option<String>>,
    fallbacks: Mutex<usize>,
    resumed: Mutex<Vec<String>>,
    ticks: Mutex<Vec<Tick>>,
}

impl FakeHost {
    fn new(phase: BootPhase, requested: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(phase),
            requested: Mutex::new(requested.map(str::to_string)),
            fallbacks: Mutex::new(0),
            resumed: Mutex::new(Vec::new()),
            ticks: Mutex::new(Vec::new()),
        })
    }

    fn run_ticks(&self) {
        let ticks = std::mem::take(&mut *self.ticks.lock().unwrap());
        for tick in ticks {
            tick();
        }
    }

    /// Run frames until nothing is queued: migration, then the boot decision
    fn boot(&self) {
        while !self.ticks.lock().unwrap().is_empty() {
            self.run_ticks();
        }
    }

    fn resumed(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }

    fn fallbacks(&self) -> usize {
        *self.fallbacks.lock().unwrap()
    }
}

impl Host for FakeHost {
    fn phase(&self) -> BootPhase {
        self.phase.lock().unwrap().clone()
    }

    fn requested_autoload(&self) -> Option<String> {
        self.requested.lock().unwrap().clone()
    }

    fn force_fallback(&self) -> Result<(), HostError> {
        *self.requested.lock().unwrap() = None;
        *self.phase.lock().unwrap() = BootPhase::MainMenu;
        *self.fallbacks.lock().unwrap() += 1;
        Ok(())
    }

    fn resume_autoload(&self, target: &str) -> Result<(), HostError> {
        self.resumed.lock().unwrap().push(target.to_string());
        Ok(())
    }

    fn schedule_next_tick(&self, task: Tick) {
        self.ticks.lock().unwrap().push(task);
    }
}

#[derive(Default)]
struct Screen {
    notifications: Mutex<Vec<Notification>>,
    removals: Mutex<Vec<Option<Duration>>>,
    dialogs: Mutex<Vec<ErrorDialog>>,
}

impl Screen {
    fn last_notification(&self) -> Option<Notification> {
        self.notifications.lock().unwrap().last().cloned()
    }

    fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    fn dialogs(&self) -> Vec<ErrorDialog> {
        self.dialogs.lock().unwrap().clone()
    }
}

impl NotificationSink for Screen {
    fn replace(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    fn remove(&self, _id: &str, delay: Option<Duration>) {
        self.removals.lock().unwrap().push(delay);
    }
}

impl DialogSink for Screen {
    fn show_error(&self, dialog: ErrorDialog) {
        self.dialogs.lock().unwrap().push(dialog);
    }
}

fn instance(
    label: &str,
    version: u16,
    host: &Arc<FakeHost>,
    store: &Arc<SharedStore>,
    screen: &Arc<Screen>,
) -> Preloader {
    Preloader::builder(label, host.clone())
        .version(version)
        .store(store.clone())
        .notifications(screen.clone())
        .dialogs(screen.clone())
        .build()
}

// =============================================================================
// Shared list
// =============================================================================

#[test]
fn test_operations_merge_across_instances() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    let beta = instance("Beta", 2, &host, &store, &screen);

    let early: Vec<_> = (0..3)
        .map(|i| alpha.register_handle("Alpha", &format!("early {i}")).start().unwrap())
        .collect();
    let beta_early = beta.register_handle("Beta", "early").start().unwrap();

    host.boot();
    assert!(alpha.is_late_initialized() && beta.is_late_initialized());
    assert_eq!(alpha.operations().len(), 4);

    let late: Vec<_> = (0..2)
        .map(|i| beta.register_handle("Beta", &format!("late {i}")).start().unwrap())
        .collect();

    let operations = alpha.operations();
    assert_eq!(operations.len(), 6);
    assert_eq!(beta.operations(), operations);
    let ids: HashSet<_> = operations.iter().map(|op| op.id.clone()).collect();
    assert_eq!(ids.len(), 6);

    early.into_iter().chain(late).for_each(|handle| handle.complete());
    beta_early.complete();

    let status = beta.status();
    assert!(status.is_finished());
    assert_eq!(status.total, 6);
    assert!(alpha.operations().iter().all(|op| op.state == "Done"));
}

#[test]
fn test_newest_instance_drives_notifications() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let store = SharedStore::new_shared();
    let old_screen = Arc::new(Screen::default());
    let new_screen = Arc::new(Screen::default());
    let old = instance("Old", 1, &host, &store, &old_screen);
    let _new = instance("New", 4, &host, &store, &new_screen);

    let handle = old.register_handle("Old", "Index").start().unwrap();
    host.boot();
    handle.complete();

    assert_eq!(old_screen.notification_count(), 0);
    let last = new_screen.last_notification().unwrap();
    assert_eq!(last.title, "Plugins preloaded successfully");
    assert_eq!(last.percent, 100);
    assert_eq!(new_screen.removals.lock().unwrap().last().copied(), Some(Some(Duration::from_millis(2000))));
}

#[test]
fn test_missing_store_degrades_to_isolated_instance() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let isolated = Preloader::builder("Isolated", host.clone())
        .locator(&HostAnchor::missing())
        .build();
    assert!(!isolated.store().is_shared());

    let handle = isolated.register_handle("Isolated", "Index").start().unwrap();
    host.boot();
    handle.complete();

    assert_eq!(isolated.operations().len(), 1);
    assert!(isolated.status().is_finished());
}

// =============================================================================
// Autoload gate
// =============================================================================

#[test]
fn test_autoload_withheld_then_resumed_once() {
    let host = FakeHost::new(BootPhase::Autoload, Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    let beta = instance("Beta", 2, &host, &store, &screen);

    let first = alpha.register_handle("Alpha", "Load presets").start().unwrap();
    let second = beta.register_handle("Beta", "Decode atlas").start().unwrap();
    host.boot();

    assert_eq!(host.fallbacks(), 1);
    assert_eq!(host.phase(), BootPhase::MainMenu);
    assert_eq!(alpha.withheld_autoload().as_deref(), Some("Campaign"));
    assert_eq!(screen.last_notification().unwrap().title, "Delayed auto load of “Campaign”");

    first.complete();
    host.run_ticks();
    assert!(host.resumed().is_empty());

    second.complete();
    assert!(host.resumed().is_empty());
    host.run_ticks();
    host.run_ticks();

    assert_eq!(host.resumed(), vec!["Campaign".to_string()]);
    assert_eq!(beta.withheld_autoload(), None);
    assert_eq!(
        screen.last_notification().unwrap().body,
        "All plugins preloaded, auto loading will resume now!"
    );
}

#[test]
fn test_failed_operation_cancels_autoload() {
    let host = FakeHost::new(BootPhase::Autoload, Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);

    let handle = alpha.register_handle("Alpha", "Load presets").start().unwrap();
    host.boot();
    handle.fail("presets are corrupt");
    host.run_ticks();

    assert!(host.resumed().is_empty());
    let last = screen.last_notification().unwrap();
    assert_eq!(last.title, "Some plugins failed to preload");
    assert_eq!(last.action, Some(NotificationAction::Dismiss));

    let dialogs = screen.dialogs();
    assert_eq!(dialogs.len(), 1);
    assert_eq!(dialogs[0].title, "Error while preloading “Alpha”");
}

#[test]
fn test_nothing_outstanding_leaves_autoload_alone() {
    let host = FakeHost::new(BootPhase::Autoload, Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);

    alpha.register_handle("Alpha", "Quick").start().unwrap().complete();
    host.boot();

    assert_eq!(host.fallbacks(), 0);
    assert_eq!(host.requested_autoload().as_deref(), Some("Campaign"));
    assert_eq!(alpha.withheld_autoload(), None);
}

#[test]
fn test_unexpected_phase_warns_once() {
    let host = FakeHost::new(BootPhase::Unexpected("loading".to_string()), Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    let beta = instance("Beta", 2, &host, &store, &screen);

    let first = alpha.register_handle("Alpha", "A").start().unwrap();
    let second = beta.register_handle("Beta", "B").start().unwrap();
    host.boot();
    first.complete();
    second.complete();
    host.run_ticks();

    assert_eq!(host.fallbacks(), 0);
    assert!(host.resumed().is_empty());
    let dialogs = screen.dialogs();
    assert_eq!(dialogs.len(), 1);
    assert_eq!(dialogs[0].title, preloader::gate::UNEXPECTED_PHASE_TITLE);
}

#[test]
fn test_gate_waits_for_every_instance_to_migrate() {
    let host = FakeHost::new(BootPhase::Autoload, Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    let beta = instance("Beta", 2, &host, &store, &screen);

    alpha.register_handle("Alpha", "Quick").start().unwrap().complete();
    let slow = beta.register_handle("Beta", "Slow").start().unwrap();

    host.run_ticks();
    assert_eq!(host.fallbacks(), 0);
    assert_eq!(screen.notification_count(), 0);

    host.run_ticks();
    assert_eq!(host.fallbacks(), 1);
    assert_eq!(alpha.withheld_autoload().as_deref(), Some("Campaign"));
    let last = screen.last_notification().unwrap();
    assert_eq!(last.title, "Delayed auto load of “Campaign”");
    assert_eq!(last.percent, 50);
    assert!(screen.removals.lock().unwrap().iter().all(Option::is_none));

    slow.complete();
    host.run_ticks();
    assert_eq!(host.resumed(), vec!["Campaign".to_string()]);
}

#[test]
fn test_gate_frozen_after_boot() {
    let host = FakeHost::new(BootPhase::Autoload, Some("Campaign"));
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    host.boot();

    *host.phase.lock().unwrap() = BootPhase::Unexpected("in game".to_string());
    let handle = alpha.register_handle("Alpha", "Late work").start().unwrap();
    assert_eq!(screen.last_notification().unwrap().percent, 0);
    handle.complete();
    host.boot();

    assert_eq!(host.fallbacks(), 0);
    assert!(host.resumed().is_empty());
    assert!(screen.dialogs().is_empty());
    assert_eq!(alpha.withheld_autoload(), None);
}

// =============================================================================
// Futures, sequences and presentation
// =============================================================================

#[tokio::test]
async fn test_future_failure_with_handler_skips_dialog() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let alpha = instance("Alpha", 1, &host, &store, &screen);
    host.boot();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let operation = alpha
        .register_future("Alpha", "Fetch", || async { Err(eyre!("network down")) })
        .on_failure(move |e: &OperationError| sink.lock().unwrap().push(e.to_string()));

    let result = operation.start().unwrap().await;

    assert!(result.is_err());
    assert_eq!(operation.state(), OperationState::Failed);
    assert_eq!(seen.lock().unwrap().clone(), vec!["network down".to_string()]);
    assert!(screen.dialogs().is_empty());
}

#[tokio::test]
async fn test_sequence_runs_on_main_context() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let context = MainContext::start("test-main").unwrap();
    let alpha = Preloader::builder("Alpha", host.clone())
        .store(SharedStore::new_shared())
        .main_context(context.clone())
        .build();
    host.boot();

    let steps = vec![Ok(Step::Continue), Ok(Step::Sleep(Duration::from_millis(5))), Ok(Step::Continue)];
    let done = alpha.register_sequence("Alpha", "Bake", steps);
    done.start().unwrap().await.unwrap();
    assert_eq!(done.state(), OperationState::Done);

    let broken = alpha.register_sequence(
        "Alpha",
        "Bake again",
        vec![Ok(Step::Continue), Err(eyre!("oven on fire")), Ok(Step::Continue)],
    );
    let err = broken.start().unwrap().await.unwrap_err();
    assert!(err.to_string().contains("oven on fire"));
    assert_eq!(broken.state(), OperationState::Failed);

    context.shutdown();
}

#[tokio::test]
async fn test_menu_presented_by_newest_instance() {
    let host = FakeHost::new(BootPhase::MainMenu, None);
    let store = SharedStore::new_shared();
    let screen = Arc::new(Screen::default());
    let old = instance("Old", 1, &host, &store, &screen);
    let new = instance("New", 3, &host, &store, &screen);

    let handle = old.register_handle("Old", "Index").start().unwrap();
    host.boot();

    assert!(MenuPresenter::attach(&old).unwrap().is_none());
    let mut presenter = MenuPresenter::attach(&new).unwrap().unwrap();
    assert_eq!(presenter.owner(), "New");
    assert_eq!(presenter.current(), MenuState::Busy { outstanding: 1 });
    assert!(!presenter.current().controls_enabled());

    handle.complete();
    let state = tokio::time::timeout(Duration::from_secs(1), presenter.changed())
        .await
        .unwrap();
    assert_eq!(state, Some(MenuState::Idle));
}
