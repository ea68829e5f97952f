//! Simulated host - boots configured plugins through their preloader copies
//!
//! Every plugin gets its own [`Preloader`] (with its own version) over one
//! shared store, the way independently shipped plugins meet inside a single
//! host process. The host side is a frame loop: each frame runs the queued
//! next-tick work and samples the menu presenter, until every operation is
//! terminal and no tick is left.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use colored::Colorize;
use eyre::{Context, Result, eyre};
use rand::Rng;
use serde::Serialize;
use sharedstate::{PortableOperation, SharedStore};
use tracing::{debug, info, warn};

use crate::config::{Config, OperationConfig, OperationKind, PluginConfig};
use crate::coordinator::Preloader;
use crate::error::{HostError, OperationError};
use crate::host::{BootPhase, DialogSink, ErrorDialog, Host, Notification, NotificationSink, Tick};
use crate::main_context::MainContext;
use crate::operation::{Execution, Step};
use crate::presentation::{MenuPresenter, MenuState};
use crate::status::AggregateStatus;

const FRAME: Duration = Duration::from_millis(10);

/// Extra time allowed on top of the configured work before giving up
const SETTLE_GRACE: Duration = Duration::from_secs(5);

/// Something the host showed or did during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SimEvent {
    Notification(Notification),
    NotificationRemoved { id: String, delay_ms: Option<u64> },
    Dialog(ErrorDialog),
    FailureHandled { owner: String, operation: String, error: String },
    Fallback { target: Option<String> },
    Resumed { target: String },
    Menu { owner: String, state: String },
}

/// Records host-visible events, optionally echoing them to stderr
#[derive(Debug, Default)]
pub struct EventLog {
    echo: bool,
    events: Mutex<Vec<SimEvent>>,
}

impl EventLog {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, event: SimEvent) {
        if self.echo {
            echo(&event);
        }
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SimEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn echo(event: &SimEvent) {
    match event {
        SimEvent::Notification(n) => {
            eprintln!("{} {} [{}%] {}", "notify".cyan(), n.title.bold(), n.percent, n.body.dimmed())
        }
        SimEvent::NotificationRemoved { id, delay_ms: Some(delay) } => {
            eprintln!("{} {} in {}ms", "remove".cyan(), id, delay)
        }
        SimEvent::NotificationRemoved { .. } => {}
        SimEvent::Dialog(dialog) => {
            eprintln!("{} {}: {}", "dialog".red().bold(), dialog.title.bold(), dialog.message);
            if let Some(details) = &dialog.details {
                eprintln!("       {}", details.dimmed());
            }
        }
        SimEvent::FailureHandled { owner, operation, error } => {
            eprintln!("{} {} / {}: {}", "handled".yellow(), owner, operation, error)
        }
        SimEvent::Fallback { target } => match target {
            Some(target) => eprintln!("{} autoload of \"{}\" held back", "gate".yellow(), target),
            None => eprintln!("{} fell back to the main menu", "gate".yellow()),
        },
        SimEvent::Resumed { target } => eprintln!("{} loading \"{}\"", "resume".green().bold(), target),
        SimEvent::Menu { owner, state } => eprintln!("{} {} ({})", "menu".blue(), state, owner),
    }
}

impl NotificationSink for EventLog {
    fn replace(&self, notification: Notification) {
        self.record(SimEvent::Notification(notification));
    }

    fn remove(&self, id: &str, delay: Option<Duration>) {
        self.record(SimEvent::NotificationRemoved {
            id: id.to_string(),
            delay_ms: delay.map(|d| d.as_millis() as u64),
        });
    }
}

impl DialogSink for EventLog {
    fn show_error(&self, dialog: ErrorDialog) {
        self.record(SimEvent::Dialog(dialog));
    }
}

/// Host with a boot phase, an autoload request and a next-tick queue
pub struct SimHost {
    phase: Mutex<BootPhase>,
    requested: Mutex<Option<String>>,
    resumed: Mutex<Option<String>>,
    ticks: Mutex<VecDeque<Tick>>,
    events: Arc<EventLog>,
}

impl SimHost {
    pub fn new(phase: BootPhase, requested: Option<String>, events: Arc<EventLog>) -> Self {
        Self {
            phase: Mutex::new(phase),
            requested: Mutex::new(requested),
            resumed: Mutex::new(None),
            ticks: Mutex::new(VecDeque::new()),
            events,
        }
    }

    /// Run the work queued so far; work queued meanwhile waits for the next frame
    pub fn run_ticks(&self) -> usize {
        let ticks = std::mem::take(&mut *lock(&self.ticks));
        let count = ticks.len();
        for tick in ticks {
            tick();
        }
        count
    }

    pub fn pending_ticks(&self) -> usize {
        lock(&self.ticks).len()
    }

    /// What the host ends up loading: a resumed target, or its own autoload
    pub fn loaded(&self) -> Option<String> {
        if let Some(target) = lock(&self.resumed).clone() {
            return Some(target);
        }
        match *lock(&self.phase) {
            BootPhase::Autoload => lock(&self.requested).clone(),
            _ => None,
        }
    }
}

impl Host for SimHost {
    fn phase(&self) -> BootPhase {
        lock(&self.phase).clone()
    }

    fn requested_autoload(&self) -> Option<String> {
        lock(&self.requested).clone()
    }

    fn force_fallback(&self) -> Result<(), HostError> {
        let mut phase = lock(&self.phase);
        if let BootPhase::Unexpected(description) = &*phase {
            return Err(HostError::UnexpectedPhase(description.clone()));
        }
        let target = lock(&self.requested).take();
        *phase = BootPhase::MainMenu;
        drop(phase);

        debug!(?target, "SimHost::force_fallback: autoload request cleared");
        self.events.record(SimEvent::Fallback { target });
        Ok(())
    }

    fn resume_autoload(&self, target: &str) -> Result<(), HostError> {
        let mut phase = lock(&self.phase);
        if *phase != BootPhase::MainMenu {
            return Err(HostError::UnexpectedPhase(format!("{:?}", *phase)));
        }
        *phase = BootPhase::Autoload;
        drop(phase);

        *lock(&self.resumed) = Some(target.to_string());
        self.events.record(SimEvent::Resumed {
            target: target.to_string(),
        });
        Ok(())
    }

    fn schedule_next_tick(&self, task: Tick) {
        lock(&self.ticks).push_back(task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// Outcome of one simulated boot
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub operations: Vec<PortableOperation>,
    pub events: Vec<SimEvent>,
    /// Save the host loads once preloading settled
    pub loaded: Option<String>,
    /// Instance that presented the main menu
    pub menu_owner: Option<String>,
    pub elapsed_ms: u64,
}

impl SimReport {
    pub fn status(&self) -> AggregateStatus {
        AggregateStatus::compute(&self.operations)
    }

    pub fn failed(&self) -> usize {
        self.operations.iter().filter(|op| op.is_failed()).count()
    }

    pub fn dialogs(&self) -> impl Iterator<Item = &ErrorDialog> {
        self.events.iter().filter_map(|event| match event {
            SimEvent::Dialog(dialog) => Some(dialog),
            _ => None,
        })
    }
}

/// Boot the configured plugins and run frames until preloading settles
pub async fn run(config: &Config, echo: bool) -> Result<SimReport> {
    info!(plugins = config.plugins.len(), phase = %config.boot.phase, "sim::run: called");
    let started = Instant::now();

    let events = Arc::new(EventLog::new(echo));
    let host = Arc::new(SimHost::new(
        config.boot.boot_phase(),
        config.boot.requested_autoload.clone(),
        events.clone(),
    ));
    let store = SharedStore::new_shared();
    let main_context = MainContext::start("preloader-main").context("Failed to start the main context")?;

    let mut preloaders = Vec::with_capacity(config.plugins.len());
    for plugin in &config.plugins {
        let preloader = Preloader::builder(plugin.name.clone(), host.clone())
            .version(plugin.version)
            .config(config.preloader.clone())
            .store(store.clone())
            .notifications(events.clone())
            .dialogs(events.clone())
            .main_context(main_context.clone())
            .build();
        start_plugin(config, plugin, &preloader, &main_context, &events)?;
        preloaders.push(preloader);
    }

    let deadline = started + settle_budget(config);
    let mut presenter: Option<MenuPresenter> = None;
    let mut menu_state: Option<MenuState> = None;

    loop {
        host.run_ticks();

        if presenter.is_none()
            && let Some(first) = preloaders.first()
            && first.is_late_initialized()
        {
            presenter = attach_presenter(&preloaders)?;
        }
        if let Some(presenter) = &presenter {
            let current = presenter.current();
            if menu_state.as_ref() != Some(&current) {
                events.record(SimEvent::Menu {
                    owner: presenter.owner().to_string(),
                    state: describe(&current),
                });
                menu_state = Some(current);
            }
        }

        let settled = preloaders.iter().all(Preloader::is_late_initialized)
            && preloaders.first().is_none_or(|p| p.status().is_finished())
            && host.pending_ticks() == 0;
        if settled {
            break;
        }

        if Instant::now() > deadline {
            main_context.shutdown();
            return Err(eyre!("Preloading did not settle within {:?}", settle_budget(config)));
        }
        tokio::time::sleep(FRAME).await;
    }

    let operations = preloaders.first().map(Preloader::operations).unwrap_or_default();
    main_context.shutdown();

    let report = SimReport {
        operations,
        events: events.events(),
        loaded: host.loaded(),
        menu_owner: presenter.map(|p| p.owner().to_string()),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        operations = report.operations.len(),
        failed = report.failed(),
        loaded = ?report.loaded,
        elapsed_ms = report.elapsed_ms,
        "sim::run: settled"
    );
    Ok(report)
}

fn start_plugin(
    config: &Config,
    plugin: &PluginConfig,
    preloader: &Preloader,
    main_context: &MainContext,
    events: &Arc<EventLog>,
) -> Result<()> {
    debug!(plugin = %plugin.name, operations = plugin.operations.len(), "start_plugin: called");

    for op in &plugin.operations {
        let duration = Duration::from_millis(op.duration_ms + jitter(config.jitter_ms));
        let handler = failure_handler(plugin, op, events);

        match op.kind {
            OperationKind::Handle => {
                let mut operation = preloader.register_handle(&plugin.name, &op.name);
                if let Some(handler) = handler {
                    operation = operation.on_failure(handler);
                }
                let handle = operation.start()?;
                let (fail, name) = (op.fail, op.name.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if fail {
                        handle.fail(format!("{name}: simulated failure"));
                    } else {
                        handle.complete();
                    }
                });
            }
            OperationKind::Future => {
                let execution = match op.worker_pool.unwrap_or(config.preloader.worker_pool) {
                    true => Execution::WorkerPool,
                    false => Execution::Main(main_context.clone()),
                };
                let (fail, name) = (op.fail, op.name.clone());
                let mut operation = preloader.register_future_on(
                    &plugin.name,
                    &op.name,
                    move || async move {
                        tokio::time::sleep(duration).await;
                        if fail {
                            return Err(eyre!("{name}: simulated failure"));
                        }
                        Ok(())
                    },
                    execution,
                );
                if let Some(handler) = handler {
                    operation = operation.on_failure(handler);
                }
                // outcome arrives through the state observer
                drop(operation.start()?);
            }
            OperationKind::Sequence => {
                let mut operation = preloader.register_sequence(&plugin.name, &op.name, steps(op, duration));
                if let Some(handler) = handler {
                    operation = operation.on_failure(handler);
                }
                drop(operation.start()?);
            }
        }
    }
    Ok(())
}

/// Evenly sliced sleeps; a failing sequence errors halfway through
fn steps(op: &OperationConfig, duration: Duration) -> impl Iterator<Item = Result<Step>> + Send + 'static {
    let count = op.steps.max(1);
    let slice = duration / count;
    let fail_at = op.fail.then_some(count / 2);
    let name = op.name.clone();

    (0..count).map(move |i| {
        if fail_at == Some(i) {
            return Err(eyre!("{name}: simulated failure at step {}/{}", i + 1, count));
        }
        Ok(Step::Sleep(slice))
    })
}

fn failure_handler(
    plugin: &PluginConfig,
    op: &OperationConfig,
    events: &Arc<EventLog>,
) -> Option<impl Fn(&OperationError) + Send + Sync + 'static> {
    if !op.on_failure {
        return None;
    }
    let (owner, operation, events) = (plugin.name.clone(), op.name.clone(), events.clone());
    Some(move |error: &OperationError| {
        warn!(%owner, %operation, %error, "failure handled by plugin");
        events.record(SimEvent::FailureHandled {
            owner: owner.clone(),
            operation: operation.clone(),
            error: error.to_string(),
        });
    })
}

fn attach_presenter(preloaders: &[Preloader]) -> Result<Option<MenuPresenter>> {
    for preloader in preloaders {
        if let Some(presenter) = MenuPresenter::attach(preloader)? {
            debug!(owner = %presenter.owner(), "attach_presenter: menu presenter attached");
            return Ok(Some(presenter));
        }
    }
    warn!("attach_presenter: no instance is in charge of the menu");
    Ok(None)
}

fn describe(state: &MenuState) -> String {
    match state {
        MenuState::Idle => "idle".to_string(),
        MenuState::Busy { outstanding } => format!("busy, {outstanding} outstanding"),
        MenuState::Failed { title, .. } => format!("enabled with warning: {title}"),
    }
}

fn jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..=max_ms)
}

fn settle_budget(config: &Config) -> Duration {
    let work: u64 = config
        .plugins
        .iter()
        .flat_map(|plugin| plugin.operations.iter())
        .map(|op| op.duration_ms + config.jitter_ms)
        .sum();
    Duration::from_millis(work) + SETTLE_GRACE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, kind: OperationKind, duration_ms: u64) -> OperationConfig {
        OperationConfig {
            name: name.to_string(),
            kind,
            duration_ms,
            ..Default::default()
        }
    }

    fn config(operations: Vec<OperationConfig>) -> Config {
        let mut config = Config::default();
        config.preloader.removal_delay_ms = 10;
        config.plugins = vec![
            PluginConfig {
                name: "Alpha".to_string(),
                version: 1,
                operations,
            },
            PluginConfig {
                name: "Beta".to_string(),
                version: 3,
                operations: vec![op("Warm cache", OperationKind::Handle, 150)],
            },
        ];
        config
    }

    #[test]
    fn test_host_fallback_and_resume() {
        let events = Arc::new(EventLog::new(false));
        let host = SimHost::new(BootPhase::Autoload, Some("City".to_string()), events.clone());

        host.force_fallback().unwrap();
        assert_eq!(host.phase(), BootPhase::MainMenu);
        assert_eq!(host.requested_autoload(), None);
        assert_eq!(host.loaded(), None);

        host.resume_autoload("City").unwrap();
        assert_eq!(host.loaded().as_deref(), Some("City"));
        assert!(host.resume_autoload("City").is_err());
        assert_eq!(events.events().len(), 2);
    }

    #[test]
    fn test_host_refuses_fallback_in_unexpected_phase() {
        let host = SimHost::new(
            BootPhase::Unexpected("editor".to_string()),
            None,
            Arc::new(EventLog::default()),
        );
        assert_eq!(
            host.force_fallback(),
            Err(HostError::UnexpectedPhase("editor".to_string()))
        );
    }

    #[test]
    fn test_ticks_queued_during_a_frame_wait() {
        let host = Arc::new(SimHost::new(BootPhase::MainMenu, None, Arc::new(EventLog::default())));
        let again = host.clone();
        host.schedule_next_tick(Box::new(move || again.schedule_next_tick(Box::new(|| {}))));

        assert_eq!(host.run_ticks(), 1);
        assert_eq!(host.pending_ticks(), 1);
        assert_eq!(host.run_ticks(), 1);
        assert_eq!(host.pending_ticks(), 0);
    }

    #[test]
    fn test_failing_sequence_steps() {
        let mut failing = op("Bake", OperationKind::Sequence, 40);
        failing.fail = true;
        let results: Vec<_> = steps(&failing, Duration::from_millis(40)).collect();

        assert_eq!(results.len(), 4);
        assert!(results[..2].iter().all(|r| matches!(r, Ok(Step::Sleep(d)) if *d == Duration::from_millis(10))));
        assert!(results[2].is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_resumes_withheld_autoload() {
        let config = config(vec![
            op("Load presets", OperationKind::Future, 20),
            op("Decode atlas", OperationKind::Sequence, 20),
        ]);

        let report = run(&config, false).await.unwrap();

        assert_eq!(report.operations.len(), 3);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.loaded.as_deref(), Some("Campaign 3"));
        assert_eq!(report.menu_owner.as_deref(), Some("Beta"));
        let resumes = report
            .events
            .iter()
            .filter(|e| matches!(e, SimEvent::Resumed { .. }))
            .count();
        assert_eq!(resumes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_with_failure_keeps_autoload_cancelled() {
        let mut broken = op("Load presets", OperationKind::Future, 10);
        broken.fail = true;
        let config = config(vec![broken]);

        let report = run(&config, false).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.loaded, None);
        assert_eq!(report.dialogs().count(), 1);
        assert!(report.status().any_failed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_handled_failure_shows_no_dialog() {
        let mut broken = op("Fetch", OperationKind::Handle, 10);
        broken.fail = true;
        broken.on_failure = true;
        let config = config(vec![broken]);

        let report = run(&config, false).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.dialogs().count(), 0);
        assert!(
            report
                .events
                .iter()
                .any(|e| matches!(e, SimEvent::FailureHandled { operation, .. } if operation == "Fetch"))
        );
    }
}
