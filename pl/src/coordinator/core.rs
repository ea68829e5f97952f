//! Preloader - registration API and operation list bookkeeping

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use sharedstate::{
    Binding, FeatureSingleton, PortableOperation, ProcessAnchor, SharedStore, StateError, StoreGuard, StoreLocator,
    resolve,
};
use tracing::{debug, error, info};

use super::config::PreloaderConfig;
use super::shared::SharedCells;
use crate::error::OperationError;
use crate::host::{DialogSink, ErrorDialog, Host, NotificationSink, TracingSink};
use crate::main_context::MainContext;
use crate::operation::{
    Execution, FutureOperation, HandleOperation, Manual, OperationCore, OperationState, PreloadingOperation, Spawned,
    StateObserver, Step, callable, into_callable,
};
use crate::presentation::MENU_FEATURE;
use crate::status::AggregateStatus;

/// One preloader copy, as seen by the plugin that bundles it
///
/// Cloning is cheap and every clone is the same instance. Several instances,
/// possibly of different versions, coordinate through the shared store they
/// resolve at build time.
#[derive(Clone)]
pub struct Preloader {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) label: String,
    pub(crate) version: u16,
    pub(crate) config: PreloaderConfig,
    pub(crate) store: Arc<SharedStore>,
    pub(crate) cells: SharedCells,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) notifications: Arc<dyn NotificationSink>,
    pub(crate) dialogs: Arc<dyn DialogSink>,
    pub(crate) menu: FeatureSingleton<String>,
    local: Mutex<Vec<PortableOperation>>,
    main_context: Option<MainContext>,
    late_initialized: AtomicBool,
    instance: Weak<Inner>,
}

pub struct PreloaderBuilder {
    label: String,
    version: u16,
    config: PreloaderConfig,
    store: Option<Arc<SharedStore>>,
    host: Arc<dyn Host>,
    notifications: Arc<dyn NotificationSink>,
    dialogs: Arc<dyn DialogSink>,
    main_context: Option<MainContext>,
}

impl PreloaderBuilder {
    /// Version offered in every shared state election; the highest wins
    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn config(mut self, config: PreloaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this store instead of the process anchor
    pub fn store(mut self, store: Arc<SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Find the store through `locator`, degrading to a local one on failure
    pub fn locator(mut self, locator: &dyn StoreLocator) -> Self {
        self.store = Some(resolve(locator));
        self
    }

    pub fn notifications(mut self, notifications: Arc<dyn NotificationSink>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn dialogs(mut self, dialogs: Arc<dyn DialogSink>) -> Self {
        self.dialogs = dialogs;
        self
    }

    /// Context sequences are driven on; without one they run on the caller's runtime
    pub fn main_context(mut self, context: MainContext) -> Self {
        self.main_context = Some(context);
        self
    }

    /// Register the shared cells and schedule the late initialization
    pub fn build(self) -> Preloader {
        let store = self.store.unwrap_or_else(|| resolve(&ProcessAnchor));
        debug!(label = %self.label, version = self.version, scope = ?store.scope(), "PreloaderBuilder::build: called");

        let menu_owner = self.label.clone();
        let menu = FeatureSingleton::register(
            &store,
            &format!("{}.{}", self.config.namespace, MENU_FEATURE),
            self.version,
            &self.label,
            move || menu_owner.clone(),
        );

        let inner = Arc::new_cyclic(|instance| Inner {
            cells: SharedCells::register(&store, &self.config, self.version, instance.clone()),
            label: self.label,
            version: self.version,
            config: self.config,
            store,
            host: self.host,
            notifications: self.notifications,
            dialogs: self.dialogs,
            menu,
            local: Mutex::new(Vec::new()),
            main_context: self.main_context,
            late_initialized: AtomicBool::new(false),
            instance: instance.clone(),
        });

        let preloader = Preloader { inner };
        let scheduled = preloader.clone();
        preloader
            .inner
            .host
            .schedule_next_tick(Box::new(move || scheduled.late_initialize()));

        info!(
            instance = %preloader.inner.label,
            version = preloader.inner.version,
            "Preloader: registered, late initialization scheduled"
        );
        preloader
    }
}

impl Preloader {
    /// Start building an instance labelled `label` (usually the bundling plugin)
    pub fn builder(label: impl Into<String>, host: Arc<dyn Host>) -> PreloaderBuilder {
        PreloaderBuilder {
            label: label.into(),
            version: 1,
            config: PreloaderConfig::default(),
            store: None,
            host,
            notifications: Arc::new(TracingSink),
            dialogs: Arc::new(TracingSink),
            main_context: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn version(&self) -> u16 {
        self.inner.version
    }

    pub fn config(&self) -> &PreloaderConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<SharedStore> {
        &self.inner.store
    }

    /// Operation the plugin closes itself through an `OperationHandle`
    pub fn register_handle(&self, owner: &str, name: &str) -> HandleOperation {
        debug!(instance = %self.inner.label, %owner, %name, "Preloader::register_handle: called");
        PreloadingOperation::new(self.new_core(owner, name), Manual)
    }

    /// Async operation run on the configured default execution
    pub fn register_future<F, Fut>(&self, owner: &str, name: &str, f: F) -> FutureOperation
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let execution = if self.inner.config.worker_pool {
            Execution::WorkerPool
        } else {
            Execution::Current
        };
        self.register_future_on(owner, name, f, execution)
    }

    /// Async operation run on an explicit execution
    pub fn register_future_on<F, Fut>(&self, owner: &str, name: &str, f: F, execution: Execution) -> FutureOperation
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        debug!(instance = %self.inner.label, %owner, %name, ?execution, "Preloader::register_future_on: called");
        PreloadingOperation::new(self.new_core(owner, name), Spawned::new(callable(f), execution))
    }

    /// Step sequence driven on the main context, or the caller's runtime
    pub fn register_sequence<I>(&self, owner: &str, name: &str, sequence: I) -> FutureOperation
    where
        I: IntoIterator<Item = eyre::Result<Step>>,
        I::IntoIter: Send + 'static,
    {
        let execution = match &self.inner.main_context {
            Some(context) => Execution::Main(context.clone()),
            None => Execution::Current,
        };
        debug!(instance = %self.inner.label, %owner, %name, ?execution, "Preloader::register_sequence: called");
        PreloadingOperation::new(
            self.new_core(owner, name),
            Spawned::new(into_callable(Box::new(sequence.into_iter())), execution),
        )
    }

    /// Move locally buffered snapshots into the shared list
    ///
    /// Normally runs on the host's first tick after the build; later calls do
    /// nothing. The autoload gate is decided one tick later, once every
    /// instance built before the first tick has migrated too.
    pub fn late_initialize(&self) {
        self.inner.late_initialize();
    }

    pub fn is_late_initialized(&self) -> bool {
        self.inner.late_initialized.load(Ordering::SeqCst)
    }

    /// Snapshots from the authoritative list: shared once initialized, local before
    pub fn operations(&self) -> Vec<PortableOperation> {
        let mut guard = self.inner.store.lock();
        if self.inner.cells.operations.is_initialized(&guard) {
            match self.inner.cells.operations.get(&mut guard) {
                Ok(binding) => return binding.snapshot(),
                Err(e) => error!(error = %e, "Preloader::operations: shared list unreadable"),
            }
        }
        self.inner.local().clone()
    }

    pub fn status(&self) -> AggregateStatus {
        AggregateStatus::compute(&self.operations())
    }

    /// The shared operations binding presentation layers subscribe to
    ///
    /// Materializes the shared list if needed; call it after the first tick.
    pub fn operations_binding(&self) -> Result<Binding<Vec<PortableOperation>>, StateError> {
        let mut guard = self.inner.store.lock();
        self.inner.cells.operations.get(&mut guard)
    }

    /// The autoload target currently withheld by the boot gate
    pub fn withheld_autoload(&self) -> Option<String> {
        let guard = self.inner.store.lock();
        guard
            .get::<Option<String>>(self.inner.cells.requested_autoload.key())
            .ok()
            .flatten()
            .cloned()
            .flatten()
    }

    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }

    fn new_core(&self, owner: &str, name: &str) -> Arc<OperationCore> {
        let observer: Arc<dyn StateObserver> = self.inner.clone();
        OperationCore::new(owner, name, observer)
    }
}

impl std::fmt::Debug for Preloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preloader")
            .field("label", &self.inner.label)
            .field("version", &self.inner.version)
            .field("scope", &self.inner.store.scope())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Replace the operation's snapshot in the authoritative list
    fn signal_state_change(&self, snapshot: PortableOperation) {
        let mut guard = self.store.lock();

        if self.cells.operations.is_initialized(&guard) {
            match self.cells.operations.get(&mut guard) {
                Ok(binding) => binding.modify(|list| upsert(list, snapshot)),
                Err(e) => {
                    error!(instance = %self.label, error = %e, "Inner::signal_state_change: shared list unreadable");
                    return;
                }
            }
            // recomputes wait for the boot decision, see decide_boot
            if self.cells.requested_autoload.is_initialized(&guard) {
                self.emit_changed(&mut guard);
            }
        } else {
            upsert(&mut self.local(), snapshot);
        }
    }

    fn late_initialize(&self) {
        if self.late_initialized.swap(true, Ordering::SeqCst) {
            debug!(instance = %self.label, "Inner::late_initialize: already done");
            return;
        }

        let mut guard = self.store.lock();
        let binding = match self.cells.operations.get(&mut guard) {
            Ok(binding) => binding,
            Err(e) => {
                error!(instance = %self.label, error = %e, "Inner::late_initialize: cannot create shared list");
                return;
            }
        };

        let local = std::mem::take(&mut *self.local());
        let buffered = local.len();
        let mut migrated = 0usize;
        binding.modify(|list| {
            for snapshot in local {
                if list.iter().any(|existing| existing.id == snapshot.id) {
                    continue;
                }
                list.push(snapshot);
                migrated += 1;
            }
        });

        info!(
            instance = %self.label,
            buffered,
            migrated,
            "Inner::late_initialize: local operations moved to the shared list"
        );
        drop(guard);

        // every instance built before this tick migrates on it too
        match self.instance.upgrade() {
            Some(inner) => self.host.schedule_next_tick(Box::new(move || inner.decide_boot())),
            None => debug!(instance = %self.label, "Inner::late_initialize: instance dropped, no boot decision"),
        }
    }

    /// Freeze the autoload gate over the fully migrated list, then recompute
    ///
    /// The first instance to get here decides the gate; later calls find the
    /// cell materialized and only recompute.
    fn decide_boot(&self) {
        let mut guard = self.store.lock();
        match self.cells.requested_autoload.get(&mut guard) {
            Ok(target) => debug!(instance = %self.label, withheld = ?target, "Inner::decide_boot: gate decided"),
            Err(e) => {
                error!(instance = %self.label, error = %e, "Inner::decide_boot: autoload state unreadable");
                return;
            }
        }
        self.emit_changed(&mut guard);
    }

    fn emit_changed(&self, guard: &mut StoreGuard<'_>) {
        match self.cells.changed.get(guard) {
            Ok(signal) => signal.emit(guard),
            Err(e) => error!(instance = %self.label, error = %e, "Inner::emit_changed: change signal unreadable"),
        }
    }

    fn local(&self) -> MutexGuard<'_, Vec<PortableOperation>> {
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateObserver for Inner {
    fn state_changed(&self, operation: &OperationCore) {
        let state = operation.state();
        match state {
            OperationState::Done => info!(
                instance = %self.label,
                version = self.version,
                operation_id = %operation.id(),
                owner = %operation.owner(),
                operation = %operation.name(),
                duration_ms = operation.duration_ms() as u64,
                "Plugin \"{}\", {} task \"{}\" in {}ms",
                operation.owner(),
                state,
                operation.name(),
                operation.duration_ms()
            ),
            OperationState::Failed => {}
            _ => info!(
                instance = %self.label,
                version = self.version,
                operation_id = %operation.id(),
                owner = %operation.owner(),
                operation = %operation.name(),
                "Plugin \"{}\", {} task \"{}\"",
                operation.owner(),
                state,
                operation.name()
            ),
        }

        self.signal_state_change(operation.snapshot());
    }

    fn operation_failed(&self, operation: &OperationCore, failure: &OperationError, handled: bool) {
        error!(
            instance = %self.label,
            version = self.version,
            operation_id = %operation.id(),
            owner = %operation.owner(),
            operation = %operation.name(),
            duration_ms = operation.duration_ms() as u64,
            error = %failure,
            surfaced_in_ui = !handled,
            "Error while preloading plugin \"{}\", task \"{}\". The plugin might be in an inconsistent state.",
            operation.owner(),
            operation.name()
        );

        if !handled {
            self.dialogs.show_error(ErrorDialog {
                title: format!("Error while preloading “{}”", operation.owner()),
                message: format!(
                    "Task “{}” failed. The plugin might be in an inconsistent state.",
                    operation.name()
                ),
                details: Some(failure.to_string()),
            });
        }
    }
}

/// Remove any snapshot with the same id, then append the fresh one
fn upsert(list: &mut Vec<PortableOperation>, snapshot: PortableOperation) {
    list.retain(|existing| existing.id != snapshot.id);
    list.push(snapshot);
}
