//! Presentation state for the host's main menu
//!
//! While plugins preload, the menu controls that would start a game are
//! disabled and show a spinner; when something failed they come back with a
//! warning. Only one instance drives the menu: the one whose implementation
//! won the menu feature election.

use sharedstate::{PortableOperation, StateError};
use tokio::sync::watch;
use tracing::debug;

use crate::coordinator::Preloader;

/// Feature name of the main-menu extension, under the preloader namespace
pub const MENU_FEATURE: &str = "main-menu";

/// Menu controls that must wait for preloading
pub const GUARDED_CONTROLS: [&str; 3] = ["menu.continue-game", "menu.load-game", "menu.new-game"];

pub const FAILED_TITLE: &str = "Some plugins failed to preload";

pub const FAILED_DESCRIPTION: &str =
    "Check for errors in notifications and logs. Continue only if you know what you’re doing.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuState {
    /// Nothing running, nothing failed: controls are left alone
    Idle,
    /// Controls disabled with a spinner until `outstanding` operations finish
    Busy { outstanding: usize },
    /// Controls enabled with a warning tooltip
    Failed { title: String, description: String },
}

impl MenuState {
    pub fn from_operations(operations: &[PortableOperation]) -> Self {
        let outstanding = operations.iter().filter(|op| !op.is_terminal()).count();
        if outstanding > 0 {
            return Self::Busy { outstanding };
        }

        if operations.iter().any(PortableOperation::is_failed) {
            return Self::Failed {
                title: FAILED_TITLE.to_string(),
                description: FAILED_DESCRIPTION.to_string(),
            };
        }
        Self::Idle
    }

    pub fn controls_enabled(&self) -> bool {
        !matches!(self, Self::Busy { .. })
    }
}

/// Follows the shared operations binding and maps it to a [`MenuState`]
pub struct MenuPresenter {
    owner: String,
    operations: watch::Receiver<Vec<PortableOperation>>,
}

impl MenuPresenter {
    /// Attach if `preloader` is the instance in charge of the menu
    ///
    /// Returns `None` for every other instance.
    pub fn attach(preloader: &Preloader) -> Result<Option<Self>, StateError> {
        let inner = preloader.inner();
        let (owner, in_charge) = inner.menu.resolve(&inner.store)?;
        debug!(instance = %inner.label, %owner, in_charge, "MenuPresenter::attach: resolved menu feature");
        if !in_charge {
            return Ok(None);
        }

        let binding = preloader.operations_binding()?;
        Ok(Some(Self {
            owner,
            operations: binding.subscribe(),
        }))
    }

    /// Label of the instance presenting the menu
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn current(&self) -> MenuState {
        MenuState::from_operations(&self.operations.borrow())
    }

    /// Wait for the next change of the operations list
    ///
    /// Returns `None` once the binding is gone.
    pub async fn changed(&mut self) -> Option<MenuState> {
        self.operations.changed().await.ok()?;
        Some(MenuState::from_operations(&self.operations.borrow_and_update()))
    }
}
