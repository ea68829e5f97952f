//! Simulator configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::PreloaderConfig;
use crate::host::BootPhase;

const CONFIG_FILE: &str = "preloader.yml";

/// Main simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Settings shared by every simulated preloader copy
    pub preloader: PreloaderConfig,

    /// Host boot state when plugins load
    pub boot: BootConfig,

    /// Random extra duration added to every simulated operation
    #[serde(rename = "jitter-ms")]
    pub jitter_ms: u64,

    /// Simulated plugins, each bundling its own preloader copy
    pub plugins: Vec<PluginConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            preloader: PreloaderConfig::default(),
            boot: BootConfig::default(),
            jitter_ms: 0,
            plugins: vec![
                PluginConfig {
                    name: "Traffic Tweaks".to_string(),
                    version: 1,
                    operations: vec![OperationConfig {
                        name: "Load lane presets".to_string(),
                        kind: OperationKind::Future,
                        duration_ms: 300,
                        ..Default::default()
                    }],
                },
                PluginConfig {
                    name: "Better Textures".to_string(),
                    version: 2,
                    operations: vec![
                        OperationConfig {
                            name: "Decode texture atlas".to_string(),
                            kind: OperationKind::Sequence,
                            duration_ms: 500,
                            steps: 5,
                            ..Default::default()
                        },
                        OperationConfig {
                            name: "Index asset packs".to_string(),
                            kind: OperationKind::Handle,
                            duration_ms: 200,
                            ..Default::default()
                        },
                    ],
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::implicit_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are ignored here; `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        #[derive(Deserialize)]
        struct LogLevelOnly {
            #[serde(rename = "log-level")]
            log_level: Option<String>,
        }

        let read = |path: &Path| -> Option<String> {
            let content = fs::read_to_string(path).ok()?;
            serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
        };

        match config_path {
            Some(path) => read(path),
            None => Self::implicit_paths()
                .into_iter()
                .filter(|candidate| candidate.exists())
                .find_map(|candidate| read(&candidate)),
        }
    }

    /// `./preloader.yml`, then `~/.config/preloader/preloader.yml`
    fn implicit_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("preloader").join(CONFIG_FILE));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Host boot state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Save the host was asked to load on boot
    #[serde(rename = "requested-autoload", skip_serializing_if = "Option::is_none")]
    pub requested_autoload: Option<String>,

    /// main-menu, autoload, or anything else for an unexpected phase
    pub phase: String,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            requested_autoload: Some("Campaign 3".to_string()),
            phase: "autoload".to_string(),
        }
    }
}

impl BootConfig {
    pub fn boot_phase(&self) -> BootPhase {
        match self.phase.to_lowercase().as_str() {
            "main-menu" | "mainmenu" => BootPhase::MainMenu,
            "autoload" => BootPhase::Autoload,
            other => BootPhase::Unexpected(other.to_string()),
        }
    }
}

/// A simulated plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub name: String,

    /// Version of the preloader copy the plugin bundles
    pub version: u16,

    pub operations: Vec<OperationConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Closed through a handle
    Handle,
    /// Async callable
    #[default]
    Future,
    /// Step sequence on the main context
    Sequence,
}

/// A simulated operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    pub name: String,

    pub kind: OperationKind,

    /// How long the work takes
    #[serde(rename = "duration-ms")]
    pub duration_ms: u64,

    /// Fail instead of completing
    pub fail: bool,

    /// Future operations only: run on the worker pool instead of the main context
    #[serde(rename = "worker-pool", skip_serializing_if = "Option::is_none")]
    pub worker_pool: Option<bool>,

    /// Sequence operations only: number of steps
    pub steps: u32,

    /// Attach a failure callback, which suppresses the error dialog
    #[serde(rename = "on-failure")]
    pub on_failure: bool,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: OperationKind::Future,
            duration_ms: 100,
            fail: false,
            worker_pool: None,
            steps: 4,
            on_failure: false,
        }
    }
}
