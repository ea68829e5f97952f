//! Preloader simulator
//!
//! CLI entry point: boots the configured plugins against a simulated host.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use preloader::cli::{Cli, Command, OutputFormat, get_log_path};
use preloader::config::Config;
use preloader::sim::{self, SimReport};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, stderr: bool) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        let log_path = get_log_path();
        let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), cli.stderr)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run {
            format,
            autoload,
            phase,
            quiet,
        }) => {
            debug!("main: matched Run command");
            cmd_run(config, format, autoload, phase, quiet).await
        }
        Some(Command::ShowConfig) => {
            debug!("main: matched ShowConfig command");
            cmd_show_config(&config)
        }
        None => {
            debug!("main: no command, running with defaults");
            cmd_run(config, OutputFormat::Text, None, None, false).await
        }
    }
}

async fn cmd_run(
    mut config: Config,
    format: OutputFormat,
    autoload: Option<String>,
    phase: Option<String>,
    quiet: bool,
) -> Result<()> {
    if let Some(autoload) = autoload {
        config.boot.requested_autoload = Some(autoload);
    }
    if let Some(phase) = phase {
        config.boot.phase = phase;
    }

    let echo = !quiet && matches!(format, OutputFormat::Text);
    let report = sim::run(&config, echo).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_summary(&report),
    }

    match report.failed() {
        0 => Ok(()),
        failed => Err(eyre!("{} operation(s) failed to preload", failed)),
    }
}

fn print_summary(report: &SimReport) {
    println!("Preloading summary");
    println!("------------------");
    for op in &report.operations {
        let state = match op.state.as_str() {
            sharedstate::STATE_DONE => op.state.green(),
            sharedstate::STATE_FAILED => op.state.red(),
            _ => op.state.yellow(),
        };
        println!("  {:<8} {} / {}", state, op.owner, op.operation_name);
    }
    println!();

    let status = report.status();
    println!("Operations: {} ({} failed)", status.total, status.failed);
    if let Some(owner) = &report.menu_owner {
        println!("Menu presented by: {}", owner);
    }
    match &report.loaded {
        Some(target) => println!("Loaded: {}", target),
        None => println!("Loaded: nothing, stayed in the main menu"),
    }
    println!("Elapsed: {}ms", report.elapsed_ms);
}

fn cmd_show_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
