//! netsweep - module job runner and site-scoped scheduler.
//!
//! Main entry point for the netsweep CLI and scheduler service.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use netsweep_config::{Config, ConfigLoader, LoggingConfig, resolve_path};
use netsweep_core::Engine;

mod cli;
mod cmd_job;
mod cmd_schedule;

use cli::{Cli, Commands};
use cmd_job::{handle_job_command, handle_modules_command};
use cmd_schedule::handle_schedule_command;

const DEFAULT_CONFIG: &str = "config/netsweep.toml";

/// Pick the config file: the explicit path, else `config/netsweep.toml`
/// under the working directory, else the user config directory.
fn locate_config(explicit: Option<PathBuf>, work_dir: &Path) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let local = work_dir.join(DEFAULT_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("netsweep").join("netsweep.toml"))
        .filter(|p| p.exists())
}

/// Initialize tracing with console and, when configured, daily-rotated
/// file output.
fn init_tracing(logging: &LoggingConfig, base_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file_writer = match &logging.dir {
        Some(dir) => {
            let log_dir = resolve_path(base_dir, dir);
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("netsweep")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // The guard flushes on drop; keep it for the process lifetime.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);
            Some(non_blocking)
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(env_filter);

    // Console output goes to stderr so command output on stdout stays clean.
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w).with_ansi(false)))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_ansi(true).with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().with_writer(w).with_ansi(false)))
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let work_dir = match cli.work_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config_path = locate_config(cli.config, &work_dir);
    let config: Config = ConfigLoader::load_or_default(config_path.as_deref())?;

    let data_dir = config.paths.resolve(&work_dir).data_dir;
    init_tracing(&config.logging, &data_dir)?;
    match &config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file found, using defaults"),
    }

    let engine = Engine::builder(config, work_dir).build()?;

    match cli.command {
        Commands::Serve => serve(&engine).await,
        Commands::Modules { action } => handle_modules_command(&engine, action).await,
        Commands::Job { action } => handle_job_command(&engine, action).await,
        Commands::Schedule { action } => handle_schedule_command(&engine, action).await,
    }
}

/// Run the scheduler loop and reaper until Ctrl-C or SIGTERM.
async fn serve(engine: &Engine) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting netsweep v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", engine.paths().data_dir.display());

    match engine.list_schedules().await {
        Ok(schedules) => info!("{} schedules loaded", schedules.len()),
        Err(e) => warn!("Schedule store unavailable at startup: {}", e),
    }

    engine.start()?;
    wait_for_shutdown_signal().await?;
    info!("Shutdown signal received");
    engine.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
