//! Link Check Server
//!
//! HTTP front end for link-check-lib. Accepts batches of links, checks them
//! through the library's bounded worker pool and records each batch under a
//! numbered ID. SIGINT and SIGTERM start a graceful drain that ends with the
//! state being written to disk.

mod api;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use link_check_lib::{
    load_env_config, parse_duration_string, ConfigManager, EnvConfig, FileConfig, LinkChecker,
    PoolConfig,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

const DEFAULT_BIND: &str = "localhost:8080";

/// CLI arguments for link-check
#[derive(Parser, Debug, Default)]
#[command(name = "link-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP service that checks batches of links for reachability")]
#[command(
    long_about = "HTTP service that checks batches of links for reachability.\n\nLinks are probed by a fixed pool of workers; every batch is stored under a numbered ID and persisted to a JSON file."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Address to listen on [default: localhost:8080]
    #[arg(long = "bind", value_name = "ADDR", help_heading = "Server")]
    pub bind: Option<String>,

    /// Number of probe workers (1-100) [default: 10]
    #[arg(
        short = 'w',
        long = "workers",
        value_name = "N",
        help_heading = "Worker Pool"
    )]
    pub workers: Option<usize>,

    /// Pending task capacity of the shared queue [default: 100]
    #[arg(long = "queue-capacity", value_name = "N", help_heading = "Worker Pool")]
    pub queue_capacity: Option<usize>,

    /// Per-link probe timeout, e.g. "2s", "500ms" [default: 2s]
    #[arg(long = "probe-timeout", value_name = "DURATION", help_heading = "Worker Pool")]
    pub probe_timeout: Option<String>,

    /// How long new batches are still accepted after a shutdown signal [default: 3s]
    #[arg(long = "grace-period", value_name = "DURATION", help_heading = "Worker Pool")]
    pub grace_period: Option<String>,

    /// JSON state file [default: storage.json]
    #[arg(long = "state", value_name = "FILE", help_heading = "Storage")]
    pub state: Option<PathBuf>,

    /// Use a specific config file instead of discovery
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help_heading = "Configuration"
    )]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub pool: PoolConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            pool: PoolConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!(error = %e, "link-check failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_config(&args)?;
    debug!(?settings, "configuration resolved");

    let listener = TcpListener::bind(&settings.bind)
        .await
        .map_err(|e| format!("Failed to bind '{}': {}", settings.bind, e))?;
    info!(addr = %listener.local_addr()?, "listening");

    let checker = LinkChecker::start_http(settings.pool)?;

    let mut server = {
        let checker = checker.clone();
        let app = api::router(checker.clone());
        tokio::spawn(async move {
            // Keep serving through the grace period; stop once drained.
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { checker.wait_stopped().await })
                .await
        })
    };

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            return stop_after_server_exit(&checker, result).await;
        }
    }

    checker.shutdown().await;
    server.await??;

    info!("server shutdown complete");
    Ok(())
}

/// The server stopped on its own: still drain and save, then report why.
async fn stop_after_server_exit(
    checker: &LinkChecker,
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome: Result<(), Box<dyn std::error::Error>> = match result {
        Ok(Ok(())) => {
            warn!("server exited before a shutdown signal");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "server failed");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "server task failed");
            Err(e.into())
        }
    };

    checker.shutdown().await;
    outcome
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, shutting down");
        }
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        }
    }
}

/// Build configuration from all sources with proper precedence.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (LC_*)
/// 3. Explicit config file (--config or LC_CONFIG)
/// 4. Local config file (./link-check.toml, ./.link-check.toml)
/// 5. Global config file (~/.link-check.toml)
/// 6. XDG config file (~/.config/link-check/config.toml)
/// 7. Built-in defaults
fn build_config(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    build_config_with_env(args, load_env_config())
}

fn build_config_with_env(
    args: &Args,
    env_config: EnvConfig,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new();

    // Step 1: Determine config file path and load config files
    let file_config = if let Some(explicit_config_path) = &args.config {
        debug!(path = %explicit_config_path.display(), "using explicit config file (--config)");
        load_explicit_config(&config_manager, explicit_config_path)?
    } else if let Some(env_config_path) = &env_config.config {
        debug!(path = %env_config_path.display(), "using explicit config file (LC_CONFIG)");
        load_explicit_config(&config_manager, env_config_path)?
    } else {
        debug!("discovering config files");
        config_manager.discover_and_load()
    };

    let mut settings = merge_file_config(Settings::default(), &file_config);

    // Step 2: Apply environment variables (LC_*)
    settings = apply_environment_config(settings, &env_config);

    // Step 3: Apply CLI arguments (highest precedence)
    apply_cli_args(settings, args)
}

fn load_explicit_config(
    config_manager: &ConfigManager,
    path: &std::path::Path,
) -> Result<FileConfig, Box<dyn std::error::Error>> {
    config_manager
        .load_file(path)
        .map_err(|e| format!("Failed to load config file '{}': {}", path.display(), e).into())
}

fn merge_file_config(mut settings: Settings, file_config: &FileConfig) -> Settings {
    if let Some(bind) = file_config.bind() {
        settings.bind = bind.to_string();
    }
    settings.pool = file_config.apply_to(settings.pool);
    settings
}

fn apply_environment_config(mut settings: Settings, env_config: &EnvConfig) -> Settings {
    if let Some(bind) = &env_config.bind {
        settings.bind = bind.clone();
    }
    settings.pool = env_config.apply_to(settings.pool);
    settings
}

/// Apply CLI arguments to config (highest precedence).
///
/// Unlike file and environment values, bad CLI values are hard errors.
fn apply_cli_args(
    mut settings: Settings,
    args: &Args,
) -> Result<Settings, Box<dyn std::error::Error>> {
    if let Some(bind) = &args.bind {
        settings.bind = bind.clone();
    }

    if let Some(workers) = args.workers {
        if workers == 0 || workers > 100 {
            return Err("Workers must be between 1 and 100".into());
        }
        settings.pool = settings.pool.with_workers(workers);
    }

    if let Some(capacity) = args.queue_capacity {
        if capacity == 0 {
            return Err("Queue capacity must be at least 1".into());
        }
        settings.pool = settings.pool.with_queue_capacity(capacity);
    }

    if let Some(timeout) = &args.probe_timeout {
        let timeout = parse_cli_duration("--probe-timeout", timeout)?;
        if timeout.is_zero() {
            return Err("--probe-timeout must be greater than zero".into());
        }
        settings.pool = settings.pool.with_probe_timeout(timeout);
    }

    if let Some(grace) = &args.grace_period {
        let grace = parse_cli_duration("--grace-period", grace)?;
        settings.pool = settings.pool.with_grace_period(grace);
    }

    if let Some(state) = &args.state {
        settings.pool = settings.pool.with_state_path(state.clone());
    }

    Ok(settings)
}

fn parse_cli_duration(flag: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    parse_duration_string(value).ok_or_else(|| {
        format!(
            "Invalid {} '{}'. Use format like '500ms', '2s', '1m'",
            flag, value
        )
        .into()
    })
}
