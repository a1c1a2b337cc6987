use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use oomprio_core::VERSION;
use oomprio_daemon::config::LogConfig;
use oomprio_daemon::{Config, GroupManager, HierarchyStats};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// OOMPrio - OOM priority hierarchy daemon
///
/// Builds the group hierarchy declared in the configuration file and keeps
/// effective priorities consistent as the file changes
#[derive(Parser, Debug)]
#[command(name = "oomprio-daemon")]
#[command(version = VERSION)]
#[command(about = "OOMPrio Daemon - OOM priority hierarchy", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/oomprio/config.toml")]
    config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the hierarchy once, log it and export stats
    Apply,

    /// Reload the configuration and reconcile on every interval
    Watch,

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        return generate_config(output);
    }

    // Logging needs the configured directory, so load first
    let (config, loaded) = load_config(&cli.config)?;
    init_logging(&config.logging)?;

    info!("OOMPrio Daemon v{} starting...", VERSION);
    if loaded {
        info!("Configuration loaded from: {:?}", cli.config);
    } else {
        warn!("Configuration file not found: {:?}, using defaults", cli.config);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    info!("Configuration validated successfully");

    match cli.command {
        Some(Commands::Apply) => run_apply_once(config)?,
        Some(Commands::Watch) => run_watch_loop(config, &cli.config).await?,
        Some(Commands::GenerateConfig { .. }) => {}
        None => {
            info!("No command specified, running watch loop by default");
            run_watch_loop(config, &cli.config).await?
        }
    }

    Ok(())
}

/// Build the hierarchy once and display it
fn run_apply_once(config: Config) -> Result<()> {
    let started = Utc::now();
    let manager = GroupManager::from_config(&config)?;

    info!("=== Hierarchy ===");
    for (path, group) in manager.snapshot_by_path() {
        info!(
            "{:<32} priority={:<6} effective={}",
            path.to_string(),
            group.priority,
            group.effective_priority
        );
    }
    info!(
        "cpuset constraint: {}",
        manager.hierarchy().read_constraint()
    );

    let violations = manager.hierarchy().check_invariant();
    if !violations.is_empty() {
        for violation in &violations {
            error!("Invariant violated: {}", violation);
        }
        return Err(anyhow::anyhow!(
            "{} groups violate the effective priority invariant",
            violations.len()
        ));
    }

    HierarchyStats::collect(&manager, started, 1)
        .save_to_file(&config.monitoring.stats_path)?;
    info!("Stats written to {:?}", config.monitoring.stats_path);
    Ok(())
}

/// Reconcile the hierarchy against the config file until interrupted
async fn run_watch_loop(config: Config, config_path: &Path) -> Result<()> {
    info!(
        "Starting reconcile loop, interval: {}s",
        config.monitoring.reconcile_interval_secs
    );

    let started = Utc::now();
    let mut manager = GroupManager::from_config(&config)?;
    let mut current = config;
    let mut reconciles: u64 = 1;

    loop {
        if let Err(e) = HierarchyStats::collect(&manager, started, reconciles)
            .save_to_file(&current.monitoring.stats_path)
        {
            error!("Failed to write stats: {}", e);
        }

        let interval = Duration::from_secs(current.monitoring.reconcile_interval_secs);
        tokio::select! {
            _ = sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping reconcile loop");
                return Ok(());
            }
        }

        match reload_config(config_path) {
            Ok(Some(mut next)) => {
                if next.hierarchy.max_groups != current.hierarchy.max_groups {
                    warn!(
                        "max_groups change requires a restart, keeping {}",
                        current.hierarchy.max_groups
                    );
                    next.hierarchy.max_groups = current.hierarchy.max_groups;
                }
                match next.validate() {
                    Ok(()) => current = next,
                    Err(e) => error!("Keeping previous configuration: {}", e),
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Keeping previous configuration: {}", e);
            }
        }

        match manager.apply(&current.groups, current.hierarchy.cpuset_constraint) {
            Ok(_) => reconciles += 1,
            Err(e) => error!("Reconcile failed: {}", e),
        }
    }
}

/// Re-read the config file; `None` when it is gone
fn reload_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let config = Config::load_from_file(path)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(Some(config))
}

/// Generate default configuration file
fn generate_config(output: &Path) -> Result<()> {
    Config::default()
        .save_to_file(output)
        .map_err(|e| anyhow::anyhow!("Failed to save configuration file: {}", e))?;

    println!("Configuration file generated: {:?}", output);
    Ok(())
}

/// Load configuration from file or use defaults; the flag says whether the
/// file existed
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if path.exists() {
        let config = Config::load_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load configuration file: {}", e))?;
        Ok((config, true))
    } else {
        Ok((Config::default(), false))
    }
}

/// Initialize logging with file and stdout output
fn init_logging(logging: &LogConfig) -> Result<()> {
    std::fs::create_dir_all(&logging.log_dir)?;

    // File appender for daemon logs
    let file_appender = tracing_appender::rolling::daily(&logging.log_dir, &logging.log_file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_ansi(true)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| logging.level.as_str().into()),
        )
        .init();

    // The writer thread must outlive main
    std::mem::forget(guard);

    info!("Logging initialized");

    Ok(())
}
