//! Module orchestration -- assembly, lifecycle management and shutdown.
//!
//! The [`Orchestrator`] is the central coordinator of `authwatch-daemon`.
//! It validates configuration, builds the watcher and RPC server around a
//! shared [`WatcherHandle`](authwatch_watcher::WatcherHandle), manages
//! startup/shutdown ordering and runs the main loop.
//!
//! # Startup Order
//!
//! 1. Auth watcher (tails the log, publishes events)
//! 2. RPC server (serves queries and subscriptions)
//!
//! # Shutdown Order (reverse)
//!
//! 1. RPC server (stop accepting subscriptions)
//! 2. Auth watcher (stop tailing, flush the host info cache)
//!
//! A fatal failure in any module's background task cancels the shared
//! fatal token; the main loop then runs the same shutdown and returns
//! an error so the process exits non-zero.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use authwatch_core::config::AuthWatchConfig;

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ModuleRegistry};

/// Interval between periodic health log entries.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Why the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS signal or the caller requested shutdown.
    Requested(&'static str),
    /// A module's background task failed.
    Fatal,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: AuthWatchConfig,
    /// Registry of all modules (ordered for start/stop).
    modules: ModuleRegistry,
    /// Cancelled by a module whose background task fails.
    fatal: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - Any module fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = AuthWatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: AuthWatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let fatal = CancellationToken::new();
        let mut registry = ModuleRegistry::new();

        let (watcher, handle) = modules::watcher::init(&config, fatal.clone()).await?;
        registry.register(watcher);
        registry.register(modules::rpc::init(&config, handle, fatal.clone())?);

        tracing::info!(total_modules = registry.count(), "orchestrator initialized");

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            modules: registry,
            fatal,
            start_time: Instant::now(),
        })
    }

    /// Start all modules and run until SIGINT or SIGTERM.
    pub async fn run(&mut self) -> Result<()> {
        let signal = wait_for_shutdown_signal()?;
        self.run_until(signal).await
    }

    /// Start all modules and run until `shutdown` resolves or a module fails.
    ///
    /// Modules are always stopped before returning. A module failure is
    /// reported as an error after the orderly shutdown.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = &'static str>,
    {
        tracing::info!("starting all modules");
        if let Err(e) = self.modules.start_all().await {
            tracing::warn!("startup failed, rolling back already-started modules");
            if let Err(stop_err) = self.modules.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            return Err(e);
        }

        let uptime_cancel = CancellationToken::new();
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, uptime_cancel.clone()));

        tracing::info!("entering main loop");
        let reason = self.main_loop(shutdown).await;
        match reason {
            ShutdownReason::Requested(signal) => {
                tracing::info!(signal, "shutdown requested");
            }
            ShutdownReason::Fatal => {
                tracing::error!("module failure detected, shutting down");
            }
        }

        uptime_cancel.cancel();
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.shutdown().await?;

        match reason {
            ShutdownReason::Requested(_) => Ok(()),
            ShutdownReason::Fatal => Err(anyhow::anyhow!(
                "daemon stopped after a module failure"
            )),
        }
    }

    async fn main_loop<F>(&self, shutdown: F) -> ShutdownReason
    where
        F: Future<Output = &'static str>,
    {
        tokio::pin!(shutdown);
        let mut health_interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
        health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        health_interval.tick().await;

        loop {
            tokio::select! {
                signal = &mut shutdown => return ShutdownReason::Requested(signal),
                () = self.fatal.cancelled() => return ShutdownReason::Fatal,
                _ = health_interval.tick() => log_health(&self.health().await),
            }
        }
    }

    /// Stop all modules in reverse registration order.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all modules");
        self.modules.stop_all().await
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .modules
            .health_statuses()
            .await
            .into_iter()
            .map(|(name, status)| ModuleHealth { name, status })
            .collect();

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs: self.start_time.elapsed().as_secs(),
            modules,
        }
    }

    /// Token cancelled when a module's background task fails.
    pub fn fatal_token(&self) -> CancellationToken {
        self.fatal.clone()
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &AuthWatchConfig {
        &self.config
    }
}

fn log_health(health: &DaemonHealth) {
    if health.status.is_healthy() {
        tracing::info!(
            status = %health.status,
            uptime_secs = health.uptime_secs,
            modules = health.modules.len(),
            "daemon health"
        );
    } else {
        tracing::warn!(
            status = %health.status,
            uptime_secs = health.uptime_secs,
            "daemon health degraded"
        );
    }
}

/// Install SIGTERM and SIGINT handlers and return a future that resolves
/// with the name of the first signal received.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn wait_for_shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use authwatch_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use authwatch_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                () = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
