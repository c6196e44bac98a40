//! Daemon orchestration -- assembly, signal handling and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the [`Watcher`], restores
//! pinned keys and runs the main signal loop.
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: stop the watcher, save pins, exit
//! - `SIGHUP`: reload the config file and apply it to the running watcher
//! - `SIGUSR1`: toggle pause / resume
//!
//! # Background tasks
//!
//! - Notification drain: logs mailbox entries as they are produced and
//!   drains the display message queue
//! - Uptime updater (when metrics are enabled)

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use logwatch_core::config::LogwatchConfig;
use logwatch_core::metrics as m;
use logwatch_engine::{EngineConfig, MailEntry, MailKind, RunState, Watcher, WatcherBuilder};

use crate::metrics_server;
use crate::pins::PinStore;

/// Command-line overrides layered on top of the file and environment.
///
/// Kept by the orchestrator so a reload applies them again.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Log level override.
    pub log_level: Option<String>,
    /// Log format override.
    pub log_format: Option<String>,
    /// Force replay-from-start.
    pub replay: bool,
}

impl ConfigOverrides {
    /// Apply the overrides in place.
    pub fn apply(&self, config: &mut LogwatchConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if self.replay {
            config.watcher.replay_from_start = true;
        }
    }
}

/// Load a config file, then apply environment and command-line overrides and validate.
///
/// Load order: file, `LOGWATCH_*` environment variables, command line.
pub async fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<LogwatchConfig> {
    let mut config = LogwatchConfig::from_file(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    overrides.apply(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    Ok(config)
}

/// Signals the main loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// SIGTERM or SIGINT.
    Shutdown(&'static str),
    /// SIGHUP.
    Reload,
    /// SIGUSR1.
    TogglePause,
}

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogwatchConfig,
    /// Config file path (needed for reloads).
    config_path: Option<PathBuf>,
    /// Command-line overrides re-applied on reload.
    overrides: ConfigOverrides,
    /// The watch engine.
    watcher: Watcher,
    /// Pin persistence (None when `persist_pins` is off).
    pins: Option<PinStore>,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, validation
    /// fails, or the watcher cannot be built.
    pub async fn build(config_path: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let config = load_config(config_path, &overrides).await?;
        let mut orchestrator = Self::build_from_config(config).await?;
        orchestrator.config_path = Some(config_path.to_path_buf());
        orchestrator.overrides = overrides;
        Ok(orchestrator)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Without a config path, `SIGHUP` reloads are ignored.
    pub async fn build_from_config(config: LogwatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_daemon_metrics();
        }

        let watcher = WatcherBuilder::new()
            .config(EngineConfig::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build watcher: {}", e))?;

        let mut pins = pin_store_for(&config);
        if let Some(store) = pins.as_mut() {
            let loaded = store.load().await;
            watcher.aggregator().replace_pins(loaded);
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        tracing::info!(
            roots = config.watcher.roots.len(),
            replay = config.watcher.replay_from_start,
            paused = config.watcher.pause,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            config_path: None,
            overrides: ConfigOverrides::default(),
            watcher,
            pins,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the watcher and enter the signal loop.
    ///
    /// Returns after a shutdown signal, once the watcher has stopped and
    /// pins have been saved.
    pub async fn run(&mut self) -> Result<()> {
        let mut signals = SignalSet::install()?;

        self.watcher
            .start()
            .map_err(|e| anyhow::anyhow!("failed to start watcher: {}", e))?;

        let drain_task = spawn_notification_drain(self.watcher.clone(), self.shutdown_tx.subscribe());
        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("entering main signal loop");
        loop {
            match signals.recv().await {
                DaemonSignal::Shutdown(name) => {
                    tracing::info!(signal = name, "shutdown signal received");
                    break;
                }
                DaemonSignal::Reload => self.reload().await,
                DaemonSignal::TogglePause => self.toggle_pause(),
            }
        }

        let _ = self.shutdown_tx.send(());
        let _ = drain_task.await;
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        self.shutdown().await
    }

    /// Stop the watcher and persist pins.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.watcher.is_running() {
            self.watcher
                .stop()
                .await
                .map_err(|e| anyhow::anyhow!("failed to stop watcher: {}", e))?;
        }
        self.save_pins().await;
        tracing::info!(uptime_secs = self.start_time.elapsed().as_secs(), "logwatch-daemon shut down");
        Ok(())
    }

    /// Re-read the config file and apply it to the running watcher.
    ///
    /// A config that fails to load or validate is logged and the current
    /// one stays in effect.
    pub async fn reload(&mut self) {
        let Some(path) = self.config_path.clone() else {
            tracing::warn!("reload requested but daemon was not started from a config file");
            return;
        };
        let next = match load_config(&path, &self.overrides).await {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "reload failed, keeping current config");
                return;
            }
        };
        self.apply(next).await;
    }

    /// Apply a new configuration.
    ///
    /// A config the watcher rejects changes nothing, including where pins are stored.
    pub async fn apply(&mut self, next: LogwatchConfig) {
        let kind = match self.watcher.apply_config(EngineConfig::from_core(&next)) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(error = %e, "config not applied");
                return;
            }
        };

        if next.general.pins_file != self.config.general.pins_file
            || next.general.persist_pins != self.config.general.persist_pins
        {
            self.save_pins().await;
            self.pins = pin_store_for(&next);
        }

        tracing::info!(restart = kind.as_str(), "config reloaded");
        self.config = next;
    }

    /// Toggle between running and paused.
    pub fn toggle_pause(&self) {
        match self.watcher.run_state() {
            RunState::Running => {
                self.watcher.pause();
                tracing::info!(state = self.watcher.state_name(), "watcher paused");
            }
            RunState::PendingPause | RunState::Stopped => {
                self.watcher.resume();
                tracing::info!("watcher resumed");
            }
        }
    }

    /// Persist pins, logging failures.
    pub async fn save_pins(&mut self) {
        let Some(store) = self.pins.as_mut() else {
            return;
        };
        let pins = self.watcher.aggregator().snapshot_pins();
        if let Err(e) = store.save(&pins).await {
            tracing::error!(path = %store.path().display(), error = %e, "failed to save pins");
        }
    }

    /// The watch engine.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// The active configuration.
    pub fn config(&self) -> &LogwatchConfig {
        &self.config
    }
}

fn pin_store_for(config: &LogwatchConfig) -> Option<PinStore> {
    config
        .general
        .persist_pins
        .then(|| PinStore::new(&config.general.pins_file))
}

/// Unix signal handlers, installed once for the lifetime of the loop.
struct SignalSet {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
    sigusr1: tokio::signal::unix::Signal,
}

impl SignalSet {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| anyhow::anyhow!("failed to install {} handler: {}", name, e))
        };
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
            sigusr1: install(SignalKind::user_defined1(), "SIGUSR1")?,
        })
    }

    async fn recv(&mut self) -> DaemonSignal {
        tokio::select! {
            _ = self.sigterm.recv() => DaemonSignal::Shutdown("SIGTERM"),
            _ = self.sigint.recv() => DaemonSignal::Shutdown("SIGINT"),
            _ = self.sighup.recv() => DaemonSignal::Reload,
            _ = self.sigusr1.recv() => DaemonSignal::TogglePause,
        }
    }
}

/// Log one mailbox entry. Periodic summaries go out at `info`, pinned alerts at `warn`.
pub fn log_mail_entry(entry: &MailEntry) {
    match entry.kind {
        MailKind::Periodic => tracing::info!(
            id = %entry.id,
            title = %entry.title,
            summary = %entry.summary,
            sources = entry.sources.len(),
            "periodic summary"
        ),
        MailKind::Pinned => tracing::warn!(
            id = %entry.id,
            key = %entry.title,
            summary = %entry.summary,
            "pinned alert"
        ),
    }
}

/// Spawn the task that logs notifications as they are produced.
fn spawn_notification_drain(
    watcher: Watcher,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut mail_rx = watcher.subscribe_mail();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = mail_rx.recv() => {
                    match received {
                        Ok(entry) => {
                            log_mail_entry(&entry);
                            for message in watcher.drain_messages() {
                                tracing::debug!(key = %message.key, message = %message, "display message");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification drain lagged, entries remain in the mailbox");
                        }
                        Err(RecvError::Closed) => {
                            tracing::debug!("mail channel closed, exiting drain task");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("notification drain shutting down");
                    break;
                }
            }
        }
    })
}

/// Record daemon-level metrics once at startup.
fn record_daemon_metrics() {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        // Given: A default config
        let mut config = LogwatchConfig::default();

        // When: Applying command-line overrides
        ConfigOverrides {
            log_level: Some("debug".to_owned()),
            log_format: None,
            replay: true,
        }
        .apply(&mut config);

        // Then: Only the overridden fields change
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert!(config.watcher.replay_from_start);
    }

    #[test]
    fn test_replay_flag_off_keeps_file_value() {
        let mut config = LogwatchConfig::default();
        config.watcher.replay_from_start = true;
        ConfigOverrides::default().apply(&mut config);
        assert!(config.watcher.replay_from_start);
    }

    #[tokio::test]
    async fn test_uptime_updater_shutdown_signal() {
        // Given: A running uptime updater
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = spawn_uptime_updater(Instant::now(), shutdown_rx);

        // When: Sending shutdown signal
        let _ = shutdown_tx.send(());

        // Then: Task should complete quickly
        let result = tokio::time::timeout(Duration::from_millis(500), task).await;
        assert!(result.is_ok(), "uptime updater should shut down within timeout");
    }
}
