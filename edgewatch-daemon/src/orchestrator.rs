//! Component assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `edgewatch-daemon`.
//! It validates configuration, opens the stores under `data_dir`, builds the
//! ingestion pipeline and query service, runs background tasks, and shuts
//! everything down in order.
//!
//! # Startup Order
//!
//! 1. Metrics recorder (if enabled)
//! 2. Event store, system log store, frame archive
//! 3. Ingestion pipeline and query service
//! 4. PID file, startup log entry
//! 5. Idle-device eviction task, uptime updater
//!
//! # Shutdown Order
//!
//! 1. Cancel background tasks and wait for them
//! 2. Record the shutdown log entry
//! 3. Remove the PID file
//!
//! The frame transport and the detection model are not part of the daemon;
//! they plug in through [`Orchestrator::build_with`] and
//! [`Orchestrator::pipeline`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use edgewatch_alert_engine::{
    EvictionSettings, IngestionPipeline, QueryService, spawn_eviction_task,
};
use edgewatch_core::config::EdgewatchConfig;
use edgewatch_core::metrics as m;
use edgewatch_core::pipeline::{Detector, DisabledNotifier, HealthStatus, Notifier, UnavailableDetector};
use edgewatch_core::types::SystemLogEntry;
use edgewatch_event_store::{EventRecorder, FrameArchive, LogRecorder};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::metrics_server;
use crate::pid_file::{remove_pid_file, write_pid_file};

/// Interval between uptime gauge updates.
const UPTIME_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator<D: Detector = UnavailableDetector, N: Notifier = DisabledNotifier> {
    /// Loaded and validated configuration.
    config: EdgewatchConfig,
    /// Frame ingestion pipeline shared with the transport layer.
    pipeline: Arc<IngestionPipeline<D, N>>,
    /// Read-side queries over the same stores.
    query: QueryService,
    /// Cancels all background tasks.
    cancel: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator with default collaborators.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = EdgewatchConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Uses [`UnavailableDetector`] and [`DisabledNotifier`]: frames are
    /// recorded with zero detections and no alert is ever sent.
    pub async fn build_from_config(config: EdgewatchConfig) -> Result<Self> {
        Self::build_with(config, UnavailableDetector, DisabledNotifier).await
    }
}

impl<D: Detector, N: Notifier> Orchestrator<D, N> {
    /// Build with a concrete detector and notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - Any store under `data_dir` cannot be opened
    pub async fn build_with(config: EdgewatchConfig, detector: D, notifier: N) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let events = EventRecorder::open(config.events_path())
            .await
            .map_err(|e| anyhow::anyhow!("failed to open event store: {}", e))?;
        let logs = LogRecorder::open(config.logs_path(), config.storage.log_capacity)
            .await
            .map_err(|e| anyhow::anyhow!("failed to open system log store: {}", e))?;

        let mut builder = IngestionPipeline::builder(
            Arc::new(detector),
            Arc::new(notifier),
            Arc::new(events),
            Arc::new(logs),
        )
        .config(&config);

        if config.storage.save_images {
            let archive = FrameArchive::open(config.images_path())
                .await
                .map_err(|e| anyhow::anyhow!("failed to open frame archive: {}", e))?;
            builder = builder.frame_archive(archive);
        }

        let pipeline = Arc::new(builder.build());
        let query = QueryService::for_pipeline(&*pipeline);

        if !pipeline.detector_ready() {
            tracing::warn!(
                detector = pipeline.detector_name(),
                "no detection model loaded, frames will be recorded with zero detections"
            );
        }
        if !pipeline.notifier_enabled() {
            tracing::warn!("notifier disabled, no alerts will be sent");
        }

        tracing::info!(
            data_dir = %config.general.data_dir,
            detector = pipeline.detector_name(),
            notifier = pipeline.notifier_name(),
            cooldown_secs = config.alert.cooldown_secs,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline,
            query,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Run until SIGTERM or SIGINT is received.
    pub async fn run(&self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then shut down in order.
    ///
    /// `shutdown` yields the name of the trigger, used for logging.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_path = (!self.config.general.pid_file.is_empty())
            .then(|| Path::new(&self.config.general.pid_file).to_path_buf());
        if let Some(path) = &pid_path {
            write_pid_file(path)?;
        }

        self.record(
            SystemLogEntry::info("daemon started")
                .with_detail("version", env!("CARGO_PKG_VERSION"))
                .with_detail("detector", self.pipeline.detector_name())
                .with_detail("notifier", self.pipeline.notifier_name()),
        )
        .await;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        if let Some(settings) = EvictionSettings::from_config(&self.config.alert) {
            tasks.push(spawn_eviction_task(
                Arc::clone(self.pipeline.devices()),
                Arc::clone(self.pipeline.clock()),
                settings,
                self.cancel.child_token(),
            ));
        }
        if self.config.metrics.enabled {
            tasks.push(spawn_uptime_updater(
                self.start_time,
                self.cancel.child_token(),
            ));
        }

        tracing::info!("edgewatch-daemon running");
        let outcome = shutdown.await;
        match &outcome {
            Ok(trigger) => tracing::info!(signal = trigger, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown signal handling failed"),
        }

        self.cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }

        self.record(
            SystemLogEntry::info("daemon stopped")
                .with_detail("uptime_secs", self.start_time.elapsed().as_secs()),
        )
        .await;

        if let Some(path) = &pid_path {
            remove_pid_file(path);
        }

        outcome.map(|_| ())
    }

    /// Current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let events = match self.pipeline.events().count().await {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        let logs = self.pipeline.logs();
        let log_store = if logs.last_persist_failed() {
            HealthStatus::Degraded("last write to the system log file failed".to_owned())
        } else {
            HealthStatus::Healthy
        };
        let detector = if self.pipeline.detector_ready() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded("no detection model loaded".to_owned())
        };
        let notifier = if self.pipeline.notifier_enabled() {
            ComponentHealth::new("notifier", HealthStatus::Healthy)
        } else {
            ComponentHealth::disabled("notifier")
        };

        let components = vec![
            ComponentHealth::new("event-store", events),
            ComponentHealth::new("log-store", log_store),
            ComponentHealth::new("detector", detector),
            notifier,
        ];

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs,
            tracked_devices: self.pipeline.devices().len().await,
            components,
        }
    }

    /// Ingestion pipeline, for the frame transport to call.
    pub fn pipeline(&self) -> &Arc<IngestionPipeline<D, N>> {
        &self.pipeline
    }

    /// Query service over the same stores.
    pub fn query(&self) -> &QueryService {
        &self.query
    }

    /// Loaded configuration.
    pub fn config(&self) -> &EdgewatchConfig {
        &self.config
    }

    async fn record(&self, entry: SystemLogEntry) {
        if let Err(e) = self.pipeline.logs().append(entry).await {
            tracing::error!(error = %e, "failed to record system log entry");
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a task that keeps the uptime gauge fresh for Prometheus scrapes.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
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
