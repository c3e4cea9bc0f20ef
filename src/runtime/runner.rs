use crate::reporter::StdoutReporter;
use crate::runtime::config::SamplerConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry, TelemetrySnapshot};
use crate::sampler::driver::FeeSampler;
use crate::sampler::state::SamplerSnapshot;
use crate::source::{FeeSource, GasOracleClient};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinates the sampler lifecycle and handles OS signals for graceful
/// shutdowns: drain the in-flight fetch, stop the timer, flush and close
/// the reporter.
pub struct Runner {
    sampler: FeeSampler,
    telemetry: Arc<Telemetry>,
    metrics_interval: Duration,
    reporter: Option<Arc<StdoutReporter>>,
    metrics_handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
    started: bool,
}

impl Runner {
    /// Builds a runner backed by a [`GasOracleClient`] for the configured
    /// endpoint.
    pub fn new(config: SamplerConfig) -> Result<Self> {
        let source: Arc<dyn FeeSource> = Arc::new(GasOracleClient::from_config(&config)?);
        Ok(Self::with_source(config, source))
    }

    /// Wires a caller-supplied fee source; useful for embedders with their
    /// own transport.
    pub fn with_source(config: SamplerConfig, source: Arc<dyn FeeSource>) -> Self {
        let shutdown = CancellationToken::new();
        let telemetry = Arc::new(Telemetry::default());
        let sampler = FeeSampler::with_cancellation_token(
            &config,
            source,
            telemetry.clone(),
            shutdown.clone(),
        );

        Self {
            sampler,
            telemetry,
            metrics_interval: config.metrics_interval(),
            reporter: None,
            metrics_handle: None,
            shutdown,
            started: false,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Read-only copy of the sampler state.
    pub fn snapshot(&self) -> SamplerSnapshot {
        self.sampler.snapshot()
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Starts the sampler, the stdout reporter, and the metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let reporter = StdoutReporter::new();
        self.metrics_handle = Some(spawn_metrics_reporter(
            self.telemetry.clone(),
            self.sampler.state_handle(),
            self.shutdown.child_token(),
            self.metrics_interval,
        ));
        self.sampler.start(reporter.clone()).await?;
        self.reporter = Some(reporter);
        self.started = true;
        Ok(())
    }

    /// Stops everything gracefully: cancels the root token, waits for the
    /// sampler to quiesce, then flushes and closes the reporter. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        self.sampler.stop().await?;

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        if let Some(reporter) = self.reporter.take() {
            reporter.close().await;
        }

        self.started = false;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is
    /// cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.sampler.replace_shutdown_root(self.shutdown.clone());
    }
}
