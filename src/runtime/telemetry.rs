use crate::sampler::state::SharedSamplerState;
use crate::source::reading::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    published_samples: AtomicU64,
    fetch_errors: AtomicU64,
    fetch_timeouts: AtomicU64,
    degraded_transitions: AtomicU64,
}

impl Telemetry {
    pub fn record_sample_published(&self) {
        self.published_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self, kind: ErrorKind) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
        if matches!(kind, ErrorKind::Timeout) {
            self.fetch_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_degraded_transition(&self) {
        self.degraded_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            published_samples: self.published_samples.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            fetch_timeouts: self.fetch_timeouts.load(Ordering::Relaxed),
            degraded_transitions: self.degraded_transitions.load(Ordering::Relaxed),
        }
    }

    pub fn published_samples(&self) -> u64 {
        self.published_samples.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }

    pub fn fetch_timeouts(&self) -> u64 {
        self.fetch_timeouts.load(Ordering::Relaxed)
    }

    pub fn degraded_transitions(&self) -> u64 {
        self.degraded_transitions.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub published_samples: u64,
    pub fetch_errors: u64,
    pub fetch_timeouts: u64,
    pub degraded_transitions: u64,
}

/// Spawns a background task that periodically logs sampling throughput,
/// sampler state, and fetch error counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    state: SharedSamplerState,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "gaspulse::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let published_delta = current_snapshot
                        .published_samples
                        .saturating_sub(last_snapshot.published_samples);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let rate = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        published_delta as f64 / elapsed
                    };
                    let sampler = state.snapshot();

                    tracing::info!(
                        target: "gaspulse::metrics",
                        samples_per_sec = format!("{rate:.2}"),
                        published = current_snapshot.published_samples,
                        sequence = sampler.sequence,
                        consecutive_failures = sampler.consecutive_failures,
                        degraded = sampler.degraded,
                        fetch_errors = current_snapshot.fetch_errors,
                        fetch_timeouts = current_snapshot.fetch_timeouts,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
