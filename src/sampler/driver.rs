//! Tick loop and resilience policy for the fee sampler.
//!
//! The sampler owns the polling cadence: one timer-driven task serializes
//! every oracle fetch (a fetch that outlives its tick coalesces the next
//! tick instead of stacking a concurrent request), applies the backoff
//! policy on failure, and publishes every outcome to the sink in strictly
//! increasing sequence order.

use crate::reporter::SampleSink;
use crate::runtime::config::SamplerConfig;
use crate::runtime::telemetry::Telemetry;
use crate::sampler::backoff::{sleep_with_cancellation, BackoffPolicy};
use crate::sampler::state::{SamplerPhase, SamplerSnapshot, SharedSamplerState};
use crate::source::reading::{FeeReading, SampleOutcome};
use crate::source::FeeSource;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Extra time `stop` grants the loop to notice cancellation and unwind
/// after the in-flight fetch deadline has passed.
const STOP_JOIN_MARGIN: Duration = Duration::from_millis(500);

/// Timer-driven sampler: the only writer of [`SharedSamplerState`].
pub struct FeeSampler {
    source: Arc<dyn FeeSource>,
    state: SharedSamplerState,
    telemetry: Arc<Telemetry>,
    poll_interval: Duration,
    failure_ceiling: u32,
    shutdown_deadline: Duration,
    policy: BackoffPolicy,
    shutdown_root: CancellationToken,
    run_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

struct LoopContext {
    source: Arc<dyn FeeSource>,
    state: SharedSamplerState,
    telemetry: Arc<Telemetry>,
    sink: Arc<dyn SampleSink>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    failure_ceiling: u32,
    shutdown_deadline: Duration,
    policy: BackoffPolicy,
}

impl FeeSampler {
    pub fn new(
        config: &SamplerConfig,
        source: Arc<dyn FeeSource>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self::with_cancellation_token(config, source, telemetry, CancellationToken::new())
    }

    /// Creates a sampler wired to an externally owned root token so callers
    /// can integrate their own signal handling.
    pub fn with_cancellation_token(
        config: &SamplerConfig,
        source: Arc<dyn FeeSource>,
        telemetry: Arc<Telemetry>,
        shutdown_root: CancellationToken,
    ) -> Self {
        Self {
            source,
            state: SharedSamplerState::new(),
            telemetry,
            poll_interval: config.poll_interval(),
            failure_ceiling: config.max_consecutive_failures(),
            shutdown_deadline: config.shutdown_deadline(),
            policy: BackoffPolicy::new(config.poll_interval(), config.backoff_cap_multiplier()),
            shutdown_root,
            run_token: None,
            handle: None,
        }
    }

    /// Read-only copy of the current sampler state.
    pub fn snapshot(&self) -> SamplerSnapshot {
        self.state.snapshot()
    }

    /// Handle other tasks (metrics reporting) can use to read snapshots.
    pub fn state_handle(&self) -> SharedSamplerState {
        self.state.clone()
    }

    pub(crate) fn replace_shutdown_root(&mut self, token: CancellationToken) {
        self.shutdown_root = token;
    }

    /// Spawns the tick loop. Each published outcome is handed to `sink`
    /// with its sequence number; callbacks arrive in order, gap-free, and
    /// never overlap. Calling `start` on a running sampler is a no-op.
    pub async fn start(&mut self, sink: Arc<dyn SampleSink>) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let run_token = self.shutdown_root.child_token();
        let context = LoopContext {
            source: self.source.clone(),
            state: self.state.clone(),
            telemetry: self.telemetry.clone(),
            sink,
            shutdown: run_token.clone(),
            poll_interval: self.poll_interval,
            failure_ceiling: self.failure_ceiling,
            shutdown_deadline: self.shutdown_deadline,
            policy: self.policy,
        };

        self.run_token = Some(run_token);
        self.handle = Some(tokio::spawn(run_loop(context)));
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            failure_ceiling = self.failure_ceiling,
            "fee sampler started"
        );
        Ok(())
    }

    /// Stops the tick loop. Blocks until the in-flight fetch resolves or
    /// the shutdown deadline elapses, whichever comes first; after `stop`
    /// returns, no further sink callbacks fire. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.run_token.take() {
            token.cancel();
        }

        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        let grace = self.shutdown_deadline.saturating_add(STOP_JOIN_MARGIN);
        match timeout(grace, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.is_panic() => {
                return Err(anyhow!("sampler task panicked: {err}"));
            }
            Ok(Err(_)) => {}
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                tracing::warn!("sampler task exceeded shutdown deadline and was aborted");
            }
        }

        Ok(())
    }
}

async fn run_loop(context: LoopContext) {
    let LoopContext {
        source,
        state,
        telemetry,
        sink,
        shutdown,
        poll_interval,
        failure_ceiling,
        shutdown_deadline,
        policy,
    } = context;

    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures: u32 = 0;
    let mut degraded = false;

    'ticks: loop {
        tokio::select! {
            _ = shutdown.cancelled() => break 'ticks,
            _ = ticker.tick() => {}
        }

        loop {
            state.set_phase(SamplerPhase::Sampling);

            let mut fetch = source.fetch();
            let outcome = tokio::select! {
                outcome = &mut fetch => outcome,
                _ = shutdown.cancelled() => {
                    // Let the in-flight call settle, bounded by the hard
                    // deadline; its result is discarded either way.
                    let _ = timeout(shutdown_deadline, &mut fetch).await;
                    break 'ticks;
                }
            };

            let was_degraded = degraded;
            match &outcome {
                SampleOutcome::Success(reading) => {
                    consecutive_failures = 0;
                    degraded = false;
                    warn_on_divergence(reading);
                }
                SampleOutcome::Failure { kind, .. } => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    telemetry.record_fetch_error(*kind);
                    if consecutive_failures >= failure_ceiling {
                        degraded = true;
                    }
                }
            }

            let sequence = state.publish(outcome.clone(), consecutive_failures, degraded);
            telemetry.record_sample_published();
            sink.on_update(&outcome, sequence);

            match &outcome {
                SampleOutcome::Success(_) => {
                    if was_degraded {
                        tracing::info!(sequence, "oracle recovered; leaving degraded state");
                    }
                    state.set_phase(SamplerPhase::Idle);
                    continue 'ticks;
                }
                SampleOutcome::Failure { kind, message } => {
                    if degraded {
                        if !was_degraded {
                            telemetry.record_degraded_transition();
                            tracing::warn!(
                                consecutive_failures,
                                "failure ceiling reached; reverting to normal cadence in degraded state"
                            );
                        }
                        state.set_phase(SamplerPhase::Idle);
                        continue 'ticks;
                    }

                    let delay = policy.delay(*kind, consecutive_failures);
                    tracing::warn!(
                        kind = %kind,
                        consecutive_failures,
                        backoff_ms = delay.as_millis() as u64,
                        error = %message,
                        "fetch failed; backing off before retry"
                    );
                    state.set_phase(SamplerPhase::Backoff);
                    if sleep_with_cancellation(delay, Some(&shutdown)).await.is_err() {
                        break 'ticks;
                    }
                }
            }
        }
    }

    state.set_phase(SamplerPhase::Shutdown);
    tracing::info!("fee sampler stopped");
}

fn warn_on_divergence(reading: &FeeReading) {
    let gap = reading.consistency_gap();
    if !gap.is_zero() {
        tracing::warn!(
            gap_wei = %gap,
            gas_price_wei = %reading.gas_price_wei,
            base_fee_wei = %reading.base_fee_wei,
            "provider quoted a gas price that diverges from base fee + priority fee"
        );
    }
}
