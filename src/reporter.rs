//! Reporting sinks: the `SampleSink` contract the sampler publishes into,
//! plus a latest-value stdout reporter that renders asynchronously so a
//! slow terminal can never stall the tick loop.

use crate::source::reading::{ErrorKind, FeeReading, SampleOutcome};
use alloy_primitives::U256;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WEI_PER_GWEI_TENTH: u64 = 100_000_000;

/// Consumer side of the sampler's publish path.
///
/// The sampler invokes this on its own task for every published outcome, in
/// sequence order. Implementations must return quickly; anything slow
/// belongs on a task of its own.
pub trait SampleSink: Send + Sync {
    fn on_update(&self, outcome: &SampleOutcome, sequence: u64);
}

/// Formats a wei quantity as gwei with one fractional digit, rounding half
/// up.
pub fn format_gwei(wei: U256) -> String {
    let tenths = wei
        .saturating_add(U256::from(WEI_PER_GWEI_TENTH / 2))
        .checked_div(U256::from(WEI_PER_GWEI_TENTH))
        .unwrap_or(U256::ZERO);
    let ten = U256::from(10u64);
    format!("{}.{}", tenths / ten, tenths % ten)
}

pub fn format_success_line(reading: &FeeReading) -> String {
    format!(
        "Gas Price: {} gwei | Base Fee: {} gwei | Priority Fee: {} gwei",
        format_gwei(reading.gas_price_wei),
        format_gwei(reading.base_fee_wei),
        format_gwei(reading.priority_fee_wei)
    )
}

pub fn format_degraded_line(kind: ErrorKind, message: &str, attempt: u32) -> String {
    format!("DEGRADED (attempt {attempt}): {kind} — {message}")
}

#[derive(Debug, Clone)]
struct RenderItem {
    sequence: u64,
    attempt: u32,
    outcome: SampleOutcome,
}

/// Renders outcomes to a writer (standard output by default) on a dedicated
/// task fed through a latest-value channel: `on_update` never blocks, and a
/// renderer slower than the tick rate drops intermediate updates rather
/// than queueing them.
pub struct StdoutReporter {
    tx: watch::Sender<Option<RenderItem>>,
    failures: AtomicU32,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StdoutReporter {
    /// Must be called within a Tokio runtime; the render task is spawned
    /// immediately.
    pub fn new() -> Arc<Self> {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Arc<Self> {
        let (tx, rx) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(render_loop(rx, writer, shutdown.clone()));

        Arc::new(Self {
            tx,
            failures: AtomicU32::new(0),
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stops the render task after it has flushed the newest published
    /// outcome. Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handle = {
            self.handle
                .lock()
                .expect("reporter handle mutex poisoned")
                .take()
        };
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "reporter render task panicked");
            }
        }
    }
}

impl SampleSink for StdoutReporter {
    fn on_update(&self, outcome: &SampleOutcome, sequence: u64) {
        let attempt = match outcome {
            SampleOutcome::Success(_) => {
                self.failures.store(0, Ordering::Relaxed);
                0
            }
            SampleOutcome::Failure { .. } => self.failures.fetch_add(1, Ordering::Relaxed) + 1,
        };

        let _ = self.tx.send(Some(RenderItem {
            sequence,
            attempt,
            outcome: outcome.clone(),
        }));
    }
}

async fn render_loop(
    mut rx: watch::Receiver<Option<RenderItem>>,
    mut writer: Box<dyn Write + Send>,
    shutdown: CancellationToken,
) {
    let mut last_rendered: Option<u64> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                render_latest(&mut rx, writer.as_mut(), &mut last_rendered);
            }
        }
    }

    // Flush anything published between the last render and shutdown.
    render_latest(&mut rx, writer.as_mut(), &mut last_rendered);
    if let Err(err) = writer.flush() {
        tracing::debug!(error = %err, "failed to flush reporter sink");
    }
}

fn render_latest(
    rx: &mut watch::Receiver<Option<RenderItem>>,
    writer: &mut (dyn Write + Send),
    last_rendered: &mut Option<u64>,
) {
    let item = rx.borrow_and_update().clone();
    let Some(item) = item else { return };
    if last_rendered.is_some_and(|seq| item.sequence <= seq) {
        return;
    }

    let line = match &item.outcome {
        SampleOutcome::Success(reading) => format_success_line(reading),
        SampleOutcome::Failure { kind, message } => {
            format_degraded_line(*kind, message, item.attempt)
        }
    };

    if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
        tracing::warn!(error = %err, "failed to write fee report line");
    }
    *last_rendered = Some(item.sequence);
}
