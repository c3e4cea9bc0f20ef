use std::sync::Mutex;
use std::time::Duration;

use gaspulse::{SampleOutcome, SampleSink};
use once_cell::sync::Lazy;
use tokio::time::{sleep, Instant};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Sink that records every callback so tests can assert on ordering and
/// delivery counts.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(u64, SampleOutcome)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(u64, SampleOutcome)> {
        self.events.lock().expect("recording sink poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("recording sink poisoned").len()
    }

    pub fn last(&self) -> Option<(u64, SampleOutcome)> {
        self.events
            .lock()
            .expect("recording sink poisoned")
            .last()
            .cloned()
    }
}

impl SampleSink for RecordingSink {
    fn on_update(&self, outcome: &SampleOutcome, sequence: u64) {
        self.events
            .lock()
            .expect("recording sink poisoned")
            .push((sequence, outcome.clone()));
    }
}

/// Asserts sequence numbers run 1, 2, 3, ... with no gaps or duplicates.
pub fn assert_contiguous(events: &[(u64, SampleOutcome)]) {
    for (idx, (sequence, _)) in events.iter().enumerate() {
        assert_eq!(
            *sequence,
            idx as u64 + 1,
            "sequence numbers must be contiguous from 1"
        );
    }
}

/// Polls `predicate` until it returns true or `deadline` elapses.
pub async fn wait_until<F>(deadline: Duration, predicate: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
