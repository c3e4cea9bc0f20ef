//! Single-writer sampler state and the read-only snapshots handed to
//! observers.

use crate::source::reading::SampleOutcome;
use std::sync::{Arc, Mutex};

/// Lifecycle phase of the sampler's tick loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPhase {
    Idle,
    Sampling,
    Backoff,
    Shutdown,
}

/// Read-only copy of the sampler state at one point in time.
#[derive(Debug, Clone)]
pub struct SamplerSnapshot {
    pub phase: SamplerPhase,
    pub sequence: u64,
    pub consecutive_failures: u32,
    pub degraded: bool,
    pub last_outcome: Option<SampleOutcome>,
}

#[derive(Debug)]
struct StateInner {
    phase: SamplerPhase,
    sequence: u64,
    consecutive_failures: u32,
    degraded: bool,
    last_outcome: Option<SampleOutcome>,
}

/// Process-wide sampler state. The sampler task is the only writer; every
/// other party reads cloned snapshots, never a live reference.
#[derive(Debug, Clone)]
pub struct SharedSamplerState {
    inner: Arc<Mutex<StateInner>>,
}

impl Default for SharedSamplerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSamplerState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StateInner {
                phase: SamplerPhase::Idle,
                sequence: 0,
                consecutive_failures: 0,
                degraded: false,
                last_outcome: None,
            })),
        }
    }

    pub fn snapshot(&self) -> SamplerSnapshot {
        let guard = self.inner.lock().expect("sampler state mutex poisoned");
        SamplerSnapshot {
            phase: guard.phase,
            sequence: guard.sequence,
            consecutive_failures: guard.consecutive_failures,
            degraded: guard.degraded,
            last_outcome: guard.last_outcome.clone(),
        }
    }

    pub(crate) fn set_phase(&self, phase: SamplerPhase) {
        let mut guard = self.inner.lock().expect("sampler state mutex poisoned");
        guard.phase = phase;
    }

    /// Records an outcome and assigns it the next sequence number.
    pub(crate) fn publish(
        &self,
        outcome: SampleOutcome,
        consecutive_failures: u32,
        degraded: bool,
    ) -> u64 {
        let mut guard = self.inner.lock().expect("sampler state mutex poisoned");
        guard.sequence += 1;
        guard.consecutive_failures = consecutive_failures;
        guard.degraded = degraded;
        guard.last_outcome = Some(outcome);
        guard.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::reading::ErrorKind;

    #[test]
    fn publish_assigns_increasing_sequence_numbers() {
        let state = SharedSamplerState::new();
        let first = state.publish(
            SampleOutcome::failure(ErrorKind::Timeout, "slow"),
            1,
            false,
        );
        let second = state.publish(
            SampleOutcome::failure(ErrorKind::Timeout, "slow again"),
            2,
            false,
        );
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.consecutive_failures, 2);
        assert!(!snapshot.degraded);
        assert!(snapshot.last_outcome.is_some());
    }

    #[test]
    fn phase_transitions_are_visible_in_snapshots() {
        let state = SharedSamplerState::new();
        assert_eq!(state.snapshot().phase, SamplerPhase::Idle);

        state.set_phase(SamplerPhase::Sampling);
        assert_eq!(state.snapshot().phase, SamplerPhase::Sampling);

        state.set_phase(SamplerPhase::Shutdown);
        assert_eq!(state.snapshot().phase, SamplerPhase::Shutdown);
    }
}
