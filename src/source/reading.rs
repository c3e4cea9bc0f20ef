//! Classified reading model shared between the oracle client, the sampler,
//! and reporting sinks.

use alloy_primitives::U256;
use std::time::{Instant, SystemTime};

/// Recoverable failure taxonomy for a single oracle fetch.
///
/// The sampler's backoff policy keys off this classification: rate limits
/// wait longer, connectivity problems back off exponentially, and malformed
/// replies are retried like any other transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection or DNS failure before any response arrived.
    Unreachable,
    /// No response within the configured per-request timeout.
    Timeout,
    /// The provider answered, but the reply was missing fields or not
    /// numeric where a quantity was expected.
    MalformedResponse,
    /// The provider explicitly asked for backoff (HTTP 429 or an
    /// equivalent JSON-RPC error).
    RateLimited,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Unreachable => write!(f, "Unreachable"),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::MalformedResponse => write!(f, "MalformedResponse"),
            ErrorKind::RateLimited => write!(f, "RateLimited"),
        }
    }
}

/// One successful fee observation.
///
/// Carries both a wall-clock timestamp (for display) and a monotonic one
/// (for interval math that must not jump with clock adjustments).
#[derive(Debug, Clone, Copy)]
pub struct FeeReading {
    pub observed_at: SystemTime,
    pub observed_mono: Instant,
    pub gas_price_wei: U256,
    pub base_fee_wei: U256,
    pub priority_fee_wei: U256,
}

impl FeeReading {
    /// Builds a reading from the two quantities the oracle actually quotes.
    ///
    /// The priority fee is the difference between the quoted gas price and
    /// the pending base fee, clamped at zero when the base fee exceeds the
    /// gas price. All fields are non-negative by construction.
    pub fn derive(gas_price_wei: U256, base_fee_wei: U256) -> Self {
        Self {
            observed_at: SystemTime::now(),
            observed_mono: Instant::now(),
            gas_price_wei,
            base_fee_wei,
            priority_fee_wei: gas_price_wei.saturating_sub(base_fee_wei),
        }
    }

    /// Absolute difference between the quoted gas price and
    /// `base_fee + priority_fee`.
    ///
    /// Non-zero gaps indicate an inconsistent provider; the sampler logs
    /// them at warn level rather than rejecting the reading.
    pub fn consistency_gap(&self) -> U256 {
        let implied = self.base_fee_wei.saturating_add(self.priority_fee_wei);
        implied.abs_diff(self.gas_price_wei)
    }
}

/// Outcome of a single sampling attempt. Immutable once constructed.
#[derive(Debug, Clone)]
pub enum SampleOutcome {
    Success(FeeReading),
    Failure { kind: ErrorKind, message: String },
}

impl SampleOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        SampleOutcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SampleOutcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            SampleOutcome::Success(_) => None,
            SampleOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wei(value: u64) -> U256 {
        U256::from(value)
    }

    #[test]
    fn derive_splits_gas_price_into_base_and_priority() {
        let reading = FeeReading::derive(wei(5_000_000_000), wei(4_500_000_000));
        assert_eq!(reading.priority_fee_wei, wei(500_000_000));
        assert_eq!(reading.consistency_gap(), U256::ZERO);
    }

    #[test]
    fn derive_clamps_priority_at_zero() {
        let reading = FeeReading::derive(wei(1_000), wei(1_500));
        assert_eq!(reading.priority_fee_wei, U256::ZERO);
        assert_eq!(reading.consistency_gap(), wei(500));
    }

    #[test]
    fn error_kind_display_matches_reported_names() {
        assert_eq!(ErrorKind::Unreachable.to_string(), "Unreachable");
        assert_eq!(ErrorKind::Timeout.to_string(), "Timeout");
        assert_eq!(
            ErrorKind::MalformedResponse.to_string(),
            "MalformedResponse"
        );
        assert_eq!(ErrorKind::RateLimited.to_string(), "RateLimited");
    }

    #[test]
    fn failure_outcome_exposes_kind() {
        let outcome = SampleOutcome::failure(ErrorKind::Timeout, "no reply");
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::Timeout));
    }
}
