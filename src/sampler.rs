//! Polling cadence and resilience policy: the tick-loop driver, the backoff
//! policy it applies between retries, and the single-writer state it
//! publishes through.

pub mod backoff;
pub mod driver;
pub mod state;

pub use backoff::BackoffPolicy;
pub use driver::FeeSampler;
pub use state::{SamplerPhase, SamplerSnapshot, SharedSamplerState};
