//! Fee oracle plumbing: the JSON-RPC client, authentication, transport
//! options, request metrics, and the classified reading model.

pub mod auth;
pub mod client;
pub mod metrics;
pub mod options;
pub mod reading;

pub use client::{FeeSource, GasOracleClient};
pub use metrics::SourceMetricsSnapshot;
pub use options::FeeSourceOptions;
pub use reading::{ErrorKind, FeeReading, SampleOutcome};
