//! Runtime wiring: validated configuration, the signal-aware runner, and
//! process telemetry.

pub mod config;
pub mod runner;
pub mod telemetry;

pub use config::{SamplerConfig, SamplerConfigBuilder, SamplerConfigParams};
pub use runner::Runner;
pub use telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
