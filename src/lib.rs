pub mod reporter;
pub mod runtime;
pub mod sampler;
pub mod source;

pub use reporter::{format_gwei, SampleSink, StdoutReporter};
pub use runtime::config::{SamplerConfig, SamplerConfigBuilder, SamplerConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use sampler::backoff::BackoffPolicy;
pub use sampler::driver::FeeSampler;
pub use sampler::state::{SamplerPhase, SamplerSnapshot, SharedSamplerState};
pub use source::{
    ErrorKind, FeeReading, FeeSource, FeeSourceOptions, GasOracleClient, SampleOutcome,
    SourceMetricsSnapshot,
};
