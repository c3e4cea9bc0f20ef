use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 800;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;
const DEFAULT_BACKOFF_CAP_MULTIPLIER: u32 = 60;
const DEFAULT_SHUTDOWN_DEADLINE_MS: u64 = 3_000;

/// Runtime configuration for the fee sampler.
///
/// All instances must be constructed via [`SamplerConfig::builder`] or
/// [`SamplerConfig::new`] so invariants are validated before any consumer
/// observes the values. A validation failure here is the only fatal error
/// class; everything past startup is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerConfig {
    endpoint_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    poll_interval: Duration,
    request_timeout: Duration,
    max_consecutive_failures: u32,
    backoff_cap_multiplier: u32,
    shutdown_deadline: Duration,
    metrics_interval: Duration,
}

pub struct SamplerConfigParams {
    pub endpoint_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub backoff_cap_multiplier: u32,
    pub shutdown_deadline: Duration,
    pub metrics_interval: Duration,
}

impl SamplerConfig {
    /// Returns a builder to incrementally construct and validate a
    /// configuration.
    pub fn builder() -> SamplerConfigBuilder {
        SamplerConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`SamplerConfig::builder`] when most values use defaults.
    pub fn new(params: SamplerConfigParams) -> Result<Self> {
        let SamplerConfigParams {
            endpoint_url,
            rpc_user,
            rpc_password,
            poll_interval,
            request_timeout,
            max_consecutive_failures,
            backoff_cap_multiplier,
            shutdown_deadline,
            metrics_interval,
        } = params;

        let config = Self {
            endpoint_url: endpoint_url.trim().to_owned(),
            rpc_user: rpc_user.map(|value| value.trim().to_owned()),
            rpc_password,
            poll_interval,
            request_timeout,
            max_consecutive_failures,
            backoff_cap_multiplier,
            shutdown_deadline,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Full JSON-RPC URL (including scheme) of the fee oracle.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Optional Basic auth credentials for private nodes.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }

    /// Normal polling cadence.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Per-request timeout applied to each oracle fetch.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Consecutive failures tolerated before the sampler marks itself
    /// degraded and reverts to the normal cadence.
    pub fn max_consecutive_failures(&self) -> u32 {
        self.max_consecutive_failures
    }

    /// Backoff ceiling expressed as a multiple of the poll interval.
    pub fn backoff_cap_multiplier(&self) -> u32 {
        self.backoff_cap_multiplier
    }

    /// How long `stop` waits for an in-flight fetch before abandoning it.
    pub fn shutdown_deadline(&self) -> Duration {
        self.shutdown_deadline
    }

    /// Interval used by the telemetry log reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        let url = self.endpoint_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("endpoint_url must start with http:// or https://");
        }

        match (&self.rpc_user, &self.rpc_password) {
            (Some(user), Some(_)) if user.trim().is_empty() => {
                bail!("rpc_user cannot be empty when credentials are supplied");
            }
            (Some(_), None) | (None, Some(_)) => {
                bail!("rpc_user and rpc_password must be supplied together");
            }
            _ => {}
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            bail!("max_consecutive_failures must be greater than 0");
        }

        if self.backoff_cap_multiplier == 0 {
            bail!("backoff_cap_multiplier must be greater than 0");
        }

        if self.shutdown_deadline.is_zero() {
            bail!("shutdown_deadline must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct SamplerConfigBuilder {
    endpoint_url: Option<String>,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    poll_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    max_consecutive_failures: Option<u32>,
    backoff_cap_multiplier: Option<u32>,
    shutdown_deadline: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl SamplerConfigBuilder {
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    pub fn rpc_user(mut self, user: impl Into<String>) -> Self {
        self.rpc_user = Some(user.into());
        self
    }

    pub fn rpc_password(mut self, password: impl Into<String>) -> Self {
        self.rpc_password = Some(password.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_consecutive_failures(mut self, ceiling: u32) -> Self {
        self.max_consecutive_failures = Some(ceiling);
        self
    }

    pub fn backoff_cap_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_cap_multiplier = Some(multiplier);
        self
    }

    pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = Some(deadline);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<SamplerConfig> {
        let params = SamplerConfigParams {
            endpoint_url: self.endpoint_url.context("endpoint_url is required")?,
            rpc_user: self.rpc_user,
            rpc_password: self.rpc_password,
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            max_consecutive_failures: self
                .max_consecutive_failures
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            backoff_cap_multiplier: self
                .backoff_cap_multiplier
                .unwrap_or(DEFAULT_BACKOFF_CAP_MULTIPLIER),
            shutdown_deadline: self
                .shutdown_deadline
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_SHUTDOWN_DEADLINE_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        SamplerConfig::new(params)
    }
}
