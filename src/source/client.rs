//! Oracle client for Ethereum-style JSON-RPC endpoints. Houses the
//! `GasOracleClient`, the `FeeSource` trait consumed by the sampler, and the
//! error classification that drives the sampler's backoff policy.

use crate::runtime::config::SamplerConfig;
use crate::source::auth::build_auth_headers;
use crate::source::metrics::{SourceMetrics, SourceMetricsSnapshot};
use crate::source::options::FeeSourceOptions;
use crate::source::reading::{ErrorKind, FeeReading, SampleOutcome};
use alloy_primitives::U256;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    params::BatchRequestBuilder,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use jsonrpsee::types::ErrorObject;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

const HTTP_TOO_MANY_REQUESTS: u16 = 429;
/// JSON-RPC error code several public gateways use for "limit exceeded".
const JSONRPC_LIMIT_EXCEEDED: i32 = -32005;

/// Abstraction over "how to ask" the upstream provider for one fee reading.
///
/// Implementations perform exactly one outbound call per invocation, bounded
/// by their configured timeout, and never retry internally. Cadence and
/// resilience policy belong to the sampler.
pub trait FeeSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, SampleOutcome>;
}

#[derive(Debug, Clone)]
pub struct GasOracleClient {
    endpoint: Arc<String>,
    client: HttpClient,
    options: FeeSourceOptions,
    metrics: Arc<SourceMetrics>,
}

/// Pending block shape trimmed to the single field the sampler needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingBlock {
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
}

#[derive(Debug)]
struct ClassifiedError {
    kind: ErrorKind,
    message: String,
}

impl ClassifiedError {
    fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            message: message.into(),
        }
    }
}

impl FeeSource for GasOracleClient {
    fn fetch(&self) -> BoxFuture<'_, SampleOutcome> {
        Box::pin(self.fetch_once())
    }
}

impl GasOracleClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, None, FeeSourceOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        credentials: Option<(&str, &str)>,
        options: FeeSourceOptions,
    ) -> Result<Self> {
        options.validate()?;

        let endpoint = url.into();
        let headers = build_auth_headers(credentials)?;
        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .build(&endpoint)
            .map_err(|err| anyhow!("failed to build oracle client: {err}"))?;

        Ok(Self {
            endpoint: Arc::new(endpoint),
            client,
            options,
            metrics: Arc::new(SourceMetrics::default()),
        })
    }

    pub fn from_config(config: &SamplerConfig) -> Result<Self> {
        config.validate()?;
        let options = FeeSourceOptions {
            request_timeout: config.request_timeout(),
            ..FeeSourceOptions::default()
        };
        Self::with_options(config.endpoint_url().to_owned(), config.credentials(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn metrics(&self) -> SourceMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Executes one batched round trip and classifies any failure into the
    /// recoverable taxonomy. Never retries.
    async fn fetch_once(&self) -> SampleOutcome {
        let start = Instant::now();

        match self.quote_fees().await {
            Ok(reading) => {
                self.metrics.record_success(start.elapsed());
                SampleOutcome::Success(reading)
            }
            Err(failure) => {
                let elapsed = start.elapsed();
                match failure.kind {
                    ErrorKind::Timeout => self.metrics.record_timeout(elapsed),
                    _ => self.metrics.record_failure(elapsed),
                }
                tracing::debug!(
                    kind = %failure.kind,
                    error = %failure.message,
                    "fee quote failed"
                );
                SampleOutcome::failure(failure.kind, failure.message)
            }
        }
    }

    /// One JSON-RPC batch carrying both quotes the original monitor issued
    /// separately: the node's gas price and the pending block's base fee.
    async fn quote_fees(&self) -> Result<FeeReading, ClassifiedError> {
        let mut batch = BatchRequestBuilder::new();
        batch
            .insert("eth_gasPrice", rpc_params![])
            .map_err(|err| ClassifiedError::malformed(format!("failed to serialize eth_gasPrice params: {err}")))?;
        batch
            .insert("eth_getBlockByNumber", rpc_params!["pending", false])
            .map_err(|err| {
                ClassifiedError::malformed(format!(
                    "failed to serialize eth_getBlockByNumber params: {err}"
                ))
            })?;

        let response = timeout(
            self.options.request_timeout,
            self.client.batch_request::<Value>(batch),
        )
        .await
        .map_err(|_| ClassifiedError {
            kind: ErrorKind::Timeout,
            message: format!(
                "no response within {}ms",
                self.options.request_timeout.as_millis()
            ),
        })?
        .map_err(classify_client_error)?;

        let mut values = Vec::with_capacity(response.len());
        for entry in response.into_iter() {
            match entry {
                Ok(value) => values.push(value),
                Err(err) => return Err(classify_call_error(&err)),
            }
        }

        // jsonrpsee matches batch replies back to request order by id.
        let [gas_price_raw, pending_block_raw]: [Value; 2] =
            values.try_into().map_err(|_| {
                ClassifiedError::malformed("batch reply did not contain exactly two results")
            })?;

        let gas_price = parse_quantity("eth_gasPrice", &gas_price_raw)?;
        let base_fee = parse_base_fee(&pending_block_raw)?;

        Ok(FeeReading::derive(gas_price, base_fee))
    }
}

fn parse_quantity(field: &str, value: &Value) -> Result<U256, ClassifiedError> {
    let text = value
        .as_str()
        .ok_or_else(|| ClassifiedError::malformed(format!("{field} result is not a quantity string")))?;
    U256::from_str(text)
        .map_err(|err| ClassifiedError::malformed(format!("{field} is not a hex quantity: {err}")))
}

fn parse_base_fee(block: &Value) -> Result<U256, ClassifiedError> {
    if block.is_null() {
        return Err(ClassifiedError::malformed(
            "provider returned no pending block",
        ));
    }

    let block: PendingBlock = serde_json::from_value(block.clone())
        .map_err(|err| ClassifiedError::malformed(format!("pending block failed to parse: {err}")))?;

    block.base_fee_per_gas.ok_or_else(|| {
        ClassifiedError::malformed("pending block lacks baseFeePerGas")
    })
}

fn classify_client_error(err: JsonRpcError) -> ClassifiedError {
    match &err {
        JsonRpcError::RequestTimeout => ClassifiedError {
            kind: ErrorKind::Timeout,
            message: "request timed out in transport".to_string(),
        },
        JsonRpcError::Transport(inner) => {
            if let Some(transport) = inner.downcast_ref::<HttpTransportError>() {
                if let HttpTransportError::Rejected { status_code } = transport {
                    if *status_code == HTTP_TOO_MANY_REQUESTS {
                        return ClassifiedError {
                            kind: ErrorKind::RateLimited,
                            message: "provider rejected request with HTTP 429".to_string(),
                        };
                    }
                }
            }
            ClassifiedError {
                kind: ErrorKind::Unreachable,
                message: format!("transport failure: {inner}"),
            }
        }
        JsonRpcError::ParseError(parse) => {
            ClassifiedError::malformed(format!("invalid JSON-RPC response: {parse}"))
        }
        JsonRpcError::Call(call) => classify_call_error(call),
        other => ClassifiedError {
            kind: ErrorKind::Unreachable,
            message: format!("rpc client failure: {other}"),
        },
    }
}

fn classify_call_error(err: &ErrorObject<'_>) -> ClassifiedError {
    let rate_limited = err.code() == JSONRPC_LIMIT_EXCEEDED
        || err.code() == HTTP_TOO_MANY_REQUESTS as i32
        || err.message().to_ascii_lowercase().contains("rate limit");

    if rate_limited {
        ClassifiedError {
            kind: ErrorKind::RateLimited,
            message: format!(
                "provider requested backoff (code={}): {}",
                err.code(),
                err.message()
            ),
        }
    } else {
        ClassifiedError::malformed(format!(
            "provider error reply (code={}): {}",
            err.code(),
            err.message()
        ))
    }
}
