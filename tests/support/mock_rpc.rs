use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// How the mock oracle answers the next requests.
#[derive(Clone, Copy, Debug)]
pub enum OracleBehavior {
    Healthy,
    /// HTTP 500 on every request.
    ServerError,
    /// HTTP 429 on every request.
    RateLimited,
    /// Pending block without a `baseFeePerGas` field.
    MissingBaseFee,
    /// `eth_gasPrice` returns a non-quantity string.
    GarbageGasPrice,
    /// Delays every response by the given duration before answering
    /// normally.
    Stall(Duration),
}

#[derive(Clone)]
pub struct MockOracle {
    inner: Arc<RwLock<OracleState>>,
    calls: Arc<AtomicU64>,
}

struct OracleState {
    gas_price_wei: u128,
    base_fee_wei: u128,
    behavior: OracleBehavior,
}

impl MockOracle {
    pub fn new(gas_price_wei: u128, base_fee_wei: u128) -> Self {
        Self {
            inner: Arc::new(RwLock::new(OracleState {
                gas_price_wei,
                base_fee_wei,
                behavior: OracleBehavior::Healthy,
            })),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_fees(&self, gas_price_wei: u128, base_fee_wei: u128) {
        let mut state = self.inner.write().expect("mock oracle poisoned");
        state.gas_price_wei = gas_price_wei;
        state.base_fee_wei = base_fee_wei;
    }

    pub fn set_behavior(&self, behavior: OracleBehavior) {
        let mut state = self.inner.write().expect("mock oracle poisoned");
        state.behavior = behavior;
    }

    /// Number of HTTP round trips served (one per sampler fetch).
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> (u128, u128, OracleBehavior) {
        let state = self.inner.read().expect("mock oracle poisoned");
        (state.gas_price_wei, state.base_fee_wei, state.behavior)
    }
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(oracle: MockOracle) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let oracle = oracle.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(oracle.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    oracle: MockOracle,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    oracle.calls.fetch_add(1, Ordering::SeqCst);
    let (gas_price_wei, base_fee_wei, behavior) = oracle.snapshot();

    match behavior {
        OracleBehavior::ServerError => {
            let mut response = Response::new(Body::from("internal error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            return Ok(response);
        }
        OracleBehavior::RateLimited => {
            let mut response = Response::new(Body::from("slow down"));
            *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            return Ok(response);
        }
        OracleBehavior::Stall(delay) => {
            sleep(delay).await;
        }
        _ => {}
    }

    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = if payload.is_array() {
        Value::Array(
            payload
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|call| handle_call(gas_price_wei, base_fee_wei, behavior, call))
                .collect(),
        )
    } else {
        handle_call(gas_price_wei, base_fee_wei, behavior, payload)
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(
    gas_price_wei: u128,
    base_fee_wei: u128,
    behavior: OracleBehavior,
    call: Value,
) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match method.as_str() {
        "eth_gasPrice" => {
            if matches!(behavior, OracleBehavior::GarbageGasPrice) {
                success(id, json!("definitely-not-a-quantity"))
            } else {
                success(id, json!(format!("{:#x}", gas_price_wei)))
            }
        }
        "eth_getBlockByNumber" => {
            let mut block = json!({
                "number": "0x10",
                "hash": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "baseFeePerGas": format!("{:#x}", base_fee_wei),
            });
            if matches!(behavior, OracleBehavior::MissingBaseFee) {
                block.as_object_mut().unwrap().remove("baseFeePerGas");
            }
            success(id, block)
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
