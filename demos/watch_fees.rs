use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use gaspulse::{Runner, SamplerConfig};

const DEFAULT_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 800;
const DEFAULT_FAILURE_CEILING: u32 = 10;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_demo_tracing();

    let args = DemoArgs::from_env()?;
    let config = args.to_sampler_config()?;
    println!(
        "Watching fees at {} every {}ms (Ctrl-C to stop)",
        config.endpoint_url(),
        config.poll_interval().as_millis()
    );

    let mut runner = Runner::new(config)?;
    let run_result = runner.run_until_ctrl_c().await;

    let telemetry = runner.telemetry_snapshot();
    println!(
        "Published {} samples ({} fetch errors, {} timeouts, {} degraded transitions)",
        telemetry.published_samples,
        telemetry.fetch_errors,
        telemetry.fetch_timeouts,
        telemetry.degraded_transitions
    );

    run_result
}

fn init_demo_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    gaspulse::init_tracing();
}

struct DemoArgs {
    rpc_url: String,
    rpc_user: Option<String>,
    rpc_password: Option<String>,
    poll_interval_ms: u64,
    request_timeout_ms: u64,
    failure_ceiling: u32,
}

impl DemoArgs {
    fn from_env() -> Result<Self> {
        let rpc_url = read_env_or_default("GASPULSE_RPC_URL", DEFAULT_RPC_URL);
        let rpc_user = read_env_optional("GASPULSE_RPC_USER");
        let rpc_password = read_env_optional("GASPULSE_RPC_PASSWORD");
        let poll_interval_ms =
            parse_env_with_default::<u64>("GASPULSE_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let request_timeout_ms = parse_env_with_default::<u64>(
            "GASPULSE_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        )?;
        let failure_ceiling =
            parse_env_with_default::<u32>("GASPULSE_FAILURE_CEILING", DEFAULT_FAILURE_CEILING)?;

        Ok(Self {
            rpc_url,
            rpc_user,
            rpc_password,
            poll_interval_ms,
            request_timeout_ms,
            failure_ceiling,
        })
    }

    fn to_sampler_config(&self) -> Result<SamplerConfig> {
        let mut builder = SamplerConfig::builder()
            .endpoint_url(self.rpc_url.clone())
            .poll_interval(Duration::from_millis(self.poll_interval_ms))
            .request_timeout(Duration::from_millis(self.request_timeout_ms))
            .max_consecutive_failures(self.failure_ceiling);

        if let Some(user) = &self.rpc_user {
            builder = builder.rpc_user(user.clone());
        }
        if let Some(password) = &self.rpc_password {
            builder = builder.rpc_password(password.clone());
        }

        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn read_env_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
