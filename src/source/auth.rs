//! HTTP authentication helpers for wiring optional node credentials into
//! the underlying `jsonrpsee` client builder. Public gateways embed their
//! key in the endpoint URL; private nodes commonly expect Basic auth.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

pub(crate) fn build_auth_headers(credentials: Option<(&str, &str)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some((user, password)) = credentials {
        let encoded = BASE64_STANDARD.encode(format!("{user}:{password}"));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_credentials_yields_empty_headers() {
        let headers = build_auth_headers(None).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn credentials_yield_basic_header() {
        let headers = build_auth_headers(Some(("user", "pass"))).unwrap();
        let value = headers.get("Authorization").expect("header must be set");
        assert_eq!(value.to_str().unwrap(), "Basic dXNlcjpwYXNz");
    }
}
