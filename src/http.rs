//! Shared `reqwest` client construction.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::ProxyConfig;

const USER_AGENT: &str = concat!("hostbridge/", env!("CARGO_PKG_VERSION"));

/// Build the client every source uses for one invocation.
///
/// Configured proxies are applied on top of reqwest's own `HTTP_PROXY` /
/// `HTTPS_PROXY` environment handling.
pub fn build_client(proxies: &ProxyConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(120));

    if let Some(ref url) = proxies.http {
        let proxy = reqwest::Proxy::http(url)
            .with_context(|| format!("Invalid http_proxy: {}", url))?;
        builder = builder.proxy(proxy);
    }
    if let Some(ref url) = proxies.https {
        let proxy = reqwest::Proxy::https(url)
            .with_context(|| format!("Invalid https_proxy: {}", url))?;
        builder = builder.proxy(proxy);
    }

    builder.build().context("Failed to build HTTP client")
}
