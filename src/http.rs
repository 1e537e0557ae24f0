use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use tokio::time::Instant;

/// A response that was fully received, with its wall-clock latency.
#[derive(Debug, Clone)]
pub struct TimedResponse {
    pub status: u16,
    pub latency_ms: f64,
    pub body: String,
}

/// Shared client for probes, bursts, floods and attacks. Redirects are followed
/// (reqwest's default policy); timeouts are set per request.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("load-probe-rs/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Send a request and read the whole body. Latency covers headers and body.
pub async fn send_timed(request: RequestBuilder) -> Result<TimedResponse, reqwest::Error> {
    let start = Instant::now();
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(TimedResponse {
        status,
        latency_ms,
        body,
    })
}

pub async fn get_timed(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<TimedResponse, reqwest::Error> {
    send_timed(client.get(url).timeout(timeout)).await
}
