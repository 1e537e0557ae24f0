use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::http::get_timed;
use crate::types::{LoadProbeResult, Target, Verdict};

const MAX_CONCURRENCY: usize = 5_000;

/// Burst parameters: a fixed number of requests over a fixed-size pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoadSettings {
    pub total_requests: usize,
    pub concurrency: usize,
    pub request_timeout_ms: u64,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            total_requests: 20,
            concurrency: 5,
            request_timeout_ms: 10_000,
        }
    }
}

impl LoadSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Flood parameters: `rate_per_second` submissions every second for `duration_secs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FloodSettings {
    pub duration_secs: u64,
    pub concurrency: usize,
    pub rate_per_second: usize,
    pub request_timeout_ms: u64,
}

impl Default for FloodSettings {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            concurrency: 50,
            rate_per_second: 10,
            request_timeout_ms: 5_000,
        }
    }
}

impl FloodSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// What a single worker observed.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// A response arrived.
    Completed { status: u16, latency_ms: f64 },
    /// Timeout, connection failure, or a crashed worker. No latency sample.
    Errored(String),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Completed { status, .. } if *status < 400)
    }
}

/// How latency samples are collected and turned into a throughput figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThroughputBasis {
    /// Burst: only successful responses are sampled. Throughput is the sample
    /// count divided by the slowest sample, in seconds.
    PeakLatency,
    /// Flood: every response is sampled, whatever its status. Throughput is
    /// the sample count divided by the elapsed wall-clock time.
    WallClock(Duration),
}

impl ThroughputBasis {
    fn samples(&self, outcome: &RequestOutcome) -> bool {
        match self {
            ThroughputBasis::PeakLatency => outcome.is_success(),
            ThroughputBasis::WallClock(_) => true,
        }
    }
}

/// Reduce per-worker outcomes into one result. Latency aggregates only cover
/// the outcomes `basis` samples.
pub fn summarize(outcomes: &[RequestOutcome], basis: ThroughputBasis) -> LoadProbeResult {
    let requests_sent = outcomes.len() as u64;
    let success_count = outcomes.iter().filter(|o| o.is_success()).count() as u64;
    let failure_count = requests_sent - success_count;

    let mut latencies = Vec::with_capacity(outcomes.len());
    let mut errors: Vec<String> = Vec::new();
    for outcome in outcomes {
        match outcome {
            RequestOutcome::Completed { latency_ms, .. } => {
                if basis.samples(outcome) {
                    latencies.push(*latency_ms);
                }
            }
            RequestOutcome::Errored(e) => {
                if !errors.iter().any(|seen| seen == e) {
                    errors.push(e.clone());
                }
            }
        }
    }

    let (mean, min, max) = if latencies.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = latencies.iter().sum();
        let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
        let max = latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (sum / latencies.len() as f64, min, max)
    };

    let samples = latencies.len() as f64;
    let throughput = match basis {
        ThroughputBasis::PeakLatency if max > 0.0 => samples / (max / 1000.0),
        ThroughputBasis::WallClock(elapsed) if elapsed.as_secs_f64() > 0.0 => {
            samples / elapsed.as_secs_f64()
        }
        _ => 0.0,
    };

    let success_rate = if requests_sent > 0 {
        success_count as f64 / requests_sent as f64 * 100.0
    } else {
        0.0
    };

    LoadProbeResult {
        requests_sent,
        success_count,
        failure_count,
        latencies,
        mean_latency_ms: mean,
        min_latency_ms: min,
        max_latency_ms: max,
        throughput,
        success_rate,
        errors,
        verdict: Verdict::classify(success_rate, mean),
    }
}

/// Burst `settings.total_requests` GETs at `target.url + endpoint`.
pub async fn run_load(
    client: &Client,
    target: &Target,
    endpoint: &str,
    settings: &LoadSettings,
) -> Result<LoadProbeResult> {
    run_burst(client, &target.endpoint_url(endpoint), settings).await
}

/// Dispatch a fixed batch of GETs with at most `concurrency` in flight.
///
/// Outcomes are collected as they complete and reduced once the pool drains.
pub async fn run_burst(
    client: &Client,
    url: &str,
    settings: &LoadSettings,
) -> Result<LoadProbeResult> {
    let concurrency = settings.concurrency.clamp(1, MAX_CONCURRENCY);
    let timeout = settings.request_timeout();
    info!(%url, requests = settings.total_requests, concurrency, "starting burst");

    let sem = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();

    for _ in 0..settings.total_requests {
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        let client = client.clone();
        let url = url.to_string();
        set.spawn(async move {
            let _permit = permit; // keep permit until the request completes
            fire(&client, &url, timeout).await
        });
    }

    let mut outcomes = Vec::with_capacity(settings.total_requests);
    while let Some(joined) = set.join_next().await {
        outcomes.push(
            joined.unwrap_or_else(|e| RequestOutcome::Errored(format!("worker task failed: {e}"))),
        );
    }

    let result = summarize(&outcomes, ThroughputBasis::PeakLatency);
    info!(
        %url,
        success = result.success_count,
        failure = result.failure_count,
        mean_ms = result.mean_latency_ms,
        verdict = %result.verdict,
        "burst finished"
    );
    Ok(result)
}

/// Submit `rate_per_second` requests every wall-clock second until the
/// duration elapses or `cancel` fires, then wait for everything in flight.
///
/// Submission never blocks on the pool: queued requests wait for a permit
/// inside their own task. Requests still queued when `cancel` fires are dropped
/// and do not count as sent.
pub async fn run_flood(
    client: &Client,
    url: &str,
    settings: &FloodSettings,
    cancel: CancellationToken,
) -> Result<LoadProbeResult> {
    let concurrency = settings.concurrency.clamp(1, MAX_CONCURRENCY);
    let duration = settings.duration();
    let timeout = settings.request_timeout();
    info!(
        %url,
        concurrency,
        rate = settings.rate_per_second,
        duration_secs = settings.duration_secs,
        "starting flood"
    );

    let sem = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();
    let start = Instant::now();
    let mut ticker = time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while start.elapsed() < duration && !cancel.is_cancelled() {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        for _ in 0..settings.rate_per_second {
            if start.elapsed() >= duration {
                break;
            }
            let sem = sem.clone();
            let client = client.clone();
            let url = url.to_string();
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        return Some(RequestOutcome::Errored(format!("worker pool closed: {e}")))
                    }
                };
                if cancel.is_cancelled() {
                    return None;
                }
                Some(fire(&client, &url, timeout).await)
            });
        }
    }
    debug!(%url, queued = set.len(), "flood submission stopped, draining");

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(e) => outcomes.push(RequestOutcome::Errored(format!("worker task failed: {e}"))),
        }
    }

    let result = summarize(&outcomes, ThroughputBasis::WallClock(start.elapsed()));
    info!(
        %url,
        sent = result.requests_sent,
        success = result.success_count,
        throughput = result.throughput,
        "flood finished"
    );
    Ok(result)
}

async fn fire(client: &Client, url: &str, timeout: Duration) -> RequestOutcome {
    match get_timed(client, url, timeout).await {
        Ok(resp) => RequestOutcome::Completed {
            status: resp.status,
            latency_ms: resp.latency_ms,
        },
        Err(e) => RequestOutcome::Errored(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(latency_ms: f64) -> RequestOutcome {
        RequestOutcome::Completed {
            status: 200,
            latency_ms,
        }
    }

    #[test]
    fn all_successes_pass() {
        let outcomes: Vec<_> = (0..20).map(|i| ok(100.0 + i as f64)).collect();
        let r = summarize(&outcomes, ThroughputBasis::PeakLatency);
        assert_eq!(r.requests_sent, 20);
        assert_eq!(r.success_count, 20);
        assert_eq!(r.success_rate, 100.0);
        assert_eq!(r.min_latency_ms, 100.0);
        assert_eq!(r.max_latency_ms, 119.0);
        assert!((r.mean_latency_ms - 109.5).abs() < 1e-9);
        assert_eq!(r.verdict, Verdict::Passed);
    }

    #[test]
    fn errors_count_as_failures_without_samples() {
        let outcomes = vec![
            ok(200.0),
            RequestOutcome::Errored("timed out".into()),
            RequestOutcome::Errored("timed out".into()),
            RequestOutcome::Completed {
                status: 503,
                latency_ms: 400.0,
            },
        ];
        let r = summarize(&outcomes, ThroughputBasis::PeakLatency);
        assert_eq!(r.success_count + r.failure_count, r.requests_sent);
        assert_eq!(r.failure_count, 3);
        assert_eq!(r.latencies, vec![200.0]);
        assert_eq!(r.errors, vec!["timed out".to_string()]);
        assert_eq!(r.success_rate, 25.0);
        assert_eq!(r.verdict, Verdict::Failed);
    }

    #[test]
    fn slow_error_responses_do_not_skew_burst_verdict() {
        let mut outcomes = vec![ok(10.0); 16];
        outcomes.extend(
            std::iter::repeat(RequestOutcome::Completed {
                status: 500,
                latency_ms: 5_000.0,
            })
            .take(4),
        );
        let r = summarize(&outcomes, ThroughputBasis::PeakLatency);
        assert_eq!(r.success_rate, 80.0);
        assert_eq!(r.latencies.len(), 16);
        assert_eq!(r.mean_latency_ms, 10.0);
        assert_eq!(r.max_latency_ms, 10.0);
        assert!((r.throughput - 1_600.0).abs() < 1e-9);
        assert_eq!(r.verdict, Verdict::Passed);
    }

    #[test]
    fn flood_samples_every_response() {
        let outcomes = vec![
            ok(10.0),
            RequestOutcome::Completed {
                status: 503,
                latency_ms: 3_000.0,
            },
            RequestOutcome::Errored("timed out".into()),
        ];
        let r = summarize(&outcomes, ThroughputBasis::WallClock(Duration::from_secs(1)));
        assert_eq!(r.latencies, vec![10.0, 3_000.0]);
        assert_eq!(r.max_latency_ms, 3_000.0);
        assert_eq!(r.failure_count, 2);
    }

    #[test]
    fn throughput_uses_peak_latency() {
        // 4 samples, slowest 500ms -> 8 req/s
        let outcomes = vec![ok(100.0), ok(500.0), ok(250.0), ok(300.0)];
        let r = summarize(&outcomes, ThroughputBasis::PeakLatency);
        assert!((r.throughput - 8.0).abs() < 1e-9);
    }

    #[test]
    fn throughput_uses_wall_clock_for_floods() {
        let outcomes = vec![ok(10.0); 30];
        let r = summarize(&outcomes, ThroughputBasis::WallClock(Duration::from_secs(3)));
        assert!((r.throughput - 10.0).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_is_failed_with_zeroed_stats() {
        let r = summarize(&[], ThroughputBasis::PeakLatency);
        assert_eq!(r.requests_sent, 0);
        assert_eq!(r.success_rate, 0.0);
        assert_eq!(r.throughput, 0.0);
        assert_eq!(r.verdict, Verdict::Failed);
    }

    #[test]
    fn redirect_statuses_are_successes() {
        assert!(RequestOutcome::Completed { status: 302, latency_ms: 1.0 }.is_success());
        assert!(!RequestOutcome::Completed { status: 404, latency_ms: 1.0 }.is_success());
        assert!(!RequestOutcome::Errored("x".into()).is_success());
    }
}
