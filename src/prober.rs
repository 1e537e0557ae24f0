use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::get_timed;
use crate::types::{Target, TargetStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeSettings {
    pub timeout_ms: u64,
    /// Pause after each probe so shared public endpoints are not hammered.
    pub courtesy_pause_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            courtesy_pause_ms: 200,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn courtesy_pause(&self) -> Duration {
        Duration::from_millis(self.courtesy_pause_ms)
    }
}

/// One GET against the target's base URL.
///
/// Online iff a response arrives with status below 500. Any transport error,
/// including the timeout, means offline with no latency.
pub async fn probe(client: &Client, target: &Target, timeout: Duration) -> (bool, Option<f64>) {
    match get_timed(client, &target.url, timeout).await {
        Ok(resp) if resp.status < 500 => {
            debug!(
                target = %target.name,
                status = resp.status,
                latency_ms = resp.latency_ms,
                "probe ok"
            );
            (true, Some(resp.latency_ms))
        }
        Ok(resp) => {
            debug!(target = %target.name, status = resp.status, "probe got server error");
            (false, None)
        }
        Err(e) => {
            debug!(target = %target.name, error = %e, "probe failed");
            (false, None)
        }
    }
}

/// Probe every target in order, recording status and latency on each.
pub async fn probe_all(client: &Client, targets: &mut [Target], settings: &ProbeSettings) {
    info!(count = targets.len(), "checking target availability");
    for target in targets.iter_mut() {
        let (online, latency) = probe(client, target, settings.timeout()).await;
        target.status = if online {
            TargetStatus::Online
        } else {
            TargetStatus::Offline
        };
        target.latency_ms = latency;
        info!(target = %target.name, status = %target.status, "probed");
        tokio::time::sleep(settings.courtesy_pause()).await;
    }
}
