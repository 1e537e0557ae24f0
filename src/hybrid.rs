//! Attack-under-load comparator.
//!
//! One endpoint goes through four phases in order: baseline attack without
//! load, a measured flood, attacks while a second flood runs in the
//! background, and the comparison of the two attack outcomes.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::attack::{detect_sqli, detect_xss, Toolkit};
use crate::context::now_rfc3339;
use crate::error::Error;
use crate::http::send_timed;
use crate::load::{run_flood, FloodSettings};
use crate::types::{
    join_url, AttackKind, AttackResult, ComparisonRecord, HybridRecord, LoadProbeResult, Severity,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HybridSettings {
    /// Delay between starting the background flood and the first attack.
    pub warmup_ms: u64,
    /// Pause after each attack attempt.
    pub attack_pause_ms: u64,
    /// Payloads tried per attack kind under load.
    pub max_payloads: usize,
    pub attack_timeout_ms: u64,
    pub attack_kinds: Vec<AttackKind>,
    /// Directory with payload lists; embedded defaults when unset.
    pub toolkit_dir: Option<PathBuf>,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            warmup_ms: 2_000,
            attack_pause_ms: 500,
            max_payloads: 10,
            attack_timeout_ms: 5_000,
            attack_kinds: vec![AttackKind::SqlInjection, AttackKind::Xss],
            toolkit_dir: None,
        }
    }
}

impl HybridSettings {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn attack_pause(&self) -> Duration {
        Duration::from_millis(self.attack_pause_ms)
    }

    pub fn attack_timeout(&self) -> Duration {
        Duration::from_millis(self.attack_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Baseline,
    Flood,
    AttackUnderLoad,
    Comparison,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Baseline => "baseline attack (no load)",
            Phase::Flood => "load flood",
            Phase::AttackUnderLoad => "attacks under load",
            Phase::Comparison => "comparison",
        })
    }
}

pub struct Comparator {
    client: Client,
    base_url: String,
    toolkit: Toolkit,
    flood: FloodSettings,
    settings: HybridSettings,
    cancel: CancellationToken,
}

impl Comparator {
    /// Fails when the toolkit has nothing to send, before any phase runs.
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        toolkit: Toolkit,
        flood: FloodSettings,
        settings: HybridSettings,
    ) -> Result<Self, Error> {
        toolkit.ensure_available()?;
        if settings.attack_kinds.is_empty() {
            return Err(Error::config(
                "hybrid.attack_kinds",
                "at least one attack kind is required",
            ));
        }
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            toolkit,
            flood,
            settings,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling this token stops floods and the attack loop early.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run all four phases for one `(endpoint, parameter)` pair.
    pub async fn run(&self, endpoint: &str, parameter: &str) -> Result<HybridRecord> {
        info!(phase = %Phase::Baseline, %endpoint, %parameter);
        let baseline = self.baseline(endpoint, parameter).await;
        match &baseline {
            Some(b) => info!(
                kind = %b.attack_kind,
                evidence = ?b.evidence,
                "baseline attack succeeded"
            ),
            None => info!("baseline attack did not find vulnerabilities"),
        }

        info!(phase = %Phase::Flood, %endpoint);
        let flood = self.flood(endpoint).await?;
        if is_stressed(&flood) {
            warn!(%endpoint, "system appears stressed under load");
        }

        info!(phase = %Phase::AttackUnderLoad, %endpoint);
        let attacks_under_load = self.attack_under_load(endpoint, parameter).await?;

        info!(phase = %Phase::Comparison, %endpoint);
        let comparison = compare(baseline.as_ref(), &attacks_under_load, &flood);
        if comparison.load_made_attacks_easier {
            warn!(
                %endpoint,
                baseline_rate = comparison.baseline_success_rate,
                under_load_rate = comparison.under_load_success_rate,
                "attacks were more successful under load"
            );
        }

        Ok(HybridRecord {
            target_url: self.base_url.clone(),
            endpoint: endpoint.to_string(),
            parameter: parameter.to_string(),
            baseline,
            flood,
            attacks_under_load,
            comparison,
        })
    }

    /// Ask both testers for findings without load; the first one becomes the baseline.
    ///
    /// Tester errors are logged and treated as "nothing found".
    pub async fn baseline(&self, endpoint: &str, parameter: &str) -> Option<AttackResult> {
        let start = Instant::now();
        let mut findings = Vec::new();

        if self.attacks(AttackKind::SqlInjection) {
            match self.toolkit.sqli.test_get_parameter(endpoint, parameter).await {
                Ok(mut f) => findings.append(&mut f),
                Err(e) => warn!(%endpoint, error = %e, "baseline sqli tester failed"),
            }
        }
        if self.attacks(AttackKind::Xss) {
            match self.toolkit.xss.test_reflected_xss(endpoint, parameter).await {
                Ok(mut f) => findings.append(&mut f),
                Err(e) => warn!(%endpoint, error = %e, "baseline xss tester failed"),
            }
        }

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        findings.into_iter().next().map(|f| AttackResult {
            attack_kind: f.kind,
            endpoint: endpoint.to_string(),
            parameter: parameter.to_string(),
            payload: f.payload,
            succeeded: true,
            latency_ms,
            evidence: Some(f.evidence),
            severity: Some(f.severity),
            error: None,
            timestamp: now_rfc3339(),
        })
    }

    /// Measured flood against the endpoint.
    pub async fn flood(&self, endpoint: &str) -> Result<LoadProbeResult> {
        let url = join_url(&self.base_url, endpoint);
        run_flood(&self.client, &url, &self.flood, self.cancel.child_token()).await
    }

    /// Start a background flood, wait for the warm-up, then send payloads one by
    /// one until the lists or the flood duration run out.
    pub async fn attack_under_load(
        &self,
        endpoint: &str,
        parameter: &str,
    ) -> Result<Vec<AttackResult>> {
        let url = join_url(&self.base_url, endpoint);
        let flood_cancel = self.cancel.child_token();
        let background = {
            let client = self.client.clone();
            let url = url.clone();
            let settings = self.flood.clone();
            let token = flood_cancel.clone();
            tokio::spawn(async move { run_flood(&client, &url, &settings, token).await })
        };

        tokio::select! {
            _ = time::sleep(self.settings.warmup()) => {}
            _ = self.cancel.cancelled() => {}
        }

        let start = Instant::now();
        let budget = self.flood.duration();
        let mut results = Vec::new();

        'kinds: for kind in [AttackKind::SqlInjection, AttackKind::Xss] {
            if !self.attacks(kind) {
                continue;
            }
            let payloads = match kind {
                AttackKind::SqlInjection => self.toolkit.sqli.payloads(),
                AttackKind::Xss => self.toolkit.xss.payloads(),
            };
            for payload in payloads.iter().take(self.settings.max_payloads) {
                if start.elapsed() > budget || self.cancel.is_cancelled() {
                    debug!(%endpoint, "attack budget exhausted");
                    break 'kinds;
                }
                let result = self.attempt(kind, &url, endpoint, parameter, payload).await;
                if result.succeeded {
                    warn!(
                        kind = %kind,
                        %endpoint,
                        payload = %result.payload,
                        "exploit succeeded under load"
                    );
                }
                results.push(result);
                time::sleep(self.settings.attack_pause()).await;
            }
        }

        flood_cancel.cancel();
        match background.await {
            Ok(Ok(r)) => debug!(sent = r.requests_sent, "background flood stopped"),
            Ok(Err(e)) => warn!(error = %e, "background flood failed"),
            Err(e) => warn!(error = %e, "background flood task panicked"),
        }
        info!(
            attempts = results.len(),
            successes = results.iter().filter(|r| r.succeeded).count(),
            "attacks under load finished"
        );
        Ok(results)
    }

    async fn attempt(
        &self,
        kind: AttackKind,
        url: &str,
        endpoint: &str,
        parameter: &str,
        payload: &str,
    ) -> AttackResult {
        let timestamp = now_rfc3339();
        let request = self
            .client
            .get(url)
            .query(&[(parameter, payload)])
            .timeout(self.settings.attack_timeout());

        let mut result = AttackResult {
            attack_kind: kind,
            endpoint: endpoint.to_string(),
            parameter: parameter.to_string(),
            payload: payload.to_string(),
            succeeded: false,
            latency_ms: 0.0,
            evidence: None,
            severity: None,
            error: None,
            timestamp,
        };

        match send_timed(request).await {
            Ok(resp) => {
                result.latency_ms = resp.latency_ms;
                match kind {
                    AttackKind::SqlInjection => {
                        let patterns = self.toolkit.sqli.error_patterns();
                        if let Some(p) = detect_sqli(&resp.body, patterns) {
                            result.succeeded = true;
                            result.evidence = Some(format!("SQL error pattern: {p}"));
                            result.severity = Some(Severity::Critical);
                        }
                    }
                    AttackKind::Xss => {
                        if detect_xss(&resp.body, payload) {
                            result.succeeded = true;
                            result.evidence =
                                Some("Payload reflected without proper encoding".into());
                            result.severity = Some(Severity::High);
                        }
                    }
                }
            }
            Err(e) => result.error = Some(e.to_string()),
        }
        result
    }

    fn attacks(&self, kind: AttackKind) -> bool {
        self.settings.attack_kinds.contains(&kind)
    }
}

/// Mean latency above 2s, or more than 20% of requests failing.
pub fn is_stressed(load: &LoadProbeResult) -> bool {
    load.mean_latency_ms > 2000.0 || load.failure_count as f64 > load.requests_sent as f64 * 0.2
}

/// Any success under load counts as "load made attacks easier", whatever the
/// baseline outcome was.
pub fn compare(
    baseline: Option<&AttackResult>,
    under_load: &[AttackResult],
    load: &LoadProbeResult,
) -> ComparisonRecord {
    let baseline_success = baseline.is_some_and(|b| b.succeeded);
    let total = under_load.len() as u64;
    let successes = under_load.iter().filter(|a| a.succeeded).count() as u64;
    let under_load_success_rate = if total > 0 {
        successes as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let avg_attack_latency_ms = if total > 0 {
        under_load.iter().map(|a| a.latency_ms).sum::<f64>() / total as f64
    } else {
        0.0
    };

    ComparisonRecord {
        baseline_success,
        baseline_latency_ms: baseline.map(|b| b.latency_ms).unwrap_or(0.0),
        total_attacks_under_load: total,
        successful_attacks_under_load: successes,
        baseline_success_rate: if baseline_success { 100.0 } else { 0.0 },
        under_load_success_rate,
        avg_attack_latency_ms,
        load_avg_latency_ms: load.mean_latency_ms,
        system_stressed: is_stressed(load),
        load_made_attacks_easier: successes > 0,
    }
}
