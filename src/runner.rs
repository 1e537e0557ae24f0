//! Cross-target performance run: registry, availability, then load probe and
//! external tools per online target, then the HTML report.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attack::builtin_toolkit;
use crate::config::Config;
use crate::context::RunContext;
use crate::hybrid::Comparator;
use crate::load::run_load;
use crate::prober::probe_all;
use crate::registry::load_targets;
use crate::report::{
    render_hybrid_report, render_performance_report, write_report, HybridReport, PerformanceReport,
};
use crate::tools::ToolInvoker;
use crate::types::{
    HybridRecord, LoadProbeResult, StepDetail, StepRecord, StepStatus, Target, TargetRun, ToolKind,
    ToolRun,
};

pub const PERFORMANCE_REPORT_FILE: &str = "performance_report.html";
pub const HYBRID_REPORT_FILE: &str = "hybrid_attack_load_report.html";

/// Execute a full performance run inside `ctx`. Step failures are recorded, not
/// returned; only setup and report I/O errors abort the run.
pub async fn run_performance(
    client: &Client,
    config: &Config,
    ctx: &mut RunContext,
    cancel: &CancellationToken,
) -> Result<PerformanceReport> {
    let mut targets = load_targets(&config.targets)?;
    probe_all(client, &mut targets, &config.probe).await;

    let online: Vec<Target> = targets
        .iter()
        .filter(|t| t.is_online())
        .take(config.max_targets)
        .cloned()
        .collect();
    info!(
        online = targets.iter().filter(|t| t.is_online()).count(),
        selected = online.len(),
        "targets selected for testing"
    );
    if online.is_empty() {
        warn!("no online targets; the report will only list availability");
    }

    let invoker = ToolInvoker::new(config.tools.clone(), ctx.run_dir());
    let mut runs = Vec::with_capacity(online.len());

    for target in &online {
        if cancel.is_cancelled() {
            warn!("run cancelled, skipping remaining targets");
            break;
        }
        let endpoint = target.primary_endpoint().to_string();
        info!(target = %target.name, %endpoint, "testing target");

        let load = match run_load(client, target, &endpoint, &config.load).await {
            Ok(result) => {
                ctx.record(load_step(target, &endpoint, config, Ok(&result)));
                Some(result)
            }
            Err(e) => {
                ctx.record(load_step(target, &endpoint, config, Err(&e)));
                None
            }
        };

        let mut tools = Vec::new();
        for &tool in &config.tools.enabled {
            if cancel.is_cancelled() {
                break;
            }
            let run = invoker.invoke(tool, &target.name, &target.url, &endpoint).await;
            ctx.record(tool_step(target, &endpoint, &run));
            tools.push(run);
        }

        runs.push(TargetRun {
            target: target.name.clone(),
            url: target.url.clone(),
            endpoint,
            load,
            tools,
        });
    }

    let report = PerformanceReport {
        generated_at: ctx.generated_at(),
        targets,
        steps: ctx.steps().to_vec(),
        runs,
        summary: ctx.summary(),
    };
    let html = render_performance_report(&report);
    write_report(ctx.run_dir(), PERFORMANCE_REPORT_FILE, &html)?;
    ctx.write_summary().context("failed to write run summary")?;
    Ok(report)
}

/// Run the comparator over every configured hybrid endpoint.
///
/// All toolkits are built before the first phase starts, so an unavailable
/// toolkit aborts the run without sending anything.
pub async fn run_hybrid(
    client: &Client,
    config: &Config,
    ctx: &mut RunContext,
    cancel: &CancellationToken,
) -> Result<HybridReport> {
    let targets = config.hybrid_targets();
    let mut comparators = Vec::with_capacity(targets.len());
    for target in &targets {
        let toolkit = builtin_toolkit(
            client,
            &target.url,
            config.hybrid.toolkit_dir.as_deref(),
            config.hybrid.attack_timeout(),
        )?;
        let comparator = Comparator::new(
            client.clone(),
            target.url.clone(),
            toolkit,
            config.flood.clone(),
            config.hybrid.clone(),
        )?
        .with_cancel(cancel.clone());
        comparators.push((target, comparator));
    }

    let mut records = Vec::new();
    'targets: for (target, comparator) in &comparators {
        for endpoint in &target.endpoints {
            if cancel.is_cancelled() {
                warn!("hybrid run cancelled");
                break 'targets;
            }
            info!(url = %target.url, %endpoint, parameter = %target.parameter, "hybrid test");
            match comparator.run(endpoint, &target.parameter).await {
                Ok(record) => {
                    ctx.record(hybrid_step(&record));
                    records.push(record);
                }
                Err(e) => {
                    warn!(url = %target.url, %endpoint, error = %e, "hybrid test failed");
                    let mut step = hybrid_step_base(&target.url, endpoint);
                    step.error = Some(format!("{e:#}"));
                    ctx.record(step);
                }
            }
        }
    }

    let report = HybridReport {
        generated_at: ctx.generated_at(),
        records,
    };
    write_report(ctx.run_dir(), HYBRID_REPORT_FILE, &render_hybrid_report(&report))?;
    ctx.write_summary().context("failed to write run summary")?;
    Ok(report)
}

fn hybrid_step_base(url: &str, endpoint: &str) -> StepRecord {
    StepRecord {
        title: format!("Attack under load: {url}{endpoint}"),
        action: "Baseline attack, flood, attacks during a background flood, comparison".into(),
        tool: "built-in attack toolkit".into(),
        explanation: "Checks whether injection payloads succeed more often while the service \
             is saturated."
            .into(),
        success_criteria: "No payload succeeds while the service is under load".into(),
        failure_criteria: "At least one payload succeeds under load".into(),
        status: StepStatus::Failed,
        detail: StepDetail::None,
        error: None,
        reason: None,
    }
}

fn hybrid_step(record: &HybridRecord) -> StepRecord {
    let mut step = hybrid_step_base(&record.target_url, &record.endpoint);
    step.status = if record.comparison.load_made_attacks_easier {
        StepStatus::Failed
    } else if record.comparison.system_stressed {
        StepStatus::Warning
    } else {
        StepStatus::Passed
    };
    step.detail = StepDetail::Load(record.flood.clone());
    step
}

fn load_step(
    target: &Target,
    endpoint: &str,
    config: &Config,
    outcome: std::result::Result<&LoadProbeResult, &anyhow::Error>,
) -> StepRecord {
    let settings = &config.load;
    let mut step = StepRecord {
        title: format!("Load probe: {}", target.name),
        action: format!(
            "Send {} GET requests to {} with {} concurrent workers",
            settings.total_requests,
            target.endpoint_url(endpoint),
            settings.concurrency
        ),
        tool: "built-in HTTP load probe".into(),
        explanation: "Measures response time and error rate under light concurrent load.".into(),
        success_criteria: "At least 80% successful responses with mean latency below 1000 ms"
            .into(),
        failure_criteria: "Below 50% successful responses or mean latency of 2000 ms or more"
            .into(),
        status: StepStatus::Failed,
        detail: StepDetail::None,
        error: None,
        reason: None,
    };
    match outcome {
        Ok(result) => {
            step.status = result.verdict.into();
            step.detail = StepDetail::Load(result.clone());
        }
        Err(e) => step.error = Some(format!("{e:#}")),
    }
    step
}

fn tool_step(target: &Target, endpoint: &str, run: &ToolRun) -> StepRecord {
    let (explanation, success) = match run.tool {
        ToolKind::Locust => (
            "Simulates users with think time between requests and records an HTML report.",
            "Locust exits with status 0",
        ),
        ToolKind::K6 => (
            "Ramps virtual users up and down and checks latency and error thresholds.",
            "p(95) latency below 2000 ms and fewer than 10% failed requests",
        ),
        ToolKind::Jmeter => (
            "Runs a fixed thread group plan and produces a JMeter dashboard.",
            "JMeter exits with status 0",
        ),
    };
    StepRecord {
        title: format!("{} test: {}", run.tool, target.name),
        action: format!("Run {} against {}", run.tool, target.endpoint_url(endpoint)),
        tool: run.tool.to_string(),
        explanation: explanation.into(),
        success_criteria: success.into(),
        failure_criteria: "Nonzero exit status or timeout".into(),
        status: run.status,
        detail: StepDetail::Tool(run.clone()),
        error: run.error.clone(),
        reason: run.reason.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TargetKind, Verdict};

    fn target() -> Target {
        Target::new("HTTPBin API", "https://httpbin.org", TargetKind::Api, "automation")
    }

    #[test]
    fn load_step_takes_verdict_status() {
        let result = LoadProbeResult {
            verdict: Verdict::Warning,
            ..Default::default()
        };
        let step = load_step(&target(), "/get", &Config::default(), Ok(&result));
        assert_eq!(step.status, StepStatus::Warning);
        assert!(step.action.contains("https://httpbin.org/get"));
        assert!(matches!(step.detail, StepDetail::Load(_)));
    }

    #[test]
    fn skipped_tool_keeps_reason() {
        let run = ToolRun::skipped(ToolKind::K6, "docker not found on PATH");
        let step = tool_step(&target(), "/get", &run);
        assert_eq!(step.status, StepStatus::Skipped);
        assert_eq!(step.reason.as_deref(), Some("docker not found on PATH"));
        assert_eq!(step.tool, "k6");
    }
}
