//! Static HTML reports.
//!
//! Rendering is pure: the header timestamp is the only time-dependent text and
//! is supplied by the caller, so identical input yields identical output.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::types::{
    AttackResult, HybridRecord, LoadProbeResult, RunSummary, StepDetail, StepRecord, StepStatus,
    Target, TargetRun, ToolRun,
};

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub generated_at: String,
    pub targets: Vec<Target>,
    pub steps: Vec<StepRecord>,
    pub runs: Vec<TargetRun>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct HybridReport {
    pub generated_at: String,
    pub records: Vec<HybridRecord>,
}

const STYLE: &str = r#"<style>
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2em; color: #222; }
h1 { border-bottom: 2px solid #444; padding-bottom: .3em; }
table { border-collapse: collapse; margin: 1em 0; width: 100%; }
th, td { border: 1px solid #ccc; padding: 6px 10px; text-align: left; vertical-align: top; }
th { background: #f2f2f2; }
.passed { color: #1a7f37; font-weight: bold; }
.warning { color: #9a6700; font-weight: bold; }
.failed { color: #cf222e; font-weight: bold; }
.skipped { color: #6e7781; font-weight: bold; }
.step { border: 1px solid #ddd; border-radius: 6px; padding: 1em; margin: 1em 0; }
.banner { background: #fff8c5; border: 1px solid #d4a72c; padding: 1em; }
pre { background: #f6f8fa; padding: 1em; overflow-x: auto; font-size: 12px; }
</style>"#;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn fmt_ms(v: Option<f64>) -> String {
    match v {
        Some(ms) => format!("{ms:.2} ms"),
        None => "N/A".to_string(),
    }
}

pub fn fmt_pct(v: f64) -> String {
    format!("{v:.1}%")
}

fn status_class(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Passed => "passed",
        StepStatus::Warning => "warning",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
    }
}

fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

fn open_document(out: &mut String, title: &str, generated_at: &str) {
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n{STYLE}\n</head>\n<body>\n<h1>{title}</h1>\n<p>Generated: {ts}</p>\n",
        title = escape_html(title),
        ts = escape_html(generated_at),
    );
}

fn close_document(out: &mut String) {
    out.push_str("</body>\n</html>\n");
}

pub fn render_performance_report(report: &PerformanceReport) -> String {
    let mut out = String::new();
    open_document(&mut out, "Cross-Repository Performance Report", &report.generated_at);

    let s = &report.summary;
    let _ = write!(
        out,
        "<h2>Summary</h2>\n<table>\n<tr><th>Total steps</th><th>Passed</th><th>Warning</th><th>Failed</th><th>Skipped</th></tr>\n<tr><td>{}</td><td class=\"passed\">{}</td><td class=\"warning\">{}</td><td class=\"failed\">{}</td><td class=\"skipped\">{}</td></tr>\n</table>\n",
        s.total(),
        s.passed,
        s.warning,
        s.failed,
        s.skipped
    );

    out.push_str("<h2>Targets</h2>\n<table>\n<tr><th>Name</th><th>Project</th><th>Kind</th><th>URL</th><th>Status</th><th>Latency</th></tr>\n");
    for t in &report.targets {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&t.name),
            escape_html(&t.project),
            t.kind,
            escape_html(&t.url),
            t.status,
            fmt_ms(t.latency_ms),
        );
    }
    out.push_str("</table>\n");

    if !report.runs.is_empty() {
        out.push_str("<h2>Load Results</h2>\n<table>\n<tr><th>Target</th><th>Endpoint</th><th>Requests</th><th>Success rate</th><th>Mean</th><th>Min</th><th>Max</th><th>Throughput</th><th>Verdict</th><th>Tools</th></tr>\n");
        for run in &report.runs {
            render_run_row(&mut out, run);
        }
        out.push_str("</table>\n");
    }

    out.push_str("<h2>Steps</h2>\n");
    for (i, step) in report.steps.iter().enumerate() {
        render_step(&mut out, i + 1, step);
    }

    close_document(&mut out);
    out
}

fn render_run_row(out: &mut String, run: &TargetRun) {
    let tools = run
        .tools
        .iter()
        .map(|t| format!("{}: {}", t.tool, t.status))
        .collect::<Vec<_>>()
        .join(", ");
    match &run.load {
        Some(l) => {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.2} req/s</td><td class=\"{}\">{}</td><td>{}</td></tr>",
                escape_html(&run.target),
                escape_html(&run.endpoint),
                l.requests_sent,
                fmt_pct(l.success_rate),
                fmt_ms(Some(l.mean_latency_ms)),
                fmt_ms(Some(l.min_latency_ms)),
                fmt_ms(Some(l.max_latency_ms)),
                l.throughput,
                l.verdict,
                l.verdict,
                escape_html(&tools),
            );
        }
        None => {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td colspan=\"7\">no load data</td><td>{}</td></tr>",
                escape_html(&run.target),
                escape_html(&run.endpoint),
                escape_html(&tools),
            );
        }
    }
}

fn render_step(out: &mut String, n: usize, step: &StepRecord) {
    let class = status_class(step.status);
    let _ = write!(
        out,
        "<div class=\"step\">\n<h3>Step {n}: {title}</h3>\n<p><span class=\"{class}\">{status}</span> &middot; {tool}</p>\n<p><strong>Action:</strong> {action}</p>\n<p>{explanation}</p>\n<p><strong>Success when:</strong> {ok}<br><strong>Failure when:</strong> {fail}</p>\n",
        title = escape_html(&step.title),
        status = step.status.to_string().to_uppercase(),
        tool = escape_html(&step.tool),
        action = escape_html(&step.action),
        explanation = escape_html(&step.explanation),
        ok = escape_html(&step.success_criteria),
        fail = escape_html(&step.failure_criteria),
    );
    if let Some(reason) = &step.reason {
        let _ = writeln!(out, "<p><strong>Reason:</strong> {}</p>", escape_html(reason));
    }
    if let Some(err) = &step.error {
        let _ = writeln!(out, "<p class=\"failed\">Error: {}</p>", escape_html(err));
    }
    match &step.detail {
        StepDetail::None => {}
        StepDetail::Load(l) => render_load_detail(out, l),
        StepDetail::Tool(t) => render_tool_detail(out, t),
    }
    out.push_str("</div>\n");
}

fn render_load_detail(out: &mut String, l: &LoadProbeResult) {
    let _ = writeln!(
        out,
        "<p>{} requests, {} ok, {} failed ({}), mean {}, throughput {:.2} req/s</p>",
        l.requests_sent,
        l.success_count,
        l.failure_count,
        fmt_pct(l.success_rate),
        fmt_ms(Some(l.mean_latency_ms)),
        l.throughput,
    );
    let _ = writeln!(out, "<pre>{}</pre>", escape_html(&pretty_json(l)));
}

fn render_tool_detail(out: &mut String, t: &ToolRun) {
    if let Some(p) = &t.script_path {
        let _ = writeln!(
            out,
            "<p>Script: <code>{}</code></p>",
            escape_html(&p.display().to_string())
        );
    }
    if let Some(p) = &t.report_path {
        let _ = writeln!(
            out,
            "<p>Tool report: <code>{}</code></p>",
            escape_html(&p.display().to_string())
        );
    }
    if !t.output.trim().is_empty() {
        let _ = writeln!(out, "<pre>{}</pre>", escape_html(t.output.trim()));
    }
}

pub fn render_hybrid_report(report: &HybridReport) -> String {
    let mut out = String::new();
    open_document(&mut out, "Hybrid Attack-Under-Load Report", &report.generated_at);
    out.push_str("<div class=\"banner\"><strong>Authorized testing only.</strong> These results come from deliberately vulnerable services run under the operator's control.</div>\n");

    out.push_str("<h2>Comparison</h2>\n<table>\n<tr><th>Target</th><th>Endpoint</th><th>Baseline</th><th>Under-load successes</th><th>Under-load rate</th><th>Avg attack latency</th><th>Load avg latency</th><th>Stressed</th><th>Load made attacks easier</th></tr>\n");
    for r in &report.records {
        let c = &r.comparison;
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>",
            escape_html(&r.target_url),
            escape_html(&r.endpoint),
            if c.baseline_success { "vulnerable" } else { "no finding" },
            c.successful_attacks_under_load,
            c.total_attacks_under_load,
            fmt_pct(c.under_load_success_rate),
            fmt_ms(Some(c.avg_attack_latency_ms)),
            fmt_ms(Some(c.load_avg_latency_ms)),
            if c.system_stressed { "yes" } else { "no" },
            if c.load_made_attacks_easier { "failed" } else { "passed" },
            if c.load_made_attacks_easier { "yes" } else { "no" },
        );
    }
    out.push_str("</table>\n");

    for r in &report.records {
        let _ = writeln!(
            out,
            "<h2>{} {} (parameter <code>{}</code>)</h2>",
            escape_html(&r.target_url),
            escape_html(&r.endpoint),
            escape_html(&r.parameter),
        );
        out.push_str("<h3>Baseline</h3>\n");
        match &r.baseline {
            Some(b) => render_attack_table(&mut out, std::slice::from_ref(b)),
            None => out.push_str("<p>No finding without load.</p>\n"),
        }
        out.push_str("<h3>Flood</h3>\n");
        render_load_detail(&mut out, &r.flood);
        out.push_str("<h3>Attacks under load</h3>\n");
        if r.attacks_under_load.is_empty() {
            out.push_str("<p>No attacks were sent.</p>\n");
        } else {
            render_attack_table(&mut out, &r.attacks_under_load);
        }
    }

    close_document(&mut out);
    out
}

fn render_attack_table(out: &mut String, attacks: &[AttackResult]) {
    out.push_str("<table>\n<tr><th>Kind</th><th>Payload</th><th>Result</th><th>Latency</th><th>Severity</th><th>Evidence</th><th>Time</th></tr>\n");
    for a in attacks {
        let result = match (&a.error, a.succeeded) {
            (Some(e), _) => format!("error: {e}"),
            (None, true) => "success".to_string(),
            (None, false) => "blocked".to_string(),
        };
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            a.attack_kind,
            escape_html(&a.payload),
            escape_html(&result),
            fmt_ms(Some(a.latency_ms)),
            a.severity.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            escape_html(a.evidence.as_deref().unwrap_or("-")),
            escape_html(&a.timestamp),
        );
    }
    out.push_str("</table>\n");
}

/// Write rendered HTML into `dir/file_name`.
pub fn write_report(dir: &Path, file_name: &str, html: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, html)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(path)
}
