use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What kind of service a target is.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Api,
    WebApp,
    Endpoint,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Api => "api",
            TargetKind::WebApp => "web_app",
            TargetKind::Endpoint => "endpoint",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetStatus::Unknown => "unknown",
            TargetStatus::Online => "online",
            TargetStatus::Offline => "offline",
        })
    }
}

/// A named HTTP service under test.
///
/// `status` and `latency_ms` start out unknown and are set exactly once by
/// [`crate::prober::probe_all`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub kind: TargetKind,
    /// Project that owns the service.
    pub project: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub status: TargetStatus,
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind: TargetKind,
        project: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind,
            project: project.into(),
            description: String::new(),
            endpoints: Vec::new(),
            status: TargetStatus::Unknown,
            latency_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// First registered endpoint, or `/` when none are listed.
    pub fn primary_endpoint(&self) -> &str {
        self.endpoints.first().map(String::as_str).unwrap_or("/")
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        join_url(&self.url, endpoint)
    }

    pub fn is_online(&self) -> bool {
        self.status == TargetStatus::Online
    }
}

/// Append an endpoint path to a base URL without doubling the slash.
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.is_empty() {
        return base.to_string();
    }
    if endpoint.starts_with('/') || endpoint.starts_with('?') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Pass/warning/fail classification of one load run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Warning,
    #[default]
    Failed,
}

impl Verdict {
    /// Thresholds are evaluated in order, first match wins.
    pub fn classify(success_rate: f64, mean_latency_ms: f64) -> Self {
        if success_rate >= 80.0 && mean_latency_ms < 1000.0 {
            Verdict::Passed
        } else if success_rate >= 50.0 && mean_latency_ms < 2000.0 {
            Verdict::Warning
        } else {
            Verdict::Failed
        }
    }

    /// Higher is more favorable.
    pub fn rank(self) -> u8 {
        match self {
            Verdict::Passed => 2,
            Verdict::Warning => 1,
            Verdict::Failed => 0,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Passed => "passed",
            Verdict::Warning => "warning",
            Verdict::Failed => "failed",
        })
    }
}

/// Aggregate outcome of a burst or flood against one URL.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LoadProbeResult {
    pub requests_sent: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Latencies of requests that received a response, in completion order.
    pub latencies: Vec<f64>,
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Requests per second.
    pub throughput: f64,
    pub success_rate: f64,
    /// Distinct transport error messages.
    pub errors: Vec<String>,
    pub verdict: Verdict,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

impl From<Verdict> for StepStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Passed => StepStatus::Passed,
            Verdict::Warning => StepStatus::Warning,
            Verdict::Failed => StepStatus::Failed,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepStatus::Passed => "passed",
            StepStatus::Warning => "warning",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        })
    }
}

/// External load-generation tools the invoker knows how to drive.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Locust,
    K6,
    Jmeter,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolKind::Locust => "Locust",
            ToolKind::K6 => "k6",
            ToolKind::Jmeter => "JMeter",
        })
    }
}

/// Result of one external tool invocation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolRun {
    pub tool: ToolKind,
    pub status: StepStatus,
    pub script_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
    /// Why the run was skipped.
    pub reason: Option<String>,
}

impl ToolRun {
    pub fn skipped(tool: ToolKind, reason: impl Into<String>) -> Self {
        Self {
            tool,
            status: StepStatus::Skipped,
            script_path: None,
            report_path: None,
            exit_code: None,
            output: String::new(),
            error: None,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(tool: ToolKind, error: impl Into<String>) -> Self {
        Self {
            tool,
            status: StepStatus::Failed,
            script_path: None,
            report_path: None,
            exit_code: None,
            output: String::new(),
            error: Some(error.into()),
            reason: None,
        }
    }
}

/// Payload of a recorded step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDetail {
    None,
    Load(LoadProbeResult),
    Tool(ToolRun),
}

/// One executed step of a run, as shown in the report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub title: String,
    pub action: String,
    pub tool: String,
    pub explanation: String,
    pub success_criteria: String,
    pub failure_criteria: String,
    pub status: StepStatus,
    pub detail: StepDetail,
    pub error: Option<String>,
    pub reason: Option<String>,
}

/// Per-target results of a performance run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TargetRun {
    pub target: String,
    pub url: String,
    pub endpoint: String,
    pub load: Option<LoadProbeResult>,
    pub tools: Vec<ToolRun>,
}

/// Step counts by status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub passed: u64,
    pub warning: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RunSummary {
    pub fn from_steps(steps: &[StepRecord]) -> Self {
        let mut s = RunSummary::default();
        for step in steps {
            match step.status {
                StepStatus::Passed => s.passed += 1,
                StepStatus::Warning => s.warning += 1,
                StepStatus::Failed => s.failed += 1,
                StepStatus::Skipped => s.skipped += 1,
            }
        }
        s
    }

    pub fn total(&self) -> u64 {
        self.passed + self.warning + self.failed + self.skipped
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    SqlInjection,
    Xss,
}

impl fmt::Display for AttackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttackKind::SqlInjection => "SQL Injection",
            AttackKind::Xss => "XSS",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        })
    }
}

/// One payload attempt against an `(endpoint, parameter)` pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttackResult {
    pub attack_kind: AttackKind,
    pub endpoint: String,
    pub parameter: String,
    pub payload: String,
    pub succeeded: bool,
    pub latency_ms: f64,
    pub evidence: Option<String>,
    pub severity: Option<Severity>,
    pub error: Option<String>,
    pub timestamp: String,
}

/// Baseline-vs-under-load comparison for one endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ComparisonRecord {
    pub baseline_success: bool,
    pub baseline_latency_ms: f64,
    pub total_attacks_under_load: u64,
    pub successful_attacks_under_load: u64,
    pub baseline_success_rate: f64,
    pub under_load_success_rate: f64,
    pub avg_attack_latency_ms: f64,
    pub load_avg_latency_ms: f64,
    pub system_stressed: bool,
    pub load_made_attacks_easier: bool,
}

/// Full outcome of the four hybrid phases for one endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HybridRecord {
    pub target_url: String,
    pub endpoint: String,
    pub parameter: String,
    pub baseline: Option<AttackResult>,
    pub flood: LoadProbeResult,
    pub attacks_under_load: Vec<AttackResult>,
    pub comparison: ComparisonRecord,
}

/// A service exercised by the hybrid comparator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HybridTarget {
    pub url: String,
    pub endpoints: Vec<String>,
    pub parameter: String,
}
