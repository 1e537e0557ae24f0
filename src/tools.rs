//! External tool invoker: writes a one-off script for Locust, k6 or JMeter into
//! the results directory, runs the tool as a child process with a hard
//! timeout, and maps the outcome to passed/failed/skipped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time;
use tracing::{debug, info, warn};

use crate::types::{StepStatus, ToolKind, ToolRun};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolSettings {
    /// Tools run against each online target, in order.
    pub enabled: Vec<ToolKind>,
    pub python_bin: String,
    pub docker_bin: String,
    pub timeout_secs: u64,
    pub k6_image: String,
    pub jmeter_image: String,
    pub locust_users: u32,
    pub locust_spawn_rate: u32,
    pub locust_run_time: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: vec![ToolKind::Locust, ToolKind::K6],
            python_bin: "python3".into(),
            docker_bin: "docker".into(),
            timeout_secs: 60,
            k6_image: "grafana/k6:latest".into(),
            jmeter_image: "justb4/jmeter:latest".into(),
            locust_users: 10,
            locust_spawn_rate: 2,
            locust_run_time: "30s".into(),
        }
    }
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Replace the Locust user count, spawn rate and run time where given.
    pub fn override_locust(
        &mut self,
        users: Option<u32>,
        spawn_rate: Option<u32>,
        run_time: Option<String>,
    ) {
        if let Some(n) = users {
            self.locust_users = n;
        }
        if let Some(n) = spawn_rate {
            self.locust_spawn_rate = n;
        }
        if let Some(t) = run_time {
            self.locust_run_time = t;
        }
    }
}

/// How a child process ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    Exited {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The program is not on PATH.
    NotFound,
    /// Killed after the timeout.
    TimedOut,
    SpawnFailed(String),
}

/// Spawn `cmd`, capture stdout/stderr, and kill it if it outlives `limit`.
pub async fn run_process(cmd: &mut Command, limit: Duration) -> ProcessOutcome {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ProcessOutcome::NotFound,
        Err(e) => return ProcessOutcome::SpawnFailed(e.to_string()),
    };

    // Dropping the child on timeout kills it.
    match time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => ProcessOutcome::Exited {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        Ok(Err(e)) => ProcessOutcome::SpawnFailed(e.to_string()),
        Err(_) => ProcessOutcome::TimedOut,
    }
}

/// File-name-safe form of a target name.
pub fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Minimal Locust user hitting one endpoint with a 1–2 s think time.
pub fn locust_script(endpoint: &str) -> String {
    let endpoint = py_str(endpoint);
    format!(
        r#"from locust import HttpUser, task, between


class QuickTestUser(HttpUser):
    wait_time = between(1, 2)

    @task
    def test_endpoint(self):
        self.client.get({endpoint}, name={endpoint})
"#
    )
}

/// k6 script: ramp to 5 VUs over 10s, hold 20s, ramp down 10s.
pub fn k6_script(base_url: &str, endpoint: &str) -> String {
    let base = js_str(base_url);
    let endpoint = js_str(endpoint);
    format!(
        r#"import http from 'k6/http';
import {{ check, sleep }} from 'k6';

export const options = {{
  stages: [
    {{ duration: '10s', target: 5 }},
    {{ duration: '20s', target: 5 }},
    {{ duration: '10s', target: 0 }},
  ],
  thresholds: {{
    http_req_duration: ['p(95)<2000'],
    http_req_failed: ['rate<0.1'],
  }},
}};

const BASE_URL = __ENV.BASE_URL || {base};
const ENDPOINT = {endpoint};

export default function () {{
  const response = http.get(`${{BASE_URL}}${{ENDPOINT}}`);
  check(response, {{
    'status is 200': (r) => r.status === 200,
    'response time < 2000ms': (r) => r.timings.duration < 2000,
  }});
  sleep(1);
}}
"#
    )
}

/// JMeter plan with one thread group (5 threads, 10 loops) and one GET sampler.
pub fn jmeter_plan(base_url: &str, endpoint: &str) -> Result<String> {
    let url = Url::parse(base_url).with_context(|| format!("invalid base url: {base_url}"))?;
    let host = url.host_str().context("base url has no host")?;
    let port = url
        .port_or_known_default()
        .map(|p| p.to_string())
        .unwrap_or_default();
    let path = crate::types::join_url(url.path(), endpoint);
    let path = if path.is_empty() { "/".to_string() } else { path };

    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<jmeterTestPlan version="1.2" properties="5.0" jmeter="5.6">
  <hashTree>
    <TestPlan guiclass="TestPlanGui" testclass="TestPlan" testname="load-probe plan" enabled="true">
      <elementProp name="TestPlan.user_defined_variables" elementType="Arguments">
        <collectionProp name="Arguments.arguments"/>
      </elementProp>
    </TestPlan>
    <hashTree>
      <ThreadGroup guiclass="ThreadGroupGui" testclass="ThreadGroup" testname="Users" enabled="true">
        <stringProp name="ThreadGroup.on_sample_error">continue</stringProp>
        <elementProp name="ThreadGroup.main_controller" elementType="LoopController">
          <boolProp name="LoopController.continue_forever">false</boolProp>
          <stringProp name="LoopController.loops">10</stringProp>
        </elementProp>
        <stringProp name="ThreadGroup.num_threads">5</stringProp>
        <stringProp name="ThreadGroup.ramp_time">10</stringProp>
      </ThreadGroup>
      <hashTree>
        <HTTPSamplerProxy guiclass="HttpTestSampleGui" testclass="HTTPSamplerProxy" testname="GET {name}" enabled="true">
          <stringProp name="HTTPSampler.domain">{host}</stringProp>
          <stringProp name="HTTPSampler.port">{port}</stringProp>
          <stringProp name="HTTPSampler.protocol">{scheme}</stringProp>
          <stringProp name="HTTPSampler.path">{path}</stringProp>
          <stringProp name="HTTPSampler.method">GET</stringProp>
          <boolProp name="HTTPSampler.follow_redirects">true</boolProp>
        </HTTPSamplerProxy>
        <hashTree/>
      </hashTree>
    </hashTree>
  </hashTree>
</jmeterTestPlan>
"#,
        name = xml_escape(endpoint),
        host = xml_escape(host),
        port = port,
        scheme = url.scheme(),
        path = xml_escape(&path),
    ))
}

/// Drives external tools for one run. Artifacts land in `results_dir`.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    settings: ToolSettings,
    results_dir: PathBuf,
}

impl ToolInvoker {
    pub fn new(settings: ToolSettings, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            results_dir: results_dir.into(),
        }
    }

    /// One attempt of `tool` against `base_url + endpoint`. Never returns an
    /// error: every problem becomes a failed or skipped run.
    pub async fn invoke(
        &self,
        tool: ToolKind,
        name: &str,
        base_url: &str,
        endpoint: &str,
    ) -> ToolRun {
        info!(%tool, target = %name, %endpoint, "invoking external tool");
        let run = match tool {
            ToolKind::Locust => self.run_locust(name, base_url, endpoint).await,
            ToolKind::K6 => self.run_k6(name, base_url, endpoint).await,
            ToolKind::Jmeter => self.run_jmeter(name, base_url, endpoint).await,
        };
        match run {
            Ok(r) => {
                info!(%tool, target = %name, status = %r.status, "tool finished");
                r
            }
            Err(e) => {
                warn!(%tool, target = %name, error = %e, "tool invocation failed");
                ToolRun::failed(tool, format!("{e:#}"))
            }
        }
    }

    async fn run_locust(&self, name: &str, base_url: &str, endpoint: &str) -> Result<ToolRun> {
        let slug = slug(name);
        let script = self.results_dir.join(format!("locustfile_{slug}.py"));
        let report = self.results_dir.join(format!("locust_report_{slug}.html"));
        let csv_prefix = self.results_dir.join(format!("locust_results_{slug}"));
        write_script(&script, &locust_script(endpoint)).await?;

        let s = &self.settings;
        let mut cmd = Command::new(&s.python_bin);
        cmd.args(["-m", "locust", "-f"])
            .arg(&script)
            .args(["--host", base_url])
            .arg("--users")
            .arg(s.locust_users.to_string())
            .arg("--spawn-rate")
            .arg(s.locust_spawn_rate.to_string())
            .arg("--run-time")
            .arg(&s.locust_run_time)
            .arg("--headless")
            .arg("--html")
            .arg(&report)
            .arg("--csv")
            .arg(&csv_prefix);

        let outcome = run_process(&mut cmd, s.timeout()).await;
        let mut run = self.map_outcome(ToolKind::Locust, &s.python_bin, outcome);
        if run.status == StepStatus::Failed
            && run
                .error
                .as_deref()
                .is_some_and(|e| e.contains("No module named locust"))
        {
            run = ToolRun::skipped(
                ToolKind::Locust,
                format!("Locust not installed ({} -m locust unavailable)", s.python_bin),
            );
        }
        run.script_path = Some(script);
        if run.status == StepStatus::Passed {
            run.report_path = Some(report);
        }
        Ok(run)
    }

    async fn run_k6(&self, name: &str, base_url: &str, endpoint: &str) -> Result<ToolRun> {
        let file_name = format!("k6_test_{}.js", slug(name));
        let script = self.results_dir.join(&file_name);
        write_script(&script, &k6_script(base_url, endpoint)).await?;

        let mount = format!("{}:/scripts", self.absolute_results_dir().await?.display());
        let s = &self.settings;
        let mut cmd = Command::new(&s.docker_bin);
        cmd.args(["run", "--rm", "-i", "-v"])
            .arg(mount)
            .arg("-e")
            .arg(format!("BASE_URL={base_url}"))
            .arg(&s.k6_image)
            .arg("run")
            .arg(format!("/scripts/{file_name}"));

        let outcome = run_process(&mut cmd, s.timeout()).await;
        let mut run = self.map_outcome(ToolKind::K6, &s.docker_bin, outcome);
        run.script_path = Some(script);
        Ok(run)
    }

    async fn run_jmeter(&self, name: &str, base_url: &str, endpoint: &str) -> Result<ToolRun> {
        let slug = slug(name);
        let plan_name = format!("jmeter_plan_{slug}.jmx");
        let jtl_name = format!("jmeter_results_{slug}.jtl");
        let html_dir = format!("jmeter_report_{slug}");
        let plan = self.results_dir.join(&plan_name);
        write_script(&plan, &jmeter_plan(base_url, endpoint)?).await?;

        let mount = format!("{}:/scripts", self.absolute_results_dir().await?.display());
        let s = &self.settings;
        let mut cmd = Command::new(&s.docker_bin);
        cmd.args(["run", "--rm", "-i", "-v"])
            .arg(mount)
            .arg(&s.jmeter_image)
            .args(["-n", "-t"])
            .arg(format!("/scripts/{plan_name}"))
            .arg("-l")
            .arg(format!("/scripts/{jtl_name}"))
            .args(["-e", "-o"])
            .arg(format!("/scripts/{html_dir}"));

        let outcome = run_process(&mut cmd, s.timeout()).await;
        let mut run = self.map_outcome(ToolKind::Jmeter, &s.docker_bin, outcome);
        run.script_path = Some(plan);
        if run.status == StepStatus::Passed {
            run.report_path = Some(self.results_dir.join(html_dir).join("index.html"));
        }
        Ok(run)
    }

    fn map_outcome(&self, tool: ToolKind, program: &str, outcome: ProcessOutcome) -> ToolRun {
        match outcome {
            ProcessOutcome::Exited {
                code: Some(0),
                stdout,
                ..
            } => ToolRun {
                tool,
                status: StepStatus::Passed,
                script_path: None,
                report_path: None,
                exit_code: Some(0),
                output: stdout,
                error: None,
                reason: None,
            },
            ProcessOutcome::Exited {
                code,
                stdout,
                stderr,
            } => {
                debug!(%tool, ?code, "tool exited unsuccessfully");
                ToolRun {
                    tool,
                    status: StepStatus::Failed,
                    script_path: None,
                    report_path: None,
                    exit_code: code,
                    output: stdout,
                    error: Some(if stderr.trim().is_empty() {
                        format!("{program} exited with status {code:?}")
                    } else {
                        stderr
                    }),
                    reason: None,
                }
            }
            ProcessOutcome::NotFound => ToolRun::skipped(
                tool,
                format!("{program} not found on PATH; {program} is required to run {tool}"),
            ),
            ProcessOutcome::TimedOut => ToolRun::failed(
                tool,
                format!("{tool} timed out after {}s and was killed", self.settings.timeout_secs),
            ),
            ProcessOutcome::SpawnFailed(e) => {
                ToolRun::failed(tool, format!("failed to run {program}: {e}"))
            }
        }
    }

    async fn absolute_results_dir(&self) -> Result<PathBuf> {
        tokio::fs::canonicalize(&self.results_dir)
            .await
            .with_context(|| format!("failed to resolve {}", self.results_dir.display()))
    }
}

async fn write_script(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "script written");
    Ok(())
}

fn py_str(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn js_str(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
