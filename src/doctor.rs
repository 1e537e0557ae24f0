//! Environment checks for the external tools.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{run_process, ProcessOutcome, ToolSettings};

const CHECK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn new(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok,
            detail: detail.into(),
        }
    }
}

/// Run every check. Later checks run even if earlier ones fail.
pub async fn run_checks(settings: &ToolSettings, results_dir: &Path) -> Vec<Check> {
    let mut checks = Vec::new();

    let docker = check_command(
        "docker",
        Command::new(&settings.docker_bin).arg("--version"),
    )
    .await;
    let docker_ok = docker.ok;
    checks.push(docker);

    for image in [&settings.k6_image, &settings.jmeter_image] {
        if docker_ok {
            checks.push(check_image(&settings.docker_bin, image).await);
        } else {
            checks.push(Check::new(format!("image {image}"), false, "docker unavailable"));
        }
    }

    checks.push(
        check_command(
            "locust",
            Command::new(&settings.python_bin).args(["-m", "locust", "--version"]),
        )
        .await,
    );

    checks.push(check_results_dir(results_dir));
    checks
}

async fn check_command(name: &str, cmd: &mut Command) -> Check {
    match run_process(cmd, CHECK_TIMEOUT).await {
        ProcessOutcome::Exited {
            code: Some(0),
            stdout,
            stderr,
        } => {
            // Some tools print their version on stderr.
            let text = if stdout.trim().is_empty() { stderr } else { stdout };
            Check::new(name, true, first_line(&text))
        }
        ProcessOutcome::Exited { code, stderr, .. } => Check::new(
            name,
            false,
            format!("exit status {code:?}: {}", first_line(&stderr)),
        ),
        ProcessOutcome::NotFound => Check::new(name, false, "not found on PATH"),
        ProcessOutcome::TimedOut => Check::new(name, false, "timed out"),
        ProcessOutcome::SpawnFailed(e) => Check::new(name, false, e),
    }
}

async fn check_image(docker_bin: &str, image: &str) -> Check {
    let name = format!("image {image}");
    match run_process(Command::new(docker_bin).args(["images", "-q", image]), CHECK_TIMEOUT).await {
        ProcessOutcome::Exited {
            code: Some(0),
            stdout,
            ..
        } if !stdout.trim().is_empty() => Check::new(name, true, "present"),
        ProcessOutcome::Exited { code: Some(0), .. } => {
            Check::new(name, false, format!("not pulled; run `docker pull {image}`"))
        }
        other => {
            debug!(?other, %image, "image check failed");
            Check::new(name, false, "could not query docker images")
        }
    }
}

fn check_results_dir(dir: &Path) -> Check {
    let name = "results directory";
    let probe = dir.join(".write_test");
    let outcome = std::fs::create_dir_all(dir)
        .and_then(|_| std::fs::write(&probe, b"ok"))
        .and_then(|_| std::fs::remove_file(&probe));
    match outcome {
        Ok(()) => Check::new(name, true, format!("{} is writable", dir.display())),
        Err(e) => Check::new(name, false, format!("{}: {e}", dir.display())),
    }
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binaries_fail_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ToolSettings {
            docker_bin: "definitely-not-docker-xyz".into(),
            python_bin: "definitely-not-python-xyz".into(),
            ..Default::default()
        };
        let checks = run_checks(&settings, dir.path()).await;
        assert_eq!(checks.len(), 5);
        assert!(!checks[0].ok);
        assert_eq!(checks[0].detail, "not found on PATH");
        assert_eq!(checks[1].detail, "docker unavailable");
        assert!(!checks[3].ok);
        assert!(checks[4].ok);
    }

    #[test]
    fn first_line_trims() {
        assert_eq!(first_line("Docker version 24.0\nmore"), "Docker version 24.0");
        assert_eq!(first_line(""), "");
    }
}
