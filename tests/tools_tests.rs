use std::time::Duration;

use load_probe_rs::tools::{run_process, ProcessOutcome, ToolInvoker, ToolSettings};
use load_probe_rs::types::{StepStatus, ToolKind};
use tokio::process::Command;

fn settings_with(python: &str, docker: &str) -> ToolSettings {
    ToolSettings {
        python_bin: python.into(),
        docker_bin: docker.into(),
        timeout_secs: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn missing_docker_skips_k6_with_reason() {
    let dir = tempfile::tempdir().unwrap();
    let invoker = ToolInvoker::new(settings_with("python3", "no-such-docker-bin"), dir.path());
    let run = invoker
        .invoke(ToolKind::K6, "Juice Shop", "http://localhost:3000", "/rest/products/search")
        .await;

    assert_eq!(run.status, StepStatus::Skipped);
    let reason = run.reason.unwrap();
    assert!(reason.contains("no-such-docker-bin"), "{reason}");
    assert!(reason.contains("k6"), "{reason}");
    // The script is still materialised.
    let script = dir.path().join("k6_test_Juice_Shop.js");
    assert!(script.is_file());
    assert!(std::fs::read_to_string(script).unwrap().contains("/rest/products/search"));
}

#[tokio::test]
async fn missing_python_skips_locust() {
    let dir = tempfile::tempdir().unwrap();
    let invoker = ToolInvoker::new(settings_with("no-such-python-bin", "docker"), dir.path());
    let run = invoker.invoke(ToolKind::Locust, "api", "http://127.0.0.1:9", "/").await;

    assert_eq!(run.status, StepStatus::Skipped);
    assert!(run.reason.unwrap().contains("no-such-python-bin"));
    assert!(dir.path().join("locustfile_api.py").is_file());
    assert_eq!(run.report_path, None);
}

#[tokio::test]
async fn exit_status_decides_pass_or_fail() {
    let dir = tempfile::tempdir().unwrap();

    let ok = ToolInvoker::new(settings_with("python3", "true"), dir.path());
    let run = ok.invoke(ToolKind::K6, "svc", "http://127.0.0.1:9", "/").await;
    assert_eq!(run.status, StepStatus::Passed);
    assert_eq!(run.exit_code, Some(0));

    let bad = ToolInvoker::new(settings_with("python3", "false"), dir.path());
    let run = bad.invoke(ToolKind::Jmeter, "svc", "http://127.0.0.1:9", "/").await;
    assert_eq!(run.status, StepStatus::Failed);
    assert_eq!(run.exit_code, Some(1));
    assert!(run.error.is_some());
    assert!(dir.path().join("jmeter_plan_svc.jmx").is_file());
}

#[tokio::test]
async fn slow_process_is_killed_on_timeout() {
    let started = std::time::Instant::now();
    let outcome = run_process(Command::new("sleep").arg("5"), Duration::from_millis(200)).await;
    assert!(matches!(outcome, ProcessOutcome::TimedOut));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn captures_stdout() {
    let outcome = run_process(Command::new("echo").arg("hello"), Duration::from_secs(5)).await;
    match outcome {
        ProcessOutcome::Exited { code, stdout, .. } => {
            assert_eq!(code, Some(0));
            assert_eq!(stdout.trim(), "hello");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
