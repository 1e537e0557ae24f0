use load_probe_rs::config::Config;
use load_probe_rs::context::RunContext;
use load_probe_rs::http::build_client;
use load_probe_rs::runner::{run_performance, PERFORMANCE_REPORT_FILE};
use load_probe_rs::types::{StepStatus, Target, TargetKind, ToolKind, Verdict};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(targets: Vec<Target>) -> Config {
    let mut config = Config::default();
    config.targets = targets;
    config.probe.courtesy_pause_ms = 0;
    config.tools.python_bin = "no-such-python-bin".into();
    config.tools.docker_bin = "no-such-docker-bin".into();
    config.tools.enabled = vec![ToolKind::Locust, ToolKind::K6];
    config
}

#[tokio::test]
async fn run_with_missing_tools_still_writes_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = config_for(vec![
        Target::new("Mock API", server.uri(), TargetKind::Api, "test").with_endpoints(["/health"]),
        Target::new("Down API", "http://127.0.0.1:1", TargetKind::Api, "test"),
    ]);
    let root = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::create(root.path(), "run").unwrap();
    let client = build_client().unwrap();

    let report = run_performance(&client, &config, &mut ctx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.runs.len(), 1);
    let run = &report.runs[0];
    assert_eq!(run.endpoint, "/health");
    assert_eq!(run.load.as_ref().unwrap().verdict, Verdict::Passed);
    assert!(run.tools.iter().all(|t| t.status == StepStatus::Skipped));

    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.skipped, 2);

    let html = std::fs::read_to_string(ctx.path(PERFORMANCE_REPORT_FILE)).unwrap();
    assert!(html.contains("Mock API"));
    assert!(html.contains("no-such-docker-bin not found on PATH"));
    assert!(ctx.path("summary.json").is_file());
}

#[tokio::test]
async fn max_targets_limits_exercised_targets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = config_for(
        (0..3)
            .map(|i| Target::new(format!("svc{i}"), server.uri(), TargetKind::Endpoint, "test"))
            .collect(),
    );
    config.max_targets = 2;
    config.tools.enabled.clear();

    let root = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::create(root.path(), "run").unwrap();
    let client = build_client().unwrap();
    let report = run_performance(&client, &config, &mut ctx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.targets.len(), 3);
    assert_eq!(report.runs.len(), 2);
    assert_eq!(report.runs[0].target, "svc0");
}

#[tokio::test]
async fn cancelled_run_skips_targets_but_reports() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = config_for(vec![Target::new("svc", server.uri(), TargetKind::Api, "test")]);
    let root = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::create(root.path(), "run").unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run_performance(&build_client().unwrap(), &config, &mut ctx, &cancel)
        .await
        .unwrap();
    assert!(report.runs.is_empty());
    assert_eq!(report.summary.total(), 0);
    assert!(ctx.path(PERFORMANCE_REPORT_FILE).is_file());
}
