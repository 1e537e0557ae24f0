use std::time::{Duration, Instant};

use load_probe_rs::http::build_client;
use load_probe_rs::prober::{probe, probe_all, ProbeSettings};
use load_probe_rs::types::{Target, TargetKind, TargetStatus};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server_with(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

fn target(url: impl Into<String>) -> Target {
    Target::new("t", url, TargetKind::Endpoint, "test")
}

#[tokio::test]
async fn ok_and_client_errors_are_online() {
    let client = build_client().unwrap();
    for status in [200, 404] {
        let server = server_with(status).await;
        let (online, latency) = probe(&client, &target(server.uri()), Duration::from_secs(5)).await;
        assert!(online, "status {status}");
        assert!(latency.is_some());
    }
}

#[tokio::test]
async fn server_error_is_offline() {
    let server = server_with(503).await;
    let client = build_client().unwrap();
    let (online, latency) = probe(&client, &target(server.uri()), Duration::from_secs(5)).await;
    assert!(!online);
    assert_eq!(latency, None);
}

#[tokio::test]
async fn refused_connection_is_offline() {
    let client = build_client().unwrap();
    let (online, latency) =
        probe(&client, &target("http://127.0.0.1:1"), Duration::from_secs(2)).await;
    assert!(!online);
    assert_eq!(latency, None);
}

#[tokio::test]
async fn probe_respects_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let started = Instant::now();
    let (online, _) = probe(&client, &target(server.uri()), Duration::from_millis(500)).await;
    assert!(!online);
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[tokio::test]
async fn probe_all_sets_status_once() {
    let up = server_with(200).await;
    let client = build_client().unwrap();
    let mut targets = vec![
        Target::new("up", up.uri(), TargetKind::Api, "test"),
        Target::new("down", "http://127.0.0.1:1", TargetKind::Api, "test"),
    ];
    let settings = ProbeSettings {
        timeout_ms: 2_000,
        courtesy_pause_ms: 0,
    };
    probe_all(&client, &mut targets, &settings).await;

    assert_eq!(targets[0].status, TargetStatus::Online);
    assert!(targets[0].latency_ms.is_some());
    assert_eq!(targets[1].status, TargetStatus::Offline);
    assert_eq!(targets[1].latency_ms, None);
}
