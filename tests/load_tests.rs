use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use load_probe_rs::http::build_client;
use load_probe_rs::load::{run_burst, run_flood, run_load, FloodSettings, LoadSettings};
use load_probe_rs::types::{Target, TargetKind, Verdict};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Records when each request arrives and answers after a fixed delay.
#[derive(Clone)]
struct SlowRecorder {
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl SlowRecorder {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            arrivals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Most arrivals seen within any window shorter than the delay. Every
    /// request is still in flight for the whole window, so this is a lower
    /// bound on the peak in-flight count.
    fn peak_in_flight(&self) -> usize {
        let window = self.delay * 4 / 5;
        let mut arrivals = self.arrivals.lock().unwrap().clone();
        arrivals.sort();
        arrivals
            .iter()
            .map(|start| {
                arrivals
                    .iter()
                    .filter(|t| **t >= *start && **t - *start < window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }
}

impl Respond for SlowRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200).set_delay(self.delay)
    }
}

#[tokio::test]
async fn twenty_fast_successes_pass() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(20)
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let target =
        Target::new("mock", server.uri(), TargetKind::Api, "test").with_endpoints(["/posts"]);
    let r = run_load(&client, &target, target.primary_endpoint(), &LoadSettings::default())
        .await
        .unwrap();

    assert_eq!(r.requests_sent, 20);
    assert_eq!(r.success_count, 20);
    assert_eq!(r.failure_count, 0);
    assert_eq!(r.success_rate, 100.0);
    assert_eq!(r.latencies.len(), 20);
    assert!(r.mean_latency_ms < 500.0);
    assert!(r.throughput > 0.0);
    assert_eq!(r.verdict, Verdict::Passed);
}

#[tokio::test]
async fn fifteen_server_errors_of_twenty_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(15)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let r = run_burst(&client, &server.uri(), &LoadSettings::default()).await.unwrap();

    assert_eq!(r.requests_sent, 20);
    assert_eq!(r.success_count, 5);
    assert_eq!(r.failure_count, 15);
    assert_eq!(r.success_rate, 25.0);
    // Only successful responses are sampled in a burst.
    assert_eq!(r.latencies.len(), 5);
    assert_eq!(r.verdict, Verdict::Failed);
}

#[tokio::test]
async fn burst_keeps_at_most_concurrency_in_flight() {
    let server = MockServer::start().await;
    let recorder = SlowRecorder::new(Duration::from_millis(300));
    Mock::given(method("GET"))
        .respond_with(recorder.clone())
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let settings = LoadSettings {
        total_requests: 20,
        concurrency: 5,
        request_timeout_ms: 5_000,
    };
    let started = Instant::now();
    let r = run_burst(&client, &server.uri(), &settings).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(r.requests_sent, 20);
    assert_eq!(r.success_count, 20);
    // Four waves of five.
    assert!(elapsed >= Duration::from_millis(1_200), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    let peak = recorder.peak_in_flight();
    assert!((1..=5).contains(&peak), "peak in flight {peak}");
}

#[tokio::test]
async fn flood_queues_beyond_concurrency() {
    let server = MockServer::start().await;
    let recorder = SlowRecorder::new(Duration::from_millis(300));
    Mock::given(method("GET"))
        .respond_with(recorder.clone())
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let settings = FloodSettings {
        duration_secs: 1,
        concurrency: 2,
        rate_per_second: 6,
        request_timeout_ms: 5_000,
    };
    let started = Instant::now();
    let r = run_flood(&client, &server.uri(), &settings, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(r.requests_sent, 6);
    assert_eq!(r.success_count, 6);
    // Three waves of two, drained after submission stops.
    assert!(started.elapsed() >= Duration::from_millis(900));
    let peak = recorder.peak_in_flight();
    assert!((1..=2).contains(&peak), "peak in flight {peak}");
}

#[tokio::test]
async fn unreachable_target_has_no_samples() {
    let client = build_client().unwrap();
    let settings = LoadSettings {
        total_requests: 4,
        concurrency: 2,
        request_timeout_ms: 1_000,
    };
    let r = run_burst(&client, "http://127.0.0.1:1/", &settings).await.unwrap();

    assert_eq!(r.requests_sent, 4);
    assert_eq!(r.failure_count, 4);
    assert!(r.latencies.is_empty());
    assert_eq!(r.mean_latency_ms, 0.0);
    assert_eq!(r.throughput, 0.0);
    assert!(!r.errors.is_empty());
    assert_eq!(r.verdict, Verdict::Failed);
}

#[tokio::test]
async fn flood_submits_rate_per_second() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let settings = FloodSettings {
        duration_secs: 2,
        concurrency: 4,
        rate_per_second: 5,
        request_timeout_ms: 1_000,
    };
    let r = run_flood(&client, &server.uri(), &settings, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(r.requests_sent, 10);
    assert_eq!(r.success_count + r.failure_count, r.requests_sent);
    assert_eq!(r.success_rate, 100.0);
}

#[tokio::test]
async fn cancelled_flood_stops_early() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = build_client().unwrap();
    let settings = FloodSettings {
        duration_secs: 30,
        concurrency: 8,
        rate_per_second: 5,
        request_timeout_ms: 1_000,
    };
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        stopper.cancel();
    });

    let started = Instant::now();
    let r = run_flood(&client, &server.uri(), &settings, cancel).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(r.requests_sent > 0);
    assert!(r.requests_sent <= 10);
    assert_eq!(r.success_count + r.failure_count, r.requests_sent);
}
