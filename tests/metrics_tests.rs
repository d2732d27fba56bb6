//! Prometheus counters are process-global, so every test here is serialized.

use serial_test::serial;
use std::net::TcpListener;
use std::sync::{Arc, Once};
use tokio::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use thor::config::Config;
use thor::dispatcher::run;
use thor::metrics::{
    gather_metrics_string, register_metrics, REQUEST_DURATION_SECONDS,
    REQUEST_ERRORS_BY_CATEGORY, REQUEST_TOTAL, RESPONSE_BYTES_TOTAL, WORKERS_FAILED_TOTAL,
};
use thor::report::CaptureSink;

// Registering twice would fail with a duplicate registration error.
static INIT_METRICS: Once = Once::new();

fn init_metrics() {
    INIT_METRICS.call_once(|| {
        register_metrics().expect("Failed to register metrics");
    });
}

fn config(url: String, processes: usize, requests: usize) -> Config {
    let mut config = Config::new(url);
    config.processes = processes;
    config.requests = requests;
    config.request_timeout = Duration::from_secs(5);
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn successful_requests_are_counted() {
    init_metrics();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("12345"))
        .mount(&server)
        .await;

    let requests_before = REQUEST_TOTAL.get();
    let durations_before = REQUEST_DURATION_SECONDS.get_sample_count();
    let bytes_before = RESPONSE_BYTES_TOTAL.get();

    let config = config(server.uri(), 3, 2);
    run(reqwest::Client::new(), &config, Arc::new(CaptureSink::new()))
        .await
        .unwrap();

    assert_eq!(REQUEST_TOTAL.get() - requests_before, 6);
    assert_eq!(REQUEST_DURATION_SECONDS.get_sample_count() - durations_before, 6);
    assert_eq!(RESPONSE_BYTES_TOTAL.get() - bytes_before, 30);

    let text = gather_metrics_string();
    assert!(text.contains("thor_requests_total"));
    assert!(text.contains("thor_request_duration_seconds"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn failures_are_counted_by_category() {
    init_metrics();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let network_before = REQUEST_ERRORS_BY_CATEGORY
        .with_label_values(&["network_error"])
        .get();
    let workers_before = WORKERS_FAILED_TOTAL.get();

    let config = config(format!("http://127.0.0.1:{}/", port), 2, 5);
    let result = run(reqwest::Client::new(), &config, Arc::new(CaptureSink::new())).await;
    assert!(result.is_err());

    // each worker stops at its first failed request
    let network_after = REQUEST_ERRORS_BY_CATEGORY
        .with_label_values(&["network_error"])
        .get();
    assert_eq!(network_after - network_before, 2);
    assert_eq!(WORKERS_FAILED_TOTAL.get() - workers_before, 2);
}
