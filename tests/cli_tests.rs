//! End-to-end tests of the `thor` binary: usage handling, exit codes and
//! the stdout stream a sweep script consumes.

use std::net::TcpListener;
use std::process::Output;
use tokio::process::Command;
use tokio::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use thor::report::{parse_request_line, parse_summary_line, parse_worker_average_line};

async fn thor(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_thor"))
        .args(args)
        .env_remove("THOR_REQUEST_TIMEOUT")
        .env_remove("RUST_LOG")
        .output()
        .await
        .expect("failed to run thor binary")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn help_prints_usage_and_succeeds() {
    let output = thor(&["-h"]).await;
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Usage: thor"));
    assert!(stdout.contains("-p  PROCESSES"));
}

#[tokio::test]
async fn missing_url_is_a_usage_error() {
    let output = thor(&[]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: thor"));
}

#[tokio::test]
async fn unknown_flag_is_a_usage_error() {
    let output = thor(&["-z", "http://localhost/"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage: thor"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_run_prints_contract_lines() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(10)))
        .mount(&server)
        .await;
    let url = format!("{}/index.html", server.uri());

    let output = thor(&["-p", "2", "-r", "3", url.as_str()]).await;
    assert_eq!(output.status.code(), Some(0));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 2 * 3 + 2 + 1, "stdout: {:?}", lines);
    assert_eq!(lines.iter().filter_map(|l| parse_request_line(l)).count(), 6);
    assert_eq!(
        lines
            .iter()
            .filter_map(|l| parse_worker_average_line(l))
            .count(),
        2
    );
    assert!(parse_summary_line(lines.last().unwrap()).is_some());
}

#[tokio::test]
async fn refused_target_reports_failure_not_a_number() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let url = format!("http://127.0.0.1:{}/", port);

    let output = thor(&["-p", "2", "-r", "2", url.as_str()]).await;
    assert_eq!(output.status.code(), Some(2));

    let lines = stdout_lines(&output);
    assert_eq!(lines.iter().filter(|l| l.contains("FAILED    ")).count(), 2);
    let last = lines.last().unwrap();
    assert!(last.starts_with("TOTAL AVERAGE ELAPSED TIME: FAILED"));
    assert!(!last.contains("NaN"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("worker 0"));
    assert!(stderr.contains("worker 1"));
}
