use std::sync::Arc;

use tokio::time::{self, Duration, Instant};
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::{ErrorCategory, WorkerFailure};
use crate::metrics::{
    REQUEST_DURATION_SECONDS, REQUEST_ERRORS_BY_CATEGORY, REQUEST_TOTAL, RESPONSE_BYTES_TOTAL,
};
use crate::report::{request_line, worker_average_line, LineSink};

/// Configuration for a worker task.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: usize,
    pub url: String,
    pub requests: usize,
    pub verbose: bool,
    pub request_timeout: Duration,
}

impl WorkerConfig {
    /// Worker `worker_id`'s view of the run configuration.
    pub fn from_config(config: &Config, worker_id: usize) -> Self {
        WorkerConfig {
            worker_id,
            url: config.target_url.clone(),
            requests: config.requests,
            verbose: config.verbose,
            request_timeout: config.request_timeout,
        }
    }
}

/// One timed request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestSample {
    pub worker_id: usize,
    pub index: usize,
    pub elapsed: Duration,
    pub bytes: u64,
}

/// What a worker hands back after all of its requests succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResult {
    pub worker_id: usize,
    /// Mean of `samples`, in seconds, unrounded.
    pub average_secs: f64,
    pub samples: Vec<Duration>,
    pub bytes: u64,
}

impl WorkerResult {
    /// Reduces a worker's samples. Returns None for an empty set, which has
    /// no defined mean.
    pub fn from_samples(worker_id: usize, samples: &[RequestSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().map(|s| s.elapsed).sum();
        Some(WorkerResult {
            worker_id,
            average_secs: total.as_secs_f64() / samples.len() as f64,
            samples: samples.iter().map(|s| s.elapsed).collect(),
            bytes: samples.iter().map(|s| s.bytes).sum(),
        })
    }
}

/// A completed exchange: body size, plus the body itself when verbose.
struct Fetched {
    bytes: u64,
    body: Option<Vec<u8>>,
}

enum FetchError {
    Status(u16),
    Transport(reqwest::Error),
}

/// Runs one worker: `config.requests` strictly sequential GETs.
///
/// The first failed request stops the worker; its earlier samples are
/// discarded so a partial average is never reported.
pub async fn run_worker(
    client: reqwest::Client,
    config: WorkerConfig,
    sink: Arc<dyn LineSink>,
) -> Result<WorkerResult, WorkerFailure> {
    debug!(
        worker_id = config.worker_id,
        url = %config.url,
        requests = config.requests,
        "Worker starting"
    );

    let mut samples = Vec::with_capacity(config.requests);

    for index in 0..config.requests {
        REQUEST_TOTAL.inc();

        let request_start_time = Instant::now();
        let outcome = time::timeout(
            config.request_timeout,
            fetch(&client, &config.url, config.verbose),
        )
        .await;
        let elapsed = request_start_time.elapsed();

        let fetched = match outcome {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(FetchError::Status(status))) => {
                return Err(record_failure(WorkerFailure::from_status(
                    config.worker_id,
                    index,
                    status,
                )))
            }
            Ok(Err(FetchError::Transport(e))) => {
                return Err(record_failure(WorkerFailure::from_reqwest(
                    config.worker_id,
                    index,
                    &e,
                )))
            }
            Err(_) => {
                return Err(record_failure(WorkerFailure::timed_out(
                    config.worker_id,
                    index,
                    config.request_timeout,
                )))
            }
        };

        REQUEST_DURATION_SECONDS.observe(elapsed.as_secs_f64());
        RESPONSE_BYTES_TOTAL.inc_by(fetched.bytes);

        // Printed outside the timed region.
        if let Some(body) = fetched.body {
            sink.emit(&String::from_utf8_lossy(&body));
        }

        let sample = RequestSample {
            worker_id: config.worker_id,
            index,
            elapsed,
            bytes: fetched.bytes,
        };
        debug!(
            worker_id = sample.worker_id,
            request = sample.index,
            elapsed_secs = sample.elapsed.as_secs_f64(),
            bytes = sample.bytes,
            "Request completed"
        );
        sink.emit(&request_line(
            sample.worker_id,
            sample.index,
            sample.elapsed.as_secs_f64(),
        ));
        samples.push(sample);
    }

    let result = WorkerResult::from_samples(config.worker_id, &samples).ok_or_else(|| {
        WorkerFailure {
            worker_id: config.worker_id,
            request_index: None,
            category: ErrorCategory::OtherError,
            status_code: None,
            message: "worker was configured with zero requests".to_string(),
        }
    })?;

    sink.emit(&worker_average_line(result.worker_id, result.average_secs));
    debug!(
        worker_id = result.worker_id,
        average_secs = result.average_secs,
        "Worker finished"
    );

    Ok(result)
}

fn record_failure(failure: WorkerFailure) -> WorkerFailure {
    REQUEST_ERRORS_BY_CATEGORY
        .with_label_values(&[failure.category.label()])
        .inc();
    error!(
        worker_id = failure.worker_id,
        request = ?failure.request_index,
        error_category = %failure.category.label(),
        error = %failure.message,
        "Request failed"
    );
    failure
}

/// Sends one GET and reads the whole body.
///
/// Without `keep_body` the body is streamed and dropped chunk by chunk so
/// large artifacts are never buffered.
async fn fetch(client: &reqwest::Client, url: &str, keep_body: bool) -> Result<Fetched, FetchError> {
    let mut response = client.get(url).send().await.map_err(FetchError::Transport)?;

    let status = response.status().as_u16();
    if ErrorCategory::from_status_code(status).is_some() {
        return Err(FetchError::Status(status));
    }

    let mut bytes = 0u64;
    let mut body = keep_body.then(Vec::<u8>::new);
    while let Some(chunk) = response.chunk().await.map_err(FetchError::Transport)? {
        bytes += chunk.len() as u64;
        if let Some(buf) = body.as_mut() {
            buf.extend_from_slice(&chunk);
        }
    }

    Ok(Fetched { bytes, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize, millis: u64) -> RequestSample {
        RequestSample {
            worker_id: 7,
            index,
            elapsed: Duration::from_millis(millis),
            bytes: 10,
        }
    }

    #[test]
    fn result_is_mean_of_samples() {
        let samples = vec![sample(0, 100), sample(1, 200), sample(2, 300)];
        let result = WorkerResult::from_samples(7, &samples).unwrap();
        assert_eq!(result.worker_id, 7);
        assert!((result.average_secs - 0.2).abs() < 1e-9);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.bytes, 30);
    }

    #[test]
    fn empty_samples_have_no_result() {
        assert!(WorkerResult::from_samples(0, &[]).is_none());
    }

    #[test]
    fn worker_config_copies_run_parameters() {
        let mut config = Config::new("http://localhost/x");
        config.requests = 5;
        config.verbose = true;
        let worker = WorkerConfig::from_config(&config, 3);
        assert_eq!(worker.worker_id, 3);
        assert_eq!(worker.url, "http://localhost/x");
        assert_eq!(worker.requests, 5);
        assert!(worker.verbose);
        assert_eq!(worker.request_timeout, config.request_timeout);
    }
}
