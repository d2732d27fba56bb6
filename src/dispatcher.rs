//! Fans a run out to parallel workers and reduces their results.
//!
//! Workers share nothing but the read-only configuration and the HTTP
//! client handle. Each returns its own result; the reduction happens once,
//! on the dispatcher, after every worker has finished.

use std::fmt;
use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{RunError, WorkerFailure};
use crate::metrics::WORKERS_FAILED_TOTAL;
use crate::percentiles::{PercentileStats, PercentileTracker};
use crate::report::{
    aggregation_failed_line, failed_workers_line, summary_line, worker_failure_line, LineSink,
};
use crate::worker::{run_worker, WorkerConfig, WorkerResult};

/// Result of one worker, as seen by the dispatcher.
pub type WorkerOutcome = Result<WorkerResult, WorkerFailure>;

/// Lifecycle of a single run. Strictly linear, no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Configured,
    Dispatched,
    Aggregated,
    Reported,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Configured => "configured",
            RunPhase::Dispatched => "dispatched",
            RunPhase::Aggregated => "aggregated",
            RunPhase::Reported => "reported",
        };
        f.write_str(name)
    }
}

/// Aggregate of a run with at least one successful worker.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Mean of the successful workers' averages, in seconds.
    pub average_secs: f64,
    /// Successful workers, ordered by id.
    pub results: Vec<WorkerResult>,
    /// Failed workers, ordered by id. Excluded from `average_secs`.
    pub failures: Vec<WorkerFailure>,
    pub latency: Option<PercentileStats>,
    pub bytes: u64,
    pub wall_time: Duration,
}

impl RunSummary {
    /// True when every worker finished all of its requests.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_worker_ids(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.worker_id).collect()
    }

    /// Response bytes per second of wall time, in MiB/s.
    pub fn throughput_mib_per_sec(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs / (1024.0 * 1024.0)
        } else {
            0.0
        }
    }
}

/// Reduces worker outcomes into a summary.
///
/// Outcomes may arrive in any order; the summary lists them by worker id.
/// Fails when no worker succeeded rather than inventing a mean.
pub fn aggregate(outcomes: Vec<WorkerOutcome>, wall_time: Duration) -> Result<RunSummary, RunError> {
    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(failure) => failures.push(failure),
        }
    }
    results.sort_by_key(|r| r.worker_id);
    failures.sort_by_key(|f| f.worker_id);

    if results.is_empty() {
        return Err(RunError::AggregationImpossible { failures });
    }

    let average_secs =
        results.iter().map(|r| r.average_secs).sum::<f64>() / results.len() as f64;

    let mut tracker = PercentileTracker::new();
    for sample in results.iter().flat_map(|r| r.samples.iter()) {
        tracker.record(*sample);
    }

    Ok(RunSummary {
        average_secs,
        bytes: results.iter().map(|r| r.bytes).sum(),
        latency: tracker.stats(),
        results,
        failures,
        wall_time,
    })
}

/// Runs `config.processes` workers in parallel and reports the summary.
///
/// A failed worker is flagged on the sink and left out of the mean; the
/// run only errors when every worker failed.
pub async fn run(
    client: reqwest::Client,
    config: &Config,
    sink: Arc<dyn LineSink>,
) -> Result<RunSummary, RunError> {
    let mut phase = RunPhase::Configured;
    debug!(
        %phase,
        url = %config.target_url,
        processes = config.processes,
        requests = config.requests,
        "Run configured"
    );

    let start_time = Instant::now();

    let mut handles = Vec::with_capacity(config.processes);
    for worker_id in 0..config.processes {
        let worker_config = WorkerConfig::from_config(config, worker_id);
        let client_clone = client.clone();
        let sink_clone = Arc::clone(&sink);

        let handle =
            tokio::spawn(async move { run_worker(client_clone, worker_config, sink_clone).await });
        handles.push((worker_id, handle));
    }
    phase = RunPhase::Dispatched;
    debug!(%phase, workers = handles.len(), "Workers spawned");

    let mut outcomes = Vec::with_capacity(handles.len());
    for (worker_id, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(WorkerFailure::panicked(worker_id, e.to_string())),
        };
        if let Err(ref failure) = outcome {
            WORKERS_FAILED_TOTAL.inc();
            warn!(
                worker_id = failure.worker_id,
                error = %failure,
                "Worker failed"
            );
            sink.emit(&worker_failure_line(failure));
        }
        outcomes.push(outcome);
    }
    let wall_time = start_time.elapsed();

    let summary = aggregate(outcomes, wall_time);
    phase = RunPhase::Aggregated;
    debug!(%phase, "Worker results reduced");

    match &summary {
        Ok(summary) => {
            sink.emit(&summary_line(summary.average_secs));
            if !summary.is_complete() {
                sink.emit(&failed_workers_line(&summary.failed_worker_ids()));
            }
            info!(
                average_secs = summary.average_secs,
                succeeded = summary.results.len(),
                failed = summary.failures.len(),
                bytes = summary.bytes,
                wall_time_secs = summary.wall_time.as_secs_f64(),
                throughput_mib_per_sec = summary.throughput_mib_per_sec(),
                "Run complete"
            );
            if let Some(latency) = &summary.latency {
                info!(latency = %latency.format(), "Latency distribution");
            }
        }
        Err(RunError::AggregationImpossible { failures }) => {
            sink.emit(&aggregation_failed_line(failures.len()));
        }
    }
    phase = RunPhase::Reported;
    debug!(%phase, "Run reported");

    summary
}
