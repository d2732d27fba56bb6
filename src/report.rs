//! Stdout line contract.
//!
//! Sweep scripts parse these lines, so the wording and spacing must not
//! drift. All elapsed times are seconds with two decimals.

use std::io::Write;
use std::sync::Mutex;

use crate::errors::WorkerFailure;

/// Prefix of the final summary line.
pub const SUMMARY_PREFIX: &str = "TOTAL AVERAGE ELAPSED TIME: ";

/// Destination for report lines.
///
/// Implementations must write each line as a unit; lines from different
/// workers may interleave but never within a line.
pub trait LineSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Writes lines to stdout, one locked write per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn emit(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line).and_then(|_| out.flush());
    }
}

/// Collects lines in memory.
#[derive(Debug, Default)]
pub struct CaptureSink {
    lines: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl LineSink for CaptureSink {
    fn emit(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

pub fn request_line(worker_id: usize, index: usize, elapsed_secs: f64) -> String {
    format!(
        "Process: {}, Request: {}, Elapsed Time: {:.2}",
        worker_id, index, elapsed_secs
    )
}

pub fn worker_average_line(worker_id: usize, average_secs: f64) -> String {
    format!(
        "Process: {}, AVERAGE   , Elapsed Time: {:.2}",
        worker_id, average_secs
    )
}

pub fn worker_failure_line(failure: &WorkerFailure) -> String {
    let request = failure
        .request_index
        .map(|i| i.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "Process: {}, FAILED    , Request: {}, Error: [{}] {}",
        failure.worker_id,
        request,
        failure.category.label(),
        failure.message
    )
}

pub fn summary_line(average_secs: f64) -> String {
    format!("{}{:.2}", SUMMARY_PREFIX, average_secs)
}

/// Summary line when no worker produced a result.
pub fn aggregation_failed_line(failed: usize) -> String {
    format!("{}FAILED ({} of {} workers failed)", SUMMARY_PREFIX, failed, failed)
}

/// Trailer listing the worker ids excluded from the average.
pub fn failed_workers_line(ids: &[usize]) -> String {
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("FAILED WORKERS: {}", ids.join(", "))
}

/// Parses a per-request line into `(worker_id, index, elapsed_secs)`.
pub fn parse_request_line(line: &str) -> Option<(usize, usize, f64)> {
    let rest = line.strip_prefix("Process: ")?;
    let (id, rest) = rest.split_once(", Request: ")?;
    let (index, elapsed) = rest.split_once(", Elapsed Time: ")?;
    Some((id.parse().ok()?, index.parse().ok()?, elapsed.parse().ok()?))
}

/// Parses a per-worker average line into `(worker_id, average_secs)`.
pub fn parse_worker_average_line(line: &str) -> Option<(usize, f64)> {
    let rest = line.strip_prefix("Process: ")?;
    let (id, average) = rest.split_once(", AVERAGE   , Elapsed Time: ")?;
    Some((id.parse().ok()?, average.parse().ok()?))
}

/// Parses the final summary line. Returns None for the failed form.
pub fn parse_summary_line(line: &str) -> Option<f64> {
    line.strip_prefix(SUMMARY_PREFIX)?.parse().ok()
}
