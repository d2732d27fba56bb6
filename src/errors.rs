//! Error taxonomy for a load-test run.
//!
//! Request failures are classified into categories so a failed worker can be
//! reported with a cause instead of a bare error string. Every failure
//! names the worker that hit it.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Categories of errors that can occur while a worker issues requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request exceeded the per-request timeout
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// The worker task itself panicked or was cancelled
    Panic,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code.
    ///
    /// Returns None for 2xx. Anything else fails the request, including 3xx
    /// responses the client did not follow.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=299 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() || error.is_request() {
            ErrorCategory::NetworkError
        } else if error.is_body() || error.is_decode() {
            // Response body errors - usually network or server issues
            ErrorCategory::NetworkError
        } else if error.is_redirect() {
            ErrorCategory::ClientError
        } else if let Some(status) = error.status() {
            Self::from_status_code(status.as_u16()).unwrap_or(ErrorCategory::OtherError)
        } else {
            Self::from_message(&error_chain(error))
        }
    }

    /// Fallback classification on the rendered error message.
    fn from_message(message: &str) -> Self {
        let msg = message.to_lowercase();

        if msg.contains("certificate") || msg.contains("tls") || msg.contains("ssl") {
            ErrorCategory::TlsError
        } else if msg.contains("timeout") || msg.contains("timed out") {
            ErrorCategory::TimeoutError
        } else if msg.contains("dns")
            || msg.contains("resolve")
            || msg.contains("connect")
            || msg.contains("connection")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::Panic => "panic",
            ErrorCategory::OtherError => "other_error",
        }
    }

    /// Get a human-readable description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "HTTP 4xx Client Errors",
            ErrorCategory::ServerError => "HTTP 5xx Server Errors",
            ErrorCategory::NetworkError => "Network/Connection Errors",
            ErrorCategory::TimeoutError => "Request Timeout Errors",
            ErrorCategory::TlsError => "TLS/SSL Certificate Errors",
            ErrorCategory::Panic => "Worker Task Panics",
            ErrorCategory::OtherError => "Other/Unknown Errors",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A worker stopped before finishing its requests.
///
/// `request_index` is None when the failure is not tied to a request, e.g.
/// the task panicked outside the request loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub request_index: Option<usize>,
    pub category: ErrorCategory,
    pub status_code: Option<u16>,
    pub message: String,
}

impl WorkerFailure {
    /// Failure produced by the HTTP client.
    pub fn from_reqwest(worker_id: usize, request_index: usize, error: &reqwest::Error) -> Self {
        Self {
            worker_id,
            request_index: Some(request_index),
            category: ErrorCategory::from_reqwest_error(error),
            status_code: error.status().map(|s| s.as_u16()),
            message: error_chain(error),
        }
    }

    /// Failure produced by a non-2xx response.
    pub fn from_status(worker_id: usize, request_index: usize, status_code: u16) -> Self {
        Self {
            worker_id,
            request_index: Some(request_index),
            category: ErrorCategory::from_status_code(status_code)
                .unwrap_or(ErrorCategory::OtherError),
            status_code: Some(status_code),
            message: format!("unexpected HTTP status {}", status_code),
        }
    }

    /// Failure produced by the per-request timeout expiring.
    pub fn timed_out(worker_id: usize, request_index: usize, limit: std::time::Duration) -> Self {
        Self {
            worker_id,
            request_index: Some(request_index),
            category: ErrorCategory::TimeoutError,
            status_code: None,
            message: format!("no response within {:.2}s", limit.as_secs_f64()),
        }
    }

    /// Failure produced by the task itself rather than a request.
    pub fn panicked(worker_id: usize, message: String) -> Self {
        Self {
            worker_id,
            request_index: None,
            category: ErrorCategory::Panic,
            status_code: None,
            message,
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker {}", self.worker_id)?;
        if let Some(index) = self.request_index {
            write!(f, ", request {}", index)?;
        }
        match self.status_code {
            Some(status) => write!(
                f,
                ": [{}] HTTP {}: {}",
                self.category.label(),
                status,
                self.message
            ),
            None => write!(f, ": [{}] {}", self.category.label(), self.message),
        }
    }
}

impl std::error::Error for WorkerFailure {}

/// Renders an error followed by each of its sources, joined with ": ".
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Errors that end a run without a usable summary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("all {} workers failed, no latency average can be computed", failures.len())]
    AggregationImpossible { failures: Vec<WorkerFailure> },
}

/// Command line problems. Never reaches the dispatcher.
#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    /// `-h` was given.
    #[error("help requested")]
    Help,

    #[error("{0}")]
    Invalid(String),
}

impl UsageError {
    /// Process exit status for this usage outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            UsageError::Help => 0,
            UsageError::Invalid(_) => 1,
        }
    }
}
