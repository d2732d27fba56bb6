use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, Opts, TextEncoder};
use std::env;

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "thor".to_string());

    pub static ref REQUEST_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("requests_total", "Total number of HTTP requests started")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref REQUEST_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_errors_total", "Number of failed HTTP requests by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).unwrap();

    pub static ref REQUEST_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "request_duration_seconds",
                "Latency of successful HTTP requests in seconds."
            ).namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref RESPONSE_BYTES_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("response_bytes_total", "Total response body bytes received")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();

    pub static ref WORKERS_FAILED_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("workers_failed_total", "Number of workers that stopped on an error")
                .namespace(METRIC_NAMESPACE.as_str())
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
///
/// Fails if called twice in the same process.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    let registry = prometheus::default_registry();
    registry.register(Box::new(REQUEST_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(RESPONSE_BYTES_TOTAL.clone()))?;
    registry.register(Box::new(WORKERS_FAILED_TOTAL.clone()))?;
    Ok(())
}

/// Gathers and encodes the default registry in the text exposition format.
pub fn gather_metrics_string() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# ERROR ENCODING METRICS: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_else(|_| String::from("# ERROR ENCODING METRICS TO UTF-8"))
}
