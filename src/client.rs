use tokio::time::Duration;
use tracing::debug;

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
}

/// Builds the reqwest client shared by every worker of a run.
///
/// Idle connections are never kept, so every request opens its own
/// connection and all samples include the handshake. The connect phase is
/// bounded by the request timeout as well.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .connect_timeout(config.request_timeout)
        .build()?;

    debug!(
        request_timeout_secs = config.request_timeout.as_secs_f64(),
        "HTTP client configured"
    );

    Ok(client)
}
