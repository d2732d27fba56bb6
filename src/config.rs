use std::ffi::OsString;

use clap::Parser;
use tokio::time::Duration;

use crate::client::ClientConfig;
use crate::errors::UsageError;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 30.0;

/// Raw command line flags. Help and version handling are disabled so that
/// `-h` and parse failures map onto our own usage text and exit codes.
#[derive(Parser, Debug)]
#[command(
    name = "thor",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Args {
    #[arg(short = 'h')]
    help: bool,

    #[arg(short = 'v')]
    verbose: bool,

    #[arg(short = 'm')]
    metrics: bool,

    #[arg(short = 'p', value_name = "PROCESSES", default_value_t = 1)]
    processes: u64,

    #[arg(short = 'r', value_name = "REQUESTS", default_value_t = 1)]
    requests: u64,

    #[arg(
        short = 't',
        value_name = "TIMEOUT",
        env = "THOR_REQUEST_TIMEOUT",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS
    )]
    timeout: f64,

    url: Option<String>,
}

/// Immutable run parameters. Built once at startup and shared read-only
/// with every worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub target_url: String,
    pub processes: usize,
    pub requests: usize,
    pub verbose: bool,
    pub request_timeout: Duration,
    pub print_metrics: bool,
}

impl Config {
    /// Creates a configuration with default flags for `target_url`.
    pub fn new(target_url: impl Into<String>) -> Self {
        Config {
            target_url: target_url.into(),
            processes: 1,
            requests: 1,
            verbose: false,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            print_metrics: false,
        }
    }

    /// Parses the command line. The first item is the program name.
    pub fn from_args<I, T>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Args::try_parse_from(args).map_err(|e| {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            UsageError::Invalid(first.trim_start_matches("error: ").to_string())
        })?;

        if args.help {
            return Err(UsageError::Help);
        }

        let target_url = args
            .url
            .ok_or_else(|| UsageError::Invalid("missing URL".to_string()))?;

        let request_timeout = if args.timeout.is_finite() && args.timeout > 0.0 {
            Duration::from_secs_f64(args.timeout)
        } else {
            return Err(UsageError::Invalid(format!(
                "TIMEOUT must be a positive number of seconds, got {}",
                args.timeout
            )));
        };

        let config = Config {
            target_url,
            processes: to_count("PROCESSES", args.processes)?,
            requests: to_count("REQUESTS", args.requests)?,
            verbose: args.verbose,
            request_timeout,
            print_metrics: args.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every worker relies on.
    pub fn validate(&self) -> Result<(), UsageError> {
        if !self.target_url.starts_with("http://") && !self.target_url.starts_with("https://") {
            return Err(UsageError::Invalid(format!(
                "URL must start with http:// or https://, got '{}'",
                self.target_url
            )));
        }
        if self.processes == 0 {
            return Err(UsageError::Invalid("PROCESSES must be at least 1".to_string()));
        }
        if self.requests == 0 {
            return Err(UsageError::Invalid("REQUESTS must be at least 1".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(UsageError::Invalid("TIMEOUT must be positive".to_string()));
        }
        Ok(())
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
        }
    }
}

fn to_count(name: &str, value: u64) -> Result<usize, UsageError> {
    match usize::try_from(value) {
        Ok(0) => Err(UsageError::Invalid(format!("{} must be at least 1", name))),
        Ok(n) => Ok(n),
        Err(_) => Err(UsageError::Invalid(format!("{} is too large: {}", name, value))),
    }
}

/// Usage text for `program`.
pub fn usage(program: &str) -> String {
    format!(
        "Usage: {} [-p PROCESSES -r REQUESTS -t TIMEOUT -v -m] URL
    -h              Display help message
    -v              Display verbose output
    -m              Print run metrics to stderr

    -p  PROCESSES   Number of processes to utilize (1)
    -r  REQUESTS    Number of requests per process (1)
    -t  TIMEOUT     Seconds to wait for each request ({})
",
        program, DEFAULT_REQUEST_TIMEOUT_SECS
    )
}
