use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

use tracing::error;
use tracing_subscriber::EnvFilter;

use thor::client::build_client;
use thor::config::{usage, Config};
use thor::dispatcher::run;
use thor::errors::{RunError, UsageError};
use thor::metrics::{gather_metrics_string, register_metrics};
use thor::report::StdoutSink;

/// Exit status when any worker failed or no summary could be computed.
const EXIT_RUN_FAILED: i32 = 2;

/// Logs go to stderr; stdout carries only the report lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn program_name() -> String {
    env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "thor".to_string())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let program = program_name();

    let config = match Config::from_args(env::args_os()) {
        Ok(c) => c,
        Err(UsageError::Help) => {
            print!("{}", usage(&program));
            process::exit(UsageError::Help.exit_code());
        }
        Err(e) => {
            eprintln!("{}: {}\n", program, e);
            eprint!("{}", usage(&program));
            process::exit(e.exit_code());
        }
    };

    if config.print_metrics {
        if let Err(e) = register_metrics() {
            error!(error = %e, "Failed to register metrics");
        }
    }

    let client = match build_client(&config.to_client_config()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}: failed to build HTTP client: {}", program, e);
            process::exit(EXIT_RUN_FAILED);
        }
    };

    let outcome = run(client, &config, Arc::new(StdoutSink)).await;

    if config.print_metrics {
        eprint!("{}", gather_metrics_string());
    }

    let code = match outcome {
        Ok(summary) if summary.is_complete() => 0,
        Ok(summary) => {
            for failure in &summary.failures {
                eprintln!("{}: {}", program, failure);
            }
            EXIT_RUN_FAILED
        }
        Err(RunError::AggregationImpossible { failures }) => {
            for failure in &failures {
                eprintln!("{}: {}", program, failure);
            }
            eprintln!(
                "{}: all {} workers failed, no average reported",
                program,
                failures.len()
            );
            EXIT_RUN_FAILED
        }
    };
    process::exit(code);
}
