//! Telemetry and logging initialization.
//!
//! stdout is reserved for a command's machine-readable output; all logs go
//! to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the process-wide tracing subscriber.
///
/// `verbose` raises the default filter from `info` to `debug`; `json_format`
/// switches the format layer to JSON for machine ingestion.
pub fn init_tracing(verbose: bool, json_format: bool) {
    let filter_level = if verbose { 
        "debug,hyper=info,tokio=info" 
    } else { 
        "info" 
    };
    
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_level));
    
    if json_format {
        // JSON format for machine-parseable logs
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr) // CRITICAL: Never write to stdout
            )
            .with(env_filter)
            .init();
    } else {
        // Human-readable format for development
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr) // CRITICAL: Never write to stdout
                    .with_target(false)
                    .compact()
            )
            .with(env_filter)
            .init();
    }
}
