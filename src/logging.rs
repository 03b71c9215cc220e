//! Structured logging setup.
//!
//! Logs go to stderr so that stdout stays clean for query results and
//! `--json` output. The filter is taken from `RUST_LOG` when set, otherwise
//! from `--verbose` (info), otherwise from `[logging].level`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve the filter directive without touching the environment.
pub fn filter_directive(env: Option<&str>, verbose: bool, configured: Option<&str>) -> String {
    match env {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ if verbose => "info".to_string(),
        _ => configured.unwrap_or("warn").to_string(),
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool, configured: Option<&str>) {
    let env = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(env.as_deref(), verbose, configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init();
}
