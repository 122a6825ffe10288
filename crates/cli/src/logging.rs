//! Logging setup
//!
//! Logs always go to stderr; stdout carries the forwarded probe diagnostics.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "probe_bridge=info";

/// Initialize the global subscriber
///
/// # Environment Variables
///
/// - `RUST_LOG`: filter directives (default: `probe_bridge=info`)
/// - `PROBE_BRIDGE_LOG_FORMAT`: `json`, `compact` or `pretty` (default)
pub fn init() -> Result<()> {
    let log_format =
        std::env::var("PROBE_BRIDGE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    match log_format.as_str() {
        "json" => {
            // Machine-readable structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        "compact" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            // Development: multi-line pretty output
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
