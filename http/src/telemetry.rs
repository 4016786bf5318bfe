//! # Telemetry
//!
//! Subscriber setup for binaries and local development.

use tracing_subscriber::EnvFilter;

/// Initialize a simple stdout tracing subscriber for development
pub fn init_stdout_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pagelet_core=debug,pagelet_http=debug"));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
