//! Shared tracing/logging initialization for all four daemon binaries.
//!
//! Every binary calls [`init`] exactly once at startup. `RUST_LOG` selects
//! the filter (default `info`); `CORVID_LOG_FORMAT=json` switches to
//! structured JSON output for log aggregation.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber for a daemon binary.
///
/// `bin_name` is attached to every event as a `bin` field so logs from the
/// capture, analysis, web, and update processes can be correlated in a
/// shared journal (e.g. `journalctl -u corvid-*`).
pub fn init(bin_name: &'static str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("CORVID_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    tracing::info!(bin = bin_name, "telemetry initialized");
}
