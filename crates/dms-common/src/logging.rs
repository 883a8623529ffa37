//! Structured Logging Configuration
//!
//! Provides configurable logging with:
//! - JSON output for log aggregation (LOG_FORMAT=json)
//! - Human-readable output for interactive use (default)
//!
//! Everything is written to stderr. Reports produced by the diagnostic
//! commands own stdout, so piping `--format json` output stays clean.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dms_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("dms-rbac-doctor");
//!
//!     tracing::info!(user_id = 42, "Fetched assignments");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: Set to "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: Standard log level filter (default: info)
//!   Examples: `RUST_LOG=debug`, `RUST_LOG=dms_rbac=trace,sqlx=warn`

use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize logging for the given service name.
///
/// Reads LOG_FORMAT to pick JSON or text output and RUST_LOG for filtering.
/// Calling it twice is harmless; the second registration is ignored.
pub fn init_logging(service_name: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();

    if log_format.eq_ignore_ascii_case("json") {
        init_json_logging(build_filter());
    } else {
        init_text_logging(build_filter());
    }

    tracing::debug!(service = service_name, format = %log_format, "Logging initialized");
}

fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn init_json_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(false)
                .with_target(true)
                .flatten_event(true)
        )
        .try_init();
}

fn init_text_logging(env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true)
        )
        .try_init();
}
