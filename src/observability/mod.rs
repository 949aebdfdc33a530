use tracing_subscriber::EnvFilter;

use crate::session::SessionStats;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// Logs go to stderr; stdout carries the rendered XML.
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Log a summary of a finished streaming session.
pub fn log_session_complete(stats: &SessionStats, start_time: std::time::Instant) {
    tracing::info!(
        calls = stats.calls_seen,
        closed = stats.calls_closed,
        dropped = stats.calls_unrecognized,
        xml_bytes = stats.xml_bytes,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "session complete"
    );
}
