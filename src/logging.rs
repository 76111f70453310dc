//! Tracing setup

use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `BULKSLICE_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract:
/// - Coordinator events carry `task` (the job description).
/// - Slice events carry `slice` (the slice ordinal).
/// - Rejected slice reports carry `defect`.
///
/// Logs go to stderr so JSON results on stdout stay machine-readable.
pub fn init_tracing() {
    let filter = env_filter();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("BULKSLICE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
