// Logger setup shared by the binaries (reads RUST_LOG env var)
// Everything goes to stderr: the daemon's stderr is its log file, and the
// MCP server's stdout carries protocol frames only.

use log::LevelFilter;

/// Initialize env_logger with `default` unless RUST_LOG says otherwise
pub fn init(default: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .try_init();
}
