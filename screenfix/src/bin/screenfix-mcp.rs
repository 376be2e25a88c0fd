// screenfix-mcp: tool-call control service over stdio
//
// Reads newline-delimited JSON-RPC requests from stdin and writes one response
// line per request to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use screenfix_lib::{
    control::{server, ControlService},
    logging,
    store::config::Config,
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(log::LevelFilter::Warn);

    let config = Config::from_env();
    config.paths().ensure_dirs().with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config.paths().config_dir.display()
        )
    })?;

    let service = ControlService::new(&config);
    log::info!("Serving tool calls on stdio");

    server::serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &service,
    )
    .await
}
