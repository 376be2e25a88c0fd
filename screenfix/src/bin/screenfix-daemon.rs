// screenfix-daemon: background capture daemon
//
// Responsibilities:
// - Publish its pid and listening flag to state.json
// - Watch the configured image source (clipboard or hotkey-triggered region capture)
// - Show the annotation prompt for each capture and save the result
// - Clear state.json on SIGINT/SIGTERM

use anyhow::{Context, Result};
use clap::Parser;
use screenfix_lib::{
    annotation::DialogUi,
    capture::{region::ignore_trigger, SourceKind},
    daemon::{cancel_on_signals, Daemon},
    logging,
    store::{config::Config, state::StateStore},
};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "screenfix-daemon")]
#[command(about = "Watch for screenshots and turn them into annotated tasks", long_about = None)]
struct Args {
    /// Where captures come from
    #[arg(long, env = "SCREENFIX_SOURCE", value_enum, default_value_t = SourceKind::Clipboard)]
    source: SourceKind,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(log::LevelFilter::Info);

    let config = Config::from_env();
    let paths = config.paths().clone();

    // The only fatal setup step
    paths.ensure_dirs().with_context(|| {
        format!(
            "Failed to create config directory: {}",
            paths.config_dir.display()
        )
    })?;

    let status = StateStore::new(&paths.state_file).read();
    if status.running {
        let pid = status.pid.map(|p| p.to_string()).unwrap_or_default();
        eprintln!("Daemon already running (PID: {})", pid);
        std::process::exit(1);
    }

    if let Err(e) = config.ensure_directories() {
        log::warn!("{:#}", e);
    }

    log::info!("Capture source: {}", args.source);
    log::info!("Screenshots: {}", config.save_directory().display());
    log::info!("Tasks: {}", config.tasks_file().display());
    log::info!("State: {}", paths.state_file.display());

    let token = CancellationToken::new();
    cancel_on_signals(token.clone())?;
    if args.source == SourceKind::Clipboard {
        ignore_trigger().context("Failed to install capture trigger handler")?;
    }

    let mut daemon = Daemon::new(&config, Box::new(DialogUi::new()), token.clone())
        .with_source(args.source);
    daemon.run(args.source.factory(&paths, token))?;

    log::info!("Daemon stopped");
    Ok(())
}
