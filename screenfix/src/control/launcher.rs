// Daemon start/stop protocol used by the control service and the CLI
// Start spawns the daemon detached and re-reads state after a short wait;
// stop signals the recorded pid and returns without waiting.

use crate::capture::region::send_trigger;
use crate::capture::SourceKind;
use crate::store::config::{AppPaths, HOME_ENV};
use crate::store::state::StateStore;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Environment variable naming the daemon binary explicitly
pub const DAEMON_BIN_ENV: &str = "SCREENFIX_DAEMON_BIN";

pub const DAEMON_BIN_NAME: &str = "screenfix-daemon";

/// How long `start` waits before re-reading state
pub const STARTUP_WAIT: Duration = Duration::from_millis(500);

/// Result of a start/stop request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub success: bool,
    pub message: String,
}

impl ControlOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Locate the daemon binary
///
/// Order: `SCREENFIX_DAEMON_BIN`, next to the current executable, then `$PATH`.
pub fn resolve_daemon_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(DAEMON_BIN_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(explicit));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(DAEMON_BIN_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    find_in_path(DAEMON_BIN_NAME)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug, Clone)]
pub struct DaemonLauncher {
    paths: AppPaths,
    state: StateStore,
    daemon_bin: Option<PathBuf>,
    startup_wait: Duration,
}

impl DaemonLauncher {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            state: StateStore::new(&paths.state_file),
            paths,
            daemon_bin: None,
            startup_wait: STARTUP_WAIT,
        }
    }

    /// Use this binary instead of resolving one
    pub fn with_daemon_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.daemon_bin = Some(bin.into());
        self
    }

    pub fn with_startup_wait(mut self, wait: Duration) -> Self {
        self.startup_wait = wait;
        self
    }

    /// Start the daemon unless one is already running
    pub async fn start(&self) -> ControlOutcome {
        if self.state.read().running {
            return ControlOutcome::ok("Daemon is already running");
        }

        let pid = match self.spawn() {
            Ok(pid) => pid,
            Err(e) => return ControlOutcome::failed(format!("Failed to start daemon: {:#}", e)),
        };
        log::info!("Spawned daemon (pid {})", pid);

        tokio::time::sleep(self.startup_wait).await;

        let status = self.state.read();
        match status.pid.filter(|_| status.running) {
            Some(pid) => ControlOutcome::ok(format!(
                "Daemon started (PID: {}). {}",
                pid,
                SourceKind::from_state(status.source.as_deref()).hint()
            )),
            None => ControlOutcome::ok(format!(
                "Daemon starting... Check logs at {}",
                self.paths.log_file.display()
            )),
        }
    }

    /// Spawn the daemon detached with its output appended to the log file
    fn spawn(&self) -> Result<u32> {
        let daemon_path = match &self.daemon_bin {
            Some(bin) => bin.clone(),
            None => resolve_daemon_path().ok_or_else(|| {
                anyhow::anyhow!("Could not find {} binary", DAEMON_BIN_NAME)
            })?,
        };

        self.paths.ensure_dirs().with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.paths.config_dir.display()
            )
        })?;

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log_file)
            .with_context(|| format!("Failed to open log {}", self.paths.log_file.display()))?;
        let log_err = log
            .try_clone()
            .context("Failed to duplicate log handle")?;

        let mut child = Command::new(&daemon_path)
            .env(HOME_ENV, &self.paths.config_dir)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            // New process group so the caller's terminal signals do not reach it
            .process_group(0)
            .spawn()
            .with_context(|| format!("Failed to start daemon at {}", daemon_path.display()))?;

        let pid = child.id();
        // Reap on exit; a zombie would still answer the liveness check
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(pid)
    }

    /// Ask a hotkey-mode daemon to run one region capture
    ///
    /// A clipboard-mode daemon never installs the trigger handler, so it is
    /// not signalled at all.
    pub fn capture(&self) -> ControlOutcome {
        let status = self.state.read();
        let Some(pid) = status.pid.filter(|_| status.running) else {
            return ControlOutcome::failed("Daemon is not running");
        };

        match SourceKind::from_state(status.source.as_deref()) {
            SourceKind::Hotkey => match send_trigger(pid) {
                Ok(()) => {
                    log::info!("Sent capture trigger to daemon (pid {})", pid);
                    ControlOutcome::ok(format!("Capture requested (PID: {})", pid))
                }
                Err(e) => ControlOutcome::failed(format!("Failed to signal daemon: {}", e)),
            },
            SourceKind::Clipboard => ControlOutcome::failed(format!(
                "Daemon is watching the clipboard. {} Restart it with --source hotkey to capture on demand.",
                SourceKind::Clipboard.hint()
            )),
        }
    }

    /// Ask a running daemon to shut down
    pub fn stop(&self) -> ControlOutcome {
        let status = self.state.read();
        if !status.running {
            return ControlOutcome::ok("Daemon is not running");
        }
        let Some(pid) = status.pid else {
            return ControlOutcome::failed("Could not find daemon PID");
        };

        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result == 0 {
            log::info!("Sent SIGTERM to daemon (pid {})", pid);
            ControlOutcome::ok("Daemon stopped")
        } else {
            let err = std::io::Error::last_os_error();
            ControlOutcome::failed(format!("Failed to stop daemon: {}", err))
        }
    }
}
