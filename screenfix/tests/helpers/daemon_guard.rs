use super::polling::{wait_for_file_content, WaitError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const EXIT_POLL: Duration = Duration::from_millis(25);

pub const DAEMON_BIN: &str = env!("CARGO_BIN_EXE_screenfix-daemon");
pub const CLI_BIN: &str = env!("CARGO_BIN_EXE_screenfix");
pub const MCP_BIN: &str = env!("CARGO_BIN_EXE_screenfix-mcp");

/// Isolated per-user directory with absolute screenshot and task paths.
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("screenfix-it-")
            .tempdir()
            .expect("create temp dir");
        let home = temp_dir.path().join("home");
        std::fs::create_dir_all(&home).expect("create home dir");

        let config = serde_json::json!({
            "save_directory": temp_dir.path().join("shots"),
            "tasks_file": temp_dir.path().join("tasks").join("tasks.md"),
        });
        std::fs::write(
            home.join("config.json"),
            serde_json::to_string_pretty(&config).expect("serialize config"),
        )
        .expect("write config.json");

        Self { temp_dir }
    }

    pub fn home(&self) -> PathBuf {
        self.temp_dir.path().join("home")
    }

    pub fn state_file(&self) -> PathBuf {
        self.home().join("state.json")
    }

    pub fn shots_dir(&self) -> PathBuf {
        self.temp_dir.path().join("shots")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.temp_dir.path().join("tasks").join("tasks.md")
    }

    /// Command for one of the crate's binaries, pointed at this workspace.
    pub fn command(&self, bin: &str) -> Command {
        let mut command = Command::new(bin);
        command
            .env("SCREENFIX_HOME", self.home())
            .env("SCREENFIX_DAEMON_BIN", DAEMON_BIN)
            .env("SCREENFIX_SOURCE", "hotkey")
            .env_remove("RUST_LOG");
        command
    }
}

/// RAII wrapper that ensures the daemon process is cleaned up.
pub struct DaemonGuard {
    child: Child,
    state_file: PathBuf,
}

impl DaemonGuard {
    /// Start the daemon with the hotkey source and wait until it reports listening.
    pub fn start(workspace: &Workspace) -> Result<Self, DaemonError> {
        let child = workspace
            .command(DAEMON_BIN)
            .arg("--source")
            .arg("hotkey")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(DaemonError::SpawnFailed)?;

        let guard = Self {
            child,
            state_file: workspace.state_file(),
        };
        guard.wait_for_listening().map_err(DaemonError::ReadyTimeout)?;
        Ok(guard)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    fn wait_for_listening(&self) -> Result<(), WaitError> {
        let pid = self.pid();
        wait_for_file_content(
            &self.state_file,
            |content| {
                serde_json::from_str::<serde_json::Value>(content)
                    .map(|v| v["pid"] == pid && v["listening"] == true)
                    .unwrap_or(false)
            },
            READY_TIMEOUT,
        )
        .map(|_| ())
    }

    /// Send SIGTERM without waiting.
    pub fn terminate(&self) {
        unsafe {
            libc::kill(self.pid() as i32, libc::SIGTERM);
        }
    }

    /// Reap the daemon if it exits within `timeout`.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            thread::sleep(EXIT_POLL);
        }
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }

        self.terminate();
        if self.wait_for_exit(Duration::from_secs(3)).is_some() {
            return;
        }

        if let Err(err) = self.child.kill() {
            eprintln!(
                "Failed to kill screenfix-daemon pid {}: {}",
                self.child.id(),
                err
            );
            return;
        }
        let _ = self.child.wait();
    }
}

/// Errors that can occur when starting the daemon for tests.
#[derive(Debug)]
pub enum DaemonError {
    SpawnFailed(std::io::Error),
    ReadyTimeout(WaitError),
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SpawnFailed(err) => write!(f, "failed to spawn daemon: {}", err),
            Self::ReadyTimeout(err) => write!(f, "daemon never started listening: {}", err),
        }
    }
}

impl std::error::Error for DaemonError {}
