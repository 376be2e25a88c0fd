// Hotkey strategy: interactive region capture via `screencapture`
//
// The trigger is SIGUSR1. `screenfix capture` sends it to the running daemon,
// and the user binds that command to Ctrl+Option+S at the OS level.

use super::{ensure_temp_dir, CaptureError, ImageSource};
use chrono::Local;
use signal_hook::consts::SIGUSR1;
use signal_hook::iterator::Signals;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wait_timeout::ChildExt;

/// Interactive capture is abandoned after this long
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ask the daemon with the given pid to run an interactive capture
pub fn send_trigger(pid: u32) -> std::io::Result<()> {
    let raw = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    let result = unsafe { libc::kill(raw, SIGUSR1) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Swallow capture triggers in a daemon that has no region source
///
/// SIGUSR1 terminates a process by default. The returned flag is set when one
/// arrives.
pub fn ignore_trigger() -> std::io::Result<Arc<AtomicBool>> {
    let received = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGUSR1, Arc::clone(&received))?;
    Ok(received)
}

pub struct RegionCaptureSource {
    signals: Signals,
    temp_dir: PathBuf,
    cancel: CancellationToken,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl RegionCaptureSource {
    pub fn new(temp_dir: PathBuf, cancel: CancellationToken) -> Result<Self, CaptureError> {
        ensure_temp_dir(&temp_dir)?;
        let signals = Signals::new([SIGUSR1]).map_err(CaptureError::Trigger)?;

        log::info!(
            "Waiting for capture trigger (SIGUSR1 to pid {})",
            std::process::id()
        );

        Ok(Self {
            signals,
            temp_dir,
            cancel,
            program: "screencapture".to_string(),
            // -i interactive, -x no sound, -s mouse selection only
            args: vec!["-i".into(), "-x".into(), "-s".into()],
            timeout: CAPTURE_TIMEOUT,
        })
    }

    /// Replace the capture command; the output path is appended as the last argument
    pub fn with_command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn triggered(&mut self) -> bool {
        // Several queued triggers collapse into one capture
        self.signals.pending().count() > 0
    }

    /// Run one interactive capture; `None` when cancelled, timed out or empty
    pub fn capture(&mut self) -> Result<Option<PathBuf>, CaptureError> {
        let path = self.temp_dir.join(format!(
            "screenfix_capture_{}.png",
            Local::now().format("%Y%m%d_%H%M%S")
        ));

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let waited = child.wait_timeout(POLL_INTERVAL).map_err(|source| CaptureError::Io {
                path: path.clone(),
                source,
            })?;
            if waited.is_some() {
                break;
            }

            let timed_out = Instant::now() >= deadline;
            if timed_out || self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                if timed_out {
                    log::warn!(
                        "Region capture timed out after {}s",
                        self.timeout.as_secs()
                    );
                }
                discard(&path);
                return Ok(None);
            }
        }

        if has_content(&path) {
            log::info!("Region captured: {}", path.display());
            Ok(Some(path))
        } else {
            log::info!("Region capture cancelled");
            discard(&path);
            Ok(None)
        }
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

impl ImageSource for RegionCaptureSource {
    fn poll_or_wait(&mut self) -> Result<Option<PathBuf>, CaptureError> {
        if !self.triggered() {
            std::thread::sleep(POLL_INTERVAL);
            return Ok(None);
        }
        self.capture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_source(temp_dir: &TempDir, script: &str) -> RegionCaptureSource {
        RegionCaptureSource::new(temp_dir.path().join("capture"), CancellationToken::new())
            .unwrap()
            .with_command("sh", vec!["-c".into(), script.into(), "sh".into()])
    }

    #[test]
    fn test_capture_returns_written_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = shell_source(&temp_dir, "printf png > \"$1\"");

        let path = source.capture().unwrap().expect("capture should produce a file");

        assert_eq!(std::fs::read(&path).unwrap(), b"png");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("screenfix_capture_"));
    }

    #[test]
    fn test_empty_output_is_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = shell_source(&temp_dir, ": > \"$1\"");

        assert!(source.capture().unwrap().is_none());
        let leftovers = std::fs::read_dir(temp_dir.path().join("capture"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_missing_output_is_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = shell_source(&temp_dir, "exit 1");

        assert!(source.capture().unwrap().is_none());
    }

    #[test]
    fn test_timeout_kills_capture() {
        let temp_dir = TempDir::new().unwrap();
        let mut source =
            shell_source(&temp_dir, "sleep 30").with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        assert!(source.capture().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_aborts_capture() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut source = RegionCaptureSource::new(temp_dir.path().to_path_buf(), cancel.clone())
            .unwrap()
            .with_command("sh", vec!["-c".into(), "sleep 30".into(), "sh".into()]);
        cancel.cancel();

        let started = Instant::now();
        assert!(source.capture().unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = RegionCaptureSource::new(temp_dir.path().to_path_buf(), CancellationToken::new())
            .unwrap()
            .with_command("/nonexistent/screencapture", Vec::new());

        assert!(matches!(
            source.capture(),
            Err(CaptureError::Spawn { .. })
        ));
    }

    #[test]
    fn test_trigger_runs_capture() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = shell_source(&temp_dir, "printf png > \"$1\"");

        // Nothing pending yet
        assert!(source.poll_or_wait().unwrap().is_none());

        send_trigger(std::process::id()).unwrap();
        let mut captured = None;
        for _ in 0..20 {
            if let Some(path) = source.poll_or_wait().unwrap() {
                captured = Some(path);
                break;
            }
        }
        assert!(captured.is_some(), "trigger should start a capture");
    }

    #[test]
    fn test_ignored_trigger_does_not_terminate() {
        use std::sync::atomic::Ordering;

        let received = ignore_trigger().unwrap();
        send_trigger(std::process::id()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !received.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(received.load(Ordering::SeqCst));
    }
}
