// Daemon state record shared between the capture daemon and the control service
// The daemon writes state.json when it starts listening and removes it on exit;
// readers check the recorded pid and delete the file when it is stale.

use crate::store::persistence::{atomic_write, with_file_lock};
use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of state.json
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub listening: bool,
    /// Capture strategy the daemon was started with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_capture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_capture_time: Option<String>,
}

/// Fields to merge into the existing record; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub listening: Option<bool>,
    pub source: Option<String>,
    pub last_capture: Option<String>,
}

impl StateUpdate {
    pub fn listening(listening: bool) -> Self {
        Self {
            listening: Some(listening),
            ..Self::default()
        }
    }

    pub fn capture(path: impl Into<String>) -> Self {
        Self {
            last_capture: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// What a reader learns about the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub listening: bool,
    pub pid: Option<u32>,
    pub source: Option<String>,
    pub last_capture: Option<String>,
    pub last_capture_time: Option<String>,
}

impl DaemonStatus {
    fn not_running() -> Self {
        Self::default()
    }
}

/// Check if a process with the given pid is alive by sending signal 0
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // pid 0 and values that wrap negative address process groups, never a single daemon
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    unsafe { libc::kill(raw, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Reader/writer for state.json
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the raw record; missing or unparsable files are `None`
    fn load_record(&self) -> Option<StateRecord> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("Ignoring unparsable state {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Merge `update` into the stored record and overwrite the pid
    pub fn write(&self, pid: u32, update: StateUpdate) -> Result<()> {
        with_file_lock(&self.path, || {
            let mut record = self.load_record().unwrap_or_default();

            record.pid = Some(pid);
            if let Some(listening) = update.listening {
                record.listening = listening;
            }
            if let Some(source) = update.source {
                record.source = Some(source);
            }
            if let Some(path) = update.last_capture {
                record.last_capture = Some(path);
                record.last_capture_time = Some(
                    Local::now()
                        .naive_local()
                        .format("%Y-%m-%dT%H:%M:%S%.6f")
                        .to_string(),
                );
            }

            let contents =
                serde_json::to_string_pretty(&record).context("Failed to serialize state")?;
            atomic_write(&self.path, &contents)
                .with_context(|| format!("Failed to write state file: {}", self.path.display()))
        })
    }

    /// Current daemon status; removes the file when its pid is dead
    pub fn read(&self) -> DaemonStatus {
        let Some(record) = self.load_record() else {
            return DaemonStatus::not_running();
        };

        let Some(pid) = record.pid else {
            return DaemonStatus {
                running: false,
                listening: false,
                pid: None,
                source: record.source,
                last_capture: record.last_capture,
                last_capture_time: record.last_capture_time,
            };
        };

        if !process_alive(pid) {
            log::info!(
                "Removing stale daemon state (pid {} is not running)",
                pid
            );
            if let Err(e) = self.clear() {
                log::warn!("Failed to remove stale state {}: {}", self.path.display(), e);
            }
            return DaemonStatus::not_running();
        }

        DaemonStatus {
            running: true,
            listening: record.listening,
            pid: Some(pid),
            source: record.source,
            last_capture: record.last_capture,
            last_capture_time: record.last_capture_time,
        }
    }

    /// Remove the state file
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
