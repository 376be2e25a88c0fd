// Per-user paths and persisted configuration
// Handles the ~/.config/screenfix directory layout and the config.json record

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory for saved screenshots (relative to the daemon's cwd)
pub const DEFAULT_SAVE_DIRECTORY: &str = "./screenfix/screenshots";

/// Default path of the markdown task log (relative to the daemon's cwd)
pub const DEFAULT_TASKS_FILE: &str = "./screenfix/tasks/screenfix-tasks.md";

/// Environment variable that overrides the per-user directory
pub const HOME_ENV: &str = "SCREENFIX_HOME";

/// Locations of every per-user file the daemon and control service share
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding config, state and logs
    pub config_dir: PathBuf,
    /// Persisted configuration record
    pub config_file: PathBuf,
    /// Daemon state record (pid + listening flag)
    pub state_file: PathBuf,
    /// Daemon output, appended by the launcher
    pub log_file: PathBuf,
    /// Scratch directory for images pulled off the clipboard
    pub clipboard_temp_dir: PathBuf,
    /// Scratch directory for interactive region captures
    pub capture_temp_dir: PathBuf,
}

impl AppPaths {
    /// Build the layout rooted at an explicit directory
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let temp_root = std::env::temp_dir().join("screenfix");

        Self {
            config_file: config_dir.join("config.json"),
            state_file: config_dir.join("state.json"),
            log_file: config_dir.join("daemon.log"),
            clipboard_temp_dir: temp_root.join("clipboard"),
            capture_temp_dir: temp_root.join("capture"),
            config_dir,
        }
    }

    /// Create paths using the default per-user directory
    pub fn default_paths() -> Self {
        Self::in_dir(Self::default_config_dir())
    }

    /// Create paths from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        // SCREENFIX_HOME relocates every per-user file at once
        if let Ok(override_dir) = std::env::var(HOME_ENV) {
            if !override_dir.trim().is_empty() {
                return Self::in_dir(override_dir);
            }
        }

        Self::default_paths()
    }

    /// All platforms: ~/.config/screenfix (or /tmp/screenfix-config if home unavailable)
    fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".config").join("screenfix"))
            .unwrap_or_else(|| std::env::temp_dir().join("screenfix-config"))
    }

    /// Ensure the per-user directory exists; failure here is fatal for every binary
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)
    }
}

/// On-disk shape of config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigRecord {
    #[serde(default = "default_save_directory")]
    save_directory: String,
    #[serde(default = "default_tasks_file")]
    tasks_file: String,
}

fn default_save_directory() -> String {
    DEFAULT_SAVE_DIRECTORY.to_string()
}

fn default_tasks_file() -> String {
    DEFAULT_TASKS_FILE.to_string()
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            tasks_file: default_tasks_file(),
        }
    }
}

/// Process configuration, loaded once at startup and passed by reference
#[derive(Debug, Clone)]
pub struct Config {
    paths: AppPaths,
    record: ConfigRecord,
}

impl Config {
    /// Load config.json from the given paths, using defaults when it is missing or unreadable
    pub fn load(paths: AppPaths) -> Self {
        let record = match std::fs::read_to_string(&paths.config_file) {
            Ok(contents) => match serde_json::from_str::<ConfigRecord>(&contents) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!(
                        "Ignoring unparsable config {}: {}",
                        paths.config_file.display(),
                        e
                    );
                    ConfigRecord::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigRecord::default(),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable config {}: {}",
                    paths.config_file.display(),
                    e
                );
                ConfigRecord::default()
            }
        };

        Self { paths, record }
    }

    /// Load configuration for the current user (honours SCREENFIX_HOME)
    pub fn from_env() -> Self {
        Self::load(AppPaths::from_env())
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Directory where screenshots are saved
    pub fn save_directory(&self) -> PathBuf {
        PathBuf::from(&self.record.save_directory)
    }

    /// Path to the markdown task log
    pub fn tasks_file(&self) -> PathBuf {
        PathBuf::from(&self.record.tasks_file)
    }

    /// Change the screenshot directory and persist immediately
    pub fn set_save_directory(&mut self, value: &str) -> Result<()> {
        self.record.save_directory = expand_home(value);
        self.save()
    }

    /// Change the task log path and persist immediately
    pub fn set_tasks_file(&mut self, value: &str) -> Result<()> {
        self.record.tasks_file = expand_home(value);
        self.save()
    }

    /// Write config.json
    pub fn save(&self) -> Result<()> {
        self.paths.ensure_dirs().with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.paths.config_dir.display()
            )
        })?;

        let contents = serde_json::to_string_pretty(&self.record)
            .context("Failed to serialize config")?;
        std::fs::write(&self.paths.config_file, contents).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.paths.config_file.display()
            )
        })
    }

    /// Ensure the screenshot directory and the task log's parent exist
    pub fn ensure_directories(&self) -> Result<()> {
        let save_dir = self.save_directory();
        std::fs::create_dir_all(&save_dir).with_context(|| {
            format!(
                "Failed to create screenshot directory: {}",
                save_dir.display()
            )
        })?;

        if let Some(parent) = self.tasks_file().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create tasks directory: {}", parent.display())
                })?;
            }
        }

        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory; everything else is kept verbatim
pub fn expand_home(value: &str) -> String {
    let Some(rest) = value.strip_prefix('~') else {
        return value.to_string();
    };

    // Only "~" and "~/..." refer to the current user
    if !rest.is_empty() && !rest.starts_with('/') {
        return value.to_string();
    }

    match dirs::home_dir() {
        Some(home) => {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                home.to_string_lossy().to_string()
            } else {
                home.join(Path::new(rest)).to_string_lossy().to_string()
            }
        }
        None => value.to_string(),
    }
}
