// Image sources that feed the daemon's capture thread
//
// A source is built on the capture thread itself (see `SourceFactory`), so the
// platform handles it owns never have to be `Send`.

pub mod clipboard;
pub mod region;

use crate::store::config::AppPaths;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use clipboard::ClipboardSource;
pub use region::RegionCaptureSource;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Clipboard image is {width}x{height} but carries {len} bytes")]
    MalformedImage {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register capture trigger: {0}")]
    Trigger(#[source] std::io::Error),
}

/// Something that produces captured images as temp files
pub trait ImageSource {
    /// Block for at most one poll interval (or one interactive capture)
    ///
    /// `Ok(None)` means nothing new this round, including a cancelled capture.
    fn poll_or_wait(&mut self) -> Result<Option<PathBuf>, CaptureError>;
}

/// Builds a source on the thread that will drive it
pub type SourceFactory =
    Box<dyn FnOnce() -> Result<Box<dyn ImageSource>, CaptureError> + Send + 'static>;

/// Capture strategy selectable from the daemon command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceKind {
    /// Watch the clipboard for newly copied screenshots
    #[default]
    Clipboard,
    /// Run an interactive region capture when the capture trigger fires
    Hotkey,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Clipboard => "clipboard",
            SourceKind::Hotkey => "hotkey",
        }
    }

    /// Strategy recorded in state.json; unknown or missing names mean clipboard
    pub fn from_state(name: Option<&str>) -> Self {
        match name {
            Some("hotkey") => SourceKind::Hotkey,
            _ => SourceKind::Clipboard,
        }
    }

    /// One-line instruction for taking a screenshot with this strategy
    pub fn hint(&self) -> &'static str {
        match self {
            SourceKind::Clipboard => {
                "Copy a screenshot to the clipboard (Cmd+Ctrl+Shift+4) to annotate it."
            }
            SourceKind::Hotkey => "Press Ctrl+Option+S to capture a region and annotate it.",
        }
    }

    /// Factory for this strategy using the temp directories from `paths`
    pub fn factory(self, paths: &AppPaths, cancel: CancellationToken) -> SourceFactory {
        match self {
            SourceKind::Clipboard => {
                let temp_dir = paths.clipboard_temp_dir.clone();
                Box::new(move || {
                    let source = ClipboardSource::new(temp_dir)?;
                    Ok(Box::new(source) as Box<dyn ImageSource>)
                })
            }
            SourceKind::Hotkey => {
                let temp_dir = paths.capture_temp_dir.clone();
                Box::new(move || {
                    let source = RegionCaptureSource::new(temp_dir, cancel)?;
                    Ok(Box::new(source) as Box<dyn ImageSource>)
                })
            }
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create a scratch directory for captured images
pub(crate) fn ensure_temp_dir(dir: &std::path::Path) -> Result<(), CaptureError> {
    std::fs::create_dir_all(dir).map_err(|source| CaptureError::Io {
        path: dir.to_path_buf(),
        source,
    })
}
