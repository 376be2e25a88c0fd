// Annotation flow: turn a captured temp image into a saved screenshot plus an optional task
//
// The window itself is an external collaborator behind `AnnotationUi`; the
// flow only decides what happens to the image once the user answers.

pub mod dialog;
pub mod preview;

use crate::store::screenshots::{cleanup_temp, ScreenshotStore};
use crate::store::tasks::TaskLog;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub use dialog::DialogUi;

/// What the user entered in the annotation window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptResponse {
    pub instructions: String,
    /// Save was chosen (false for Cancel or a closed window)
    pub confirmed: bool,
}

impl PromptResponse {
    pub fn save(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            confirmed: true,
        }
    }

    pub fn cancel() -> Self {
        Self {
            instructions: String::new(),
            confirmed: false,
        }
    }
}

/// An open annotation window, polled from the daemon's UI loop
pub trait AnnotationWindow {
    /// `Some` once the user has answered; the window is finished afterwards
    fn poll(&mut self) -> Result<Option<PromptResponse>>;

    /// Dismiss the window without an answer
    fn close(&mut self);
}

/// Opens annotation windows for captured images
pub trait AnnotationUi {
    fn open(&self, image: &Path) -> Result<Box<dyn AnnotationWindow>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationOutcome {
    Saved {
        path: PathBuf,
        /// Task block appended to the log, when instructions were given
        task: Option<String>,
    },
    Discarded,
}

pub struct AnnotationFlow {
    tasks: TaskLog,
    screenshots: ScreenshotStore,
}

impl AnnotationFlow {
    pub fn new(tasks: TaskLog, screenshots: ScreenshotStore) -> Self {
        Self { tasks, screenshots }
    }

    /// Apply the user's answer to the captured image
    pub fn finish(&self, image: &Path, response: PromptResponse) -> Result<AnnotationOutcome> {
        if !response.confirmed {
            self.discard(image);
            return Ok(AnnotationOutcome::Discarded);
        }

        let saved = self.screenshots.save(image)?;
        log::info!("Saved screenshot to {}", saved.display());

        let instructions = response.instructions.trim();
        let task = if instructions.is_empty() {
            None
        } else {
            let block = self
                .tasks
                .append(instructions, Some(&*saved.to_string_lossy()))?;
            log::info!("Added task to {}", self.tasks.path().display());
            Some(block)
        };

        Ok(AnnotationOutcome::Saved { path: saved, task })
    }

    /// Drop a captured image that will never be saved
    pub fn discard(&self, image: &Path) {
        log::info!("Discarding capture {}", image.display());
        cleanup_temp(image);
    }
}
