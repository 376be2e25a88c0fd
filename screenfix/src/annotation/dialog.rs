// macOS annotation window: an `osascript` dialog with a preview icon, a text field
// and Cancel/Save buttons. The dialog process is the window; closing it kills the process.

use super::preview::render_preview;
use super::{AnnotationUi, AnnotationWindow, PromptResponse};
use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

pub const WINDOW_TITLE: &str = "ScreenFix - Add Instructions";
pub const PROMPT_LABEL: &str = "Instructions for Claude Code:";

/// Dialog script; the preview path, when present, arrives as the first argument
fn dialog_script() -> String {
    let dialog = format!(
        "display dialog \"{PROMPT_LABEL}\" default answer \"\" with title \"{WINDOW_TITLE}\" \
         buttons {{\"Cancel\", \"Save\"}} default button \"Save\" cancel button \"Cancel\""
    );
    format!(
        "on run argv\n\
         \tactivate\n\
         \tif (count of argv) > 0 then\n\
         \t\tset reply to {dialog} with icon (POSIX file (item 1 of argv))\n\
         \telse\n\
         \t\tset reply to {dialog}\n\
         \tend if\n\
         \treturn text returned of reply\n\
         end run"
    )
}

pub struct DialogUi {
    program: String,
}

impl Default for DialogUi {
    fn default() -> Self {
        Self {
            program: "osascript".to_string(),
        }
    }
}

impl DialogUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, preview: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-e").arg(dialog_script());
        if let Some(preview) = preview {
            cmd.arg("--").arg(preview);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }
}

impl AnnotationUi for DialogUi {
    fn open(&self, image: &Path) -> Result<Box<dyn AnnotationWindow>> {
        let preview = match render_preview(image) {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Showing dialog without preview: {:#}", e);
                None
            }
        };

        let child = match self.command(preview.as_deref()).spawn() {
            Ok(child) => child,
            Err(e) => {
                if let Some(preview) = &preview {
                    let _ = std::fs::remove_file(preview);
                }
                return Err(e).with_context(|| format!("Failed to run {}", self.program));
            }
        };

        log::debug!("Opened annotation dialog for {}", image.display());
        Ok(Box::new(DialogWindow::from_child(child, preview)))
    }
}

/// A running dialog process
pub struct DialogWindow {
    child: Option<Child>,
    preview: Option<PathBuf>,
}

impl DialogWindow {
    pub fn from_child(child: Child, preview: Option<PathBuf>) -> Self {
        Self {
            child: Some(child),
            preview,
        }
    }

    fn remove_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            let _ = std::fs::remove_file(preview);
        }
    }
}

impl AnnotationWindow for DialogWindow {
    fn poll(&mut self) -> Result<Option<PromptResponse>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        let Some(status) = child.try_wait().context("Failed to poll dialog")? else {
            return Ok(None);
        };

        let mut reply = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_string(&mut reply)
                .context("Failed to read dialog reply")?;
        }
        self.child = None;
        self.remove_preview();

        // Cancel exits non-zero ("User canceled")
        if !status.success() {
            return Ok(Some(PromptResponse::cancel()));
        }

        let instructions = reply.strip_suffix('\n').unwrap_or(&reply).to_string();
        Ok(Some(PromptResponse::save(instructions)))
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.remove_preview();
    }
}

impl Drop for DialogWindow {
    fn drop(&mut self) {
        self.close();
    }
}
