// Markdown task log
//
// Task block format:
//   - [ ] Fix the login button
//     - Screenshot: `/path/to/screenshot.png`
//     - Added: 2024-01-01 10:00
//   <blank line>
//
// Tasks have no ids; completion matches the full text of the first pending task.

use crate::store::persistence::{atomic_write, with_file_lock};
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// First line of a freshly created task log
pub const TASKS_HEADER: &str = "# Tasks for Claude Code";

/// Timestamp format for the `Added:` line (local time, minute precision)
pub const ADDED_FORMAT: &str = "%Y-%m-%d %H:%M";

const PENDING_MARKER: &str = "- [ ] ";
const DONE_MARKER: &str = "- [x] ";

/// Checkbox line: captures (state)(text). Only the two exact markers count.
static TASK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^- \[([ x])\] (.*)$").expect("valid task regex"));

/// Detail line under a task: captures (label)(value)
static DETAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- (Screenshot|Added):(.*)$").expect("valid detail regex")
});

/// A line break plus the blanks around it; task text is kept on one line
static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\r?\n\s*").expect("valid line break regex"));

/// Fold multi-line instructions into the single line a checkbox can hold
pub fn single_line(text: &str) -> String {
    LINE_BREAK_RE.replace_all(text.trim(), " ").into_owned()
}

/// One entry of the task log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub text: String,
    pub completed: bool,
    pub screenshot: Option<String>,
    pub added: Option<String>,
}

impl Task {
    fn new(text: &str, completed: bool) -> Self {
        Self {
            text: text.trim().to_string(),
            completed,
            screenshot: None,
            added: None,
        }
    }

    /// Checkbox rendering used in listings
    pub fn checkbox(&self) -> &'static str {
        if self.completed {
            "[x]"
        } else {
            "[ ]"
        }
    }
}

/// Split a raw line into its checkbox state and text, if it is a task line
fn parse_task_line(line: &str) -> Option<(bool, &str)> {
    let caps = TASK_RE.captures(line)?;
    let completed = caps.get(1).map(|m| m.as_str() == "x").unwrap_or(false);
    let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((completed, text))
}

/// Parse task log content top to bottom
pub fn parse_tasks(content: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut current: Option<Task> = None;

    for raw in content.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some((completed, text)) = parse_task_line(line) {
            if let Some(task) = current.take() {
                tasks.push(task);
            }
            current = Some(Task::new(text, completed));
            continue;
        }

        let Some(task) = current.as_mut() else {
            continue;
        };

        if let Some(caps) = DETAIL_RE.captures(line.trim()) {
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            match caps.get(1).map(|m| m.as_str()) {
                Some("Screenshot") => task.screenshot = Some(value.trim_matches('`').to_string()),
                Some("Added") => task.added = Some(value.to_string()),
                _ => {}
            }
        }
    }

    if let Some(task) = current {
        tasks.push(task);
    }

    tasks
}

/// Render the block appended for a new task
pub fn format_task_block(instruction: &str, screenshot: Option<&str>, added: &str) -> String {
    let mut block = format!("{}{}\n", PENDING_MARKER, single_line(instruction));
    if let Some(path) = screenshot.filter(|p| !p.is_empty()) {
        block.push_str(&format!("  - Screenshot: `{}`\n", path));
    }
    block.push_str(&format!("  - Added: {}\n", added));
    block.push('\n');
    block
}

/// Result of flipping a task's checkbox inside raw content
#[derive(Debug)]
pub struct CompleteResult {
    pub content: String,
    pub task_found: bool,
}

/// Mark the first pending task whose full text equals `text` as done
///
/// Every other byte of `content` is preserved, including line endings.
pub fn complete_task_in_content(content: &str, text: &str) -> CompleteResult {
    let mut task_found = false;
    let mut updated = String::with_capacity(content.len());

    for raw in content.split_inclusive('\n') {
        if !task_found {
            let body = raw.trim_end_matches(['\n', '\r']);
            if let Some(rest) = body.strip_prefix(PENDING_MARKER) {
                if rest.trim_end() == text {
                    task_found = true;
                    updated.push_str(DONE_MARKER);
                    updated.push_str(&raw[PENDING_MARKER.len()..]);
                    continue;
                }
            }
        }
        updated.push_str(raw);
    }

    CompleteResult {
        content: updated,
        task_found,
    }
}

/// The markdown task ledger
#[derive(Debug, Clone)]
pub struct TaskLog {
    path: PathBuf,
}

impl TaskLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a task stamped with the current local time
    pub fn append(&self, instruction: &str, screenshot: Option<&str>) -> Result<String> {
        self.append_at(instruction, screenshot, Local::now().naive_local())
    }

    /// Append a task with an explicit timestamp and return the block written
    pub fn append_at(
        &self,
        instruction: &str,
        screenshot: Option<&str>,
        added: NaiveDateTime,
    ) -> Result<String> {
        let block = format_task_block(
            instruction,
            screenshot,
            &added.format(ADDED_FORMAT).to_string(),
        );

        with_file_lock(&self.path, || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open task log: {}", self.path.display()))?;

            let is_new = file
                .metadata()
                .map(|m| m.len() == 0)
                .with_context(|| format!("Failed to stat task log: {}", self.path.display()))?;

            let mut out = String::new();
            if is_new {
                out.push_str(TASKS_HEADER);
                out.push_str("\n\n");
            }
            out.push_str(&block);

            file.write_all(out.as_bytes())
                .with_context(|| format!("Failed to append to task log: {}", self.path.display()))
        })?;

        Ok(block)
    }

    /// Every task in file order; a missing file is an empty log
    pub fn list_all(&self) -> Result<Vec<Task>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_tasks(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read task log: {}", self.path.display())),
        }
    }

    /// Incomplete tasks in file order
    pub fn list_pending(&self) -> Result<Vec<Task>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|t| !t.completed)
            .collect())
    }

    /// Mark the first pending task with exactly this text as done
    pub fn complete(&self, text: &str) -> Result<bool> {
        let text = single_line(text);
        if text.is_empty() || !self.path.exists() {
            return Ok(false);
        }

        with_file_lock(&self.path, || {
            let content = fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read task log: {}", self.path.display()))?;

            let result = complete_task_in_content(&content, &text);
            if !result.task_found {
                return Ok(false);
            }

            atomic_write(&self.path, &result.content)?;
            Ok(true)
        })
    }
}
