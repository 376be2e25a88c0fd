// Tool handlers behind `tools/call`
// Each handler reads the shared files fresh; nothing is cached between calls.

use super::launcher::DaemonLauncher;
use super::protocol::{Content, ToolReply};
use crate::capture::SourceKind;
use crate::store::config::Config;
use crate::store::screenshots::{read_base64, ScreenshotStore};
use crate::store::state::StateStore;
use crate::store::tasks::{Task, TaskLog};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed `tools/call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    StartDaemon,
    StopDaemon,
    GetStatus,
    GetLastScreenshot { include_image: bool },
    ListScreenshots { limit: usize },
    GetTasks { pending_only: bool },
    CompleteTask { task_text: String },
    ReadScreenshot { path: String },
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

#[derive(Deserialize)]
struct LastScreenshotArgs {
    #[serde(default = "default_true")]
    include_image: bool,
}

#[derive(Deserialize)]
struct ListScreenshotsArgs {
    #[serde(default = "default_limit")]
    limit: usize,
}

#[derive(Deserialize)]
struct GetTasksArgs {
    #[serde(default)]
    pending_only: bool,
}

#[derive(Deserialize)]
struct CompleteTaskArgs {
    task_text: String,
}

#[derive(Deserialize)]
struct ReadScreenshotArgs {
    path: String,
}

impl ToolCall {
    /// Parse a tool name and its JSON arguments (`null` means no arguments)
    pub fn from_params(name: &str, arguments: Value) -> Result<Self, ToolCallError> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };

        fn args<T: DeserializeOwned>(tool: &str, value: Value) -> Result<T, ToolCallError> {
            serde_json::from_value(value).map_err(|source| ToolCallError::InvalidArguments {
                tool: tool.to_string(),
                source,
            })
        }

        let call = match name {
            "start_daemon" => ToolCall::StartDaemon,
            "stop_daemon" => ToolCall::StopDaemon,
            "get_status" => ToolCall::GetStatus,
            "get_last_screenshot" => {
                let a: LastScreenshotArgs = args(name, arguments)?;
                ToolCall::GetLastScreenshot {
                    include_image: a.include_image,
                }
            }
            "list_screenshots" => {
                let a: ListScreenshotsArgs = args(name, arguments)?;
                ToolCall::ListScreenshots { limit: a.limit }
            }
            "get_tasks" => {
                let a: GetTasksArgs = args(name, arguments)?;
                ToolCall::GetTasks {
                    pending_only: a.pending_only,
                }
            }
            "complete_task" => {
                let a: CompleteTaskArgs = args(name, arguments)?;
                ToolCall::CompleteTask {
                    task_text: a.task_text,
                }
            }
            "read_screenshot" => {
                let a: ReadScreenshotArgs = args(name, arguments)?;
                ToolCall::ReadScreenshot { path: a.path }
            }
            other => return Err(ToolCallError::UnknownTool(other.to_string())),
        };
        Ok(call)
    }
}

/// Tool descriptors returned by `tools/list`
pub fn tools_list() -> Value {
    let no_args = json!({"type": "object", "properties": {}, "required": []});
    json!([
        {
            "name": "start_daemon",
            "description": format!("Start the ScreenFix daemon. {}", SourceKind::Clipboard.hint()),
            "inputSchema": no_args.clone(),
        },
        {
            "name": "stop_daemon",
            "description": "Stop the ScreenFix daemon",
            "inputSchema": no_args.clone(),
        },
        {
            "name": "get_status",
            "description": "Get ScreenFix status",
            "inputSchema": no_args.clone(),
        },
        {
            "name": "get_last_screenshot",
            "description": "Get the most recent screenshot with its image and related task",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "include_image": {
                        "type": "boolean",
                        "description": "Include image data",
                        "default": true
                    }
                },
                "required": []
            },
        },
        {
            "name": "list_screenshots",
            "description": "List all screenshots",
            "inputSchema": {
                "type": "object",
                "properties": {"limit": {"type": "integer", "minimum": 0, "default": DEFAULT_LIST_LIMIT}},
                "required": []
            },
        },
        {
            "name": "get_tasks",
            "description": "Get tasks from the task log",
            "inputSchema": {
                "type": "object",
                "properties": {"pending_only": {"type": "boolean", "default": false}},
                "required": []
            },
        },
        {
            "name": "complete_task",
            "description": "Mark a task as complete",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "task_text": {"type": "string", "description": "Task text to mark complete"}
                },
                "required": ["task_text"]
            },
        },
        {
            "name": "read_screenshot",
            "description": "Read a specific screenshot by path",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path to screenshot"}
                },
                "required": ["path"]
            },
        },
    ])
}

pub struct ControlService {
    state: StateStore,
    tasks: TaskLog,
    screenshots: ScreenshotStore,
    launcher: DaemonLauncher,
}

impl ControlService {
    pub fn new(config: &Config) -> Self {
        let paths = config.paths().clone();
        Self {
            state: StateStore::new(&paths.state_file),
            tasks: TaskLog::new(config.tasks_file()),
            screenshots: ScreenshotStore::new(config.save_directory()),
            launcher: DaemonLauncher::new(paths),
        }
    }

    pub async fn call(&self, call: ToolCall) -> ToolReply {
        match call {
            ToolCall::StartDaemon => outcome_reply(self.launcher.start().await),
            ToolCall::StopDaemon => outcome_reply(self.launcher.stop()),
            ToolCall::GetStatus => self.status(),
            ToolCall::GetLastScreenshot { include_image } => self.last_screenshot(include_image),
            ToolCall::ListScreenshots { limit } => self.list_screenshots(limit),
            ToolCall::GetTasks { pending_only } => self.get_tasks(pending_only),
            ToolCall::CompleteTask { task_text } => self.complete_task(&task_text),
            ToolCall::ReadScreenshot { path } => self.read_screenshot(&path),
        }
    }

    fn status(&self) -> ToolReply {
        let daemon = self.state.read();
        let screenshots = self.screenshots.list().len();
        let pending = match self.tasks.list_pending() {
            Ok(tasks) => tasks.len(),
            Err(e) => return ToolReply::error(format!("Failed to read tasks: {:#}", e)),
        };

        let mut lines = vec!["ScreenFix Status:".to_string()];
        if daemon.running {
            let pid = daemon.pid.map(|p| p.to_string()).unwrap_or_default();
            lines.push(format!("- Daemon: Running (PID: {})", pid));
            lines.push(format!(
                "- Listening: {}",
                if daemon.listening { "Yes" } else { "No" }
            ));
        } else {
            lines.push("- Daemon: Not running".to_string());
        }
        lines.push(format!("- Screenshots: {}", screenshots));
        lines.push(format!("- Pending tasks: {}", pending));
        if let Some(last) = &daemon.last_capture {
            match &daemon.last_capture_time {
                Some(at) => lines.push(format!("- Last capture: {} ({})", last, at)),
                None => lines.push(format!("- Last capture: {}", last)),
            }
        }

        let hint = SourceKind::from_state(daemon.source.as_deref()).hint();
        ToolReply::text(format!("{}\n\n{}", lines.join("\n"), hint))
    }

    fn last_screenshot(&self, include_image: bool) -> ToolReply {
        let Some(shot) = self.screenshots.last() else {
            let source = self.state.read().source;
            let hint = SourceKind::from_state(source.as_deref()).hint();
            return ToolReply::text(format!("No screenshots found. {}", hint));
        };
        let path = shot.display_path();

        let mut content = vec![Content::text(format!("Screenshot: {}", path))];

        if include_image {
            match read_base64(&shot.path) {
                Ok(data) => content.push(Content::png(data)),
                Err(e) => log::warn!("Skipping image for {}: {:#}", path, e),
            }
        }

        let related = self
            .tasks
            .list_all()
            .unwrap_or_default()
            .into_iter()
            .find(|task| task.screenshot.as_deref() == Some(path.as_str()));
        if let Some(task) = related {
            content.push(Content::text(format!(
                "\nTask: {}\nStatus: {}",
                task.text,
                if task.completed { "Done" } else { "Pending" }
            )));
        }

        ToolReply::new(content)
    }

    fn list_screenshots(&self, limit: usize) -> ToolReply {
        let shots = self.screenshots.list();
        if shots.is_empty() || limit == 0 {
            return ToolReply::text("No screenshots found.");
        }

        let mut lines = vec!["Screenshots:".to_string()];
        lines.extend(
            shots
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, shot)| format!("{}. {}", i + 1, shot.filename)),
        );
        ToolReply::text(lines.join("\n"))
    }

    fn get_tasks(&self, pending_only: bool) -> ToolReply {
        let listed = if pending_only {
            self.tasks.list_pending()
        } else {
            self.tasks.list_all()
        };
        let tasks = match listed {
            Ok(tasks) => tasks,
            Err(e) => return ToolReply::error(format!("Failed to read tasks: {:#}", e)),
        };

        ToolReply::text(format_task_list(&tasks))
    }

    fn complete_task(&self, task_text: &str) -> ToolReply {
        match self.tasks.complete(task_text) {
            Ok(true) => ToolReply::text(format!("Completed: {}", task_text)),
            Ok(false) => ToolReply::text(format!("Task not found: {}", task_text)),
            Err(e) => ToolReply::error(format!("Failed to update tasks: {:#}", e)),
        }
    }

    fn read_screenshot(&self, path: &str) -> ToolReply {
        if path.is_empty() || !Path::new(path).is_file() {
            return ToolReply::text(format!("Not found: {}", path));
        }

        match read_base64(Path::new(path)) {
            Ok(data) => ToolReply::new(vec![
                Content::text(format!("Screenshot: {}", path)),
                Content::png(data),
            ]),
            Err(e) => ToolReply::error(format!("{:#}", e)),
        }
    }
}

fn outcome_reply(outcome: super::launcher::ControlOutcome) -> ToolReply {
    if outcome.success {
        ToolReply::text(outcome.message)
    } else {
        ToolReply::error(outcome.message)
    }
}

/// Numbered task lines, or "No tasks found."
pub fn format_task_list(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }

    let mut lines = vec!["Tasks:".to_string()];
    lines.extend(
        tasks
            .iter()
            .enumerate()
            .map(|(i, task)| format!("{}. {} {}", i + 1, task.checkbox(), task.text)),
    );
    lines.join("\n")
}
