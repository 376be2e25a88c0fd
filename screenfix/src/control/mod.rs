// Control surface: daemon start/stop, tool handlers and the JSON-RPC stdio server

pub mod launcher;
pub mod protocol;
pub mod server;
pub mod service;

pub use launcher::{ControlOutcome, DaemonLauncher};
pub use service::{ControlService, ToolCall};
