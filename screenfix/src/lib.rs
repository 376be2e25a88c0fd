// Per-user files shared by the daemon, the control service and the CLI
pub mod store;

// Image sources: clipboard watcher and hotkey-triggered region capture
pub mod capture;

// Annotation prompt and the save-or-discard step that follows it
pub mod annotation;

// Capture daemon state machine
pub mod daemon;

// Daemon launcher, tool handlers and the JSON-RPC stdio server
pub mod control;

pub mod logging;
