// Filesystem-backed stores shared by the daemon, the control service and the CLI
// The only medium between processes is the files these modules read and write.

pub mod config;
pub mod persistence;
pub mod screenshots;
pub mod state;
pub mod tasks;

pub use config::{AppPaths, Config};
pub use screenshots::{Screenshot, ScreenshotStore};
pub use state::{DaemonStatus, StateStore, StateUpdate};
pub use tasks::{Task, TaskLog};
