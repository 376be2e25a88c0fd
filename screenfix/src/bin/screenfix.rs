// screenfix: operator CLI for the capture daemon
//
// Commands:
//   screenfix status
//   screenfix start | stop
//   screenfix tasks [--pending]
//   screenfix complete <task text...>
//   screenfix screenshots [--limit N]
//   screenfix capture
//   screenfix config show | set-save-dir <path> | set-tasks-file <path>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use screenfix_lib::{
    control::{protocol::ToolReply, ControlService, DaemonLauncher, ToolCall},
    logging,
    store::config::Config,
};

#[derive(Parser)]
#[command(name = "screenfix")]
#[command(about = "Capture screenshots, annotate them and track the resulting tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon state, screenshot count and pending tasks
    Status,
    /// Start the capture daemon in the background
    Start,
    /// Stop the running capture daemon
    Stop,
    /// List tasks from the task log
    Tasks {
        /// Only show tasks that are not done yet
        #[arg(long)]
        pending: bool,
    },
    /// Mark the task with exactly this text as done
    Complete {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// List saved screenshots, newest first
    Screenshots {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Ask a daemon started with `--source hotkey` to capture a region now
    Capture,
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Set the directory screenshots are saved to
    SetSaveDir { path: String },
    /// Set the markdown file tasks are appended to
    SetTasksFile { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(log::LevelFilter::Warn);

    let mut config = Config::from_env();
    config.paths().ensure_dirs().with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config.paths().config_dir.display()
        )
    })?;

    let call = match cli.command {
        Commands::Status => ToolCall::GetStatus,
        Commands::Start => ToolCall::StartDaemon,
        Commands::Stop => ToolCall::StopDaemon,
        Commands::Tasks { pending } => ToolCall::GetTasks {
            pending_only: pending,
        },
        Commands::Complete { text } => ToolCall::CompleteTask {
            task_text: text.join(" "),
        },
        Commands::Screenshots { limit } => ToolCall::ListScreenshots { limit },
        Commands::Capture => return capture(&config),
        Commands::Config { action } => return configure(&mut config, action),
    };

    let service = ControlService::new(&config);
    let reply = service.call(call).await;
    print_reply(&reply);
    Ok(())
}

fn print_reply(reply: &ToolReply) {
    let text = reply.joined_text();
    if reply.is_error {
        eprintln!("{}", text);
        std::process::exit(1);
    }
    println!("{}", text);
}

fn capture(config: &Config) -> Result<()> {
    let outcome = DaemonLauncher::new(config.paths().clone()).capture();
    if !outcome.success {
        eprintln!("{}", outcome.message);
        std::process::exit(1);
    }
    println!("{}", outcome.message);
    Ok(())
}

fn configure(config: &mut Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Config file: {}", config.paths().config_file.display());
            println!("Save directory: {}", config.save_directory().display());
            println!("Tasks file: {}", config.tasks_file().display());
        }
        ConfigAction::SetSaveDir { path } => {
            config.set_save_directory(&path)?;
            println!("Save directory: {}", config.save_directory().display());
        }
        ConfigAction::SetTasksFile { path } => {
            config.set_tasks_file(&path)?;
            println!("Tasks file: {}", config.tasks_file().display());
        }
    }
    Ok(())
}
