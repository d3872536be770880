//! Entry point. Bare `warden` starts the orchestrator (owner chat,
//! scheduler, webhooks); every other invocation is either an ops-facing
//! subcommand against the schedule store or one of the two hidden
//! subcommands `claude` itself spawns (`mcp-bridge`, `stop-hook`).

mod bridge_context;
mod cli;
mod claude_session;
mod commands;
mod control;
mod error;
mod mcp_bridge;
mod orchestrator;
mod pid;
mod stop_hook;

use clap::Parser;

use cli::{Cli, Command};
use error::Result;
use warden_core::WardenConfig;
use warden_schedule::ScheduleStore;

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        None => run_orchestrator(),
        Some(Command::McpBridge) => run_mcp_bridge(),
        Some(Command::StopHook) => stop_hook::run(),
        Some(Command::Reminder { action }) => run_with_schedule_store(|store| commands::reminder(store, action)),
        Some(Command::Routine { action }) => run_with_schedule_store(|store| commands::routine(store, action)),
        Some(Command::Webhook { action }) => run_with_schedule_store(|store| commands::webhook(store, action)),
    };

    if let Err(e) = result {
        eprintln!("warden: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn run_with_schedule_store(f: impl FnOnce(&ScheduleStore) -> Result<()>) -> Result<()> {
    let config = WardenConfig::load(None)?;
    let store = ScheduleStore::new(&config.state_dir);
    f(&store)
}

fn run_orchestrator() -> Result<()> {
    init_tracing();
    let config = WardenConfig::load(None)?;
    std::fs::create_dir_all(&config.state_dir)?;
    let _pid_guard = pid::PidGuard::acquire(&config.state_dir)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(orchestrator::run(config))
}

fn run_mcp_bridge() -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { mcp_bridge::run(mcp_bridge::BridgeArgs::from_env()?).await })
}
