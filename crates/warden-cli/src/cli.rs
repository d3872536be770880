//! Argument parsing. Bare `warden` starts the orchestrator; everything
//! else is an ops-facing subcommand against the schedule store.

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "warden", about = "A single-owner Discord companion bot")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage one-shot reminders.
    Reminder {
        #[command(subcommand)]
        action: ReminderCommand,
    },
    /// Manage recurring routines.
    Routine {
        #[command(subcommand)]
        action: RoutineCommand,
    },
    /// Inspect configured webhooks.
    Webhook {
        #[command(subcommand)]
        action: WebhookCommand,
    },
    /// Run as the MCP stdio bridge for a single `claude` CLI invocation.
    /// Never invoked directly — `claude_session::write_mcp_config` spawns
    /// this process itself and hands it configuration through
    /// `WARDEN_BRIDGE_*` environment variables rather than flags.
    #[command(hide = true)]
    McpBridge,
    /// Run as the `claude` CLI's Stop hook for a single turn. Never
    /// invoked directly — `claude_session::write_settings` registers this
    /// subcommand itself; `claude` spawns it after every turn and reads
    /// its stdout for a block decision.
    #[command(hide = true, name = "stop-hook")]
    StopHook,
}

#[derive(Debug, Subcommand)]
pub enum ReminderCommand {
    Add(ReminderAdd),
    List,
    Cancel { id: String },
}

#[derive(Debug, Subcommand)]
pub enum RoutineCommand {
    Add(RoutineAdd),
    List,
    Cancel { id: String },
}

#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    List,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum UpdateMainSessionArg {
    Always,
    OnPing,
    Freely,
    Blocked,
}

#[derive(Debug, Args)]
pub struct ReminderAdd {
    /// Minutes from now the reminder should fire.
    #[arg(long)]
    pub delay_minutes: i64,

    #[arg(short = 'm', long)]
    pub message: String,

    #[arg(long)]
    pub background: bool,

    #[arg(long, default_value_t = 3)]
    pub max_chain: u32,

    #[arg(long, default_value_t = 0)]
    pub chain_depth: u32,

    #[arg(long)]
    pub chain_parent: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub no_thinking: bool,

    #[arg(long)]
    pub isolated: bool,

    #[arg(long, value_enum)]
    pub update_main_session: Option<UpdateMainSessionArg>,

    #[arg(long)]
    pub no_ping: bool,

    #[arg(long, value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    pub blocked_tools: Option<Vec<String>>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, Args)]
pub struct RoutineAdd {
    #[arg(long)]
    pub cron: String,

    #[arg(short = 'm', long)]
    pub message: String,

    #[arg(long)]
    pub background: bool,

    #[arg(long, overrides_with = "no_skip_if_busy")]
    pub skip_if_busy: bool,

    #[arg(long, overrides_with = "skip_if_busy")]
    pub no_skip_if_busy: bool,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub isolated: bool,

    #[arg(long)]
    pub description: Option<String>,
}
