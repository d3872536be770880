//! `stop-hook` subcommand: registered with `claude` as the turn's Stop
//! hook (`claude_session::write_settings`), spawned fresh after every
//! turn. Reads the [`ForkStateSnapshot`] the `mcp-bridge` subcommand left
//! behind and prints the SDK's block-decision JSON on stdout, or nothing
//! at all when the turn is free to end.

use crate::bridge_context;
use crate::error::{CliError, Result};

pub fn run() -> Result<()> {
    let state_dir = std::env::var("WARDEN_BRIDGE_STATE_DIR")
        .map_err(|_| CliError::InvalidArgument("WARDEN_BRIDGE_STATE_DIR not set".into()))?;
    let state_dir = std::path::PathBuf::from(state_dir);

    let snapshot = bridge_context::read_fork_state_snapshot(&state_dir)?;
    let fork_state = snapshot.map(|s| s.to_fork_state()).unwrap_or(warden_fork::ForkState::Idle);

    match warden_agent::check_stop_hook(&fork_state) {
        warden_agent::StopVerdict::Pass => {}
        warden_agent::StopVerdict::Block(reason) => {
            println!("{}", serde_json::json!({"decision": "block", "reason": reason}));
        }
    }
    Ok(())
}
