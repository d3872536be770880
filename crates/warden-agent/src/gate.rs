//! The `canUseTool` hook the agent SDK calls before every tool
//! invocation. The eight fork tools in [`crate::tools::fork_tools`] are
//! the pre-declared set a fork runs with — each enforces its own
//! allowed-in-mode rule internally — so they bypass the permission
//! arbiter entirely; every other tool name goes through
//! [`warden_permissions::PermissionArbiter::handle_tool_permission`].
//! A fork's `tool_filter` (§3.3) is applied earlier, when the toolset
//! offered to the SDK for that turn is built, not here.

use warden_fork::ForkState;
use warden_permissions::{ApprovalChannel, PermissionArbiter, PermissionResult};

const FORK_TOOLS: &[&str] = &[
    "ping_user",
    "discord_embed",
    "follow_up_chain",
    "save_context",
    "report_updates",
    "enter_fork",
    "exit_fork",
    "compact_session",
];

const MCP_WARDEN_PREFIX: &str = "mcp__warden__";

fn is_fork_tool(tool_name: &str) -> bool {
    let bare = tool_name.strip_prefix(MCP_WARDEN_PREFIX).unwrap_or(tool_name);
    FORK_TOOLS.contains(&bare)
}

pub async fn can_use_tool(
    arbiter: &PermissionArbiter,
    channel: &dyn ApprovalChannel,
    fork_state: &ForkState,
    tool_name: &str,
    input_json: &str,
) -> PermissionResult {
    if is_fork_tool(tool_name) {
        return PermissionResult::Allow;
    }
    arbiter
        .handle_tool_permission(channel, tool_name, input_json, fork_state.in_background())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use warden_permissions::{ChannelError, MessageId};

    struct DenyChannel;

    #[async_trait]
    impl ApprovalChannel for DenyChannel {
        async fn send_approval_request(&self, _label: &str) -> Result<MessageId, ChannelError> {
            Err(ChannelError::SendFailed)
        }
        async fn edit_message(&self, _id: MessageId, _content: String) {}
    }

    #[tokio::test]
    async fn fork_tools_bypass_the_arbiter_even_in_a_background_fork() {
        let arbiter = PermissionArbiter::new();
        let channel = DenyChannel;
        let result = can_use_tool(&arbiter, &channel, &ForkState::Idle, "ping_user", "{}").await;
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn fork_tools_bypass_under_their_mcp_prefixed_name_too() {
        let arbiter = PermissionArbiter::new();
        let channel = DenyChannel;
        let result = can_use_tool(&arbiter, &channel, &ForkState::Idle, "mcp__warden__ping_user", "{}").await;
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn generic_tools_go_through_the_arbiter() {
        let arbiter = PermissionArbiter::new();
        let channel = DenyChannel;
        let result = can_use_tool(&arbiter, &channel, &ForkState::Idle, "Bash", "{}").await;
        assert!(!result.is_allowed());
    }
}
