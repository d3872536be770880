//! MCP stdio server exposing the eight fork tools (§4.E, §4.F) to the
//! `claude` CLI. Protocol: JSON-RPC 2.0, one object per line over
//! stdin/stdout, discovered by `claude` via `--mcp-config`. Grounded
//! directly in the teacher's own `mcp_bridge.rs`, generalized from a
//! single-process SQLite handle to the file-backed stores and the
//! `FireDescriptor`/`FireSignal` handoff this workspace's tools need.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use warden_agent::fire_context::FireContext;
use warden_agent::tools::fork_tools::{
    CompactSessionTool, DiscordEmbedTool, EnterForkTool, ExitForkTool, FollowUpChainTool, PingUserTool,
    ReportUpdatesTool, SaveContextTool,
};
use warden_agent::tools::{Tool, ToolError};
use warden_budget::BudgetStore;
use warden_core::types::ShortId;
use warden_core::SystemClock;
use warden_discord::adapter::DiscordChannel;
use warden_fork::{BackgroundFork, ChainContext, ForkExitAction, ForkState, InteractiveFork};
use warden_inquiries::PendingUpdates;
use warden_schedule::ScheduleStore;

use crate::bridge_context::{ChainSourceDescriptor, FireDescriptor, FireKind, FireSignal};
use crate::claude_session::ClaudeCliClient;
use crate::error::Result;

pub struct BridgeArgs {
    pub state_dir: PathBuf,
    pub discord_token: String,
    pub channel_id: u64,
    pub claude_command: String,
    pub session_id: Option<String>,
    /// Loopback address of the orchestrator's `control` server. Only
    /// `Some` when this fire registered `--permission-prompt-tool`
    /// (`claude_session::ClaudeCliClient::with_interactive_approval`);
    /// absent for background/dangerously-skip-permissions fires, where
    /// `approve_tool_use` is never called in the first place.
    pub control_addr: Option<String>,
}

impl BridgeArgs {
    /// Rebuild the args this subprocess was launched with from the
    /// `WARDEN_BRIDGE_*` environment variables `claude_session::write_mcp_config`
    /// set on the MCP server entry. Empty strings stand in for `None` —
    /// env values can't be absent the way a `--flag` can be omitted.
    pub fn from_env() -> Result<Self> {
        let state_dir = std::env::var("WARDEN_BRIDGE_STATE_DIR")
            .map_err(|_| crate::error::CliError::InvalidArgument("WARDEN_BRIDGE_STATE_DIR not set".into()))?;
        let discord_token = std::env::var("WARDEN_BRIDGE_DISCORD_TOKEN").unwrap_or_default();
        let channel_id = std::env::var("WARDEN_BRIDGE_CHANNEL_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let claude_command = std::env::var("WARDEN_BRIDGE_CLAUDE_COMMAND").unwrap_or_else(|_| "claude".to_string());
        let session_id = std::env::var("WARDEN_BRIDGE_SESSION_ID").ok().filter(|s| !s.is_empty());
        let control_addr = std::env::var("WARDEN_BRIDGE_CONTROL_ADDR").ok().filter(|s| !s.is_empty());

        Ok(Self {
            state_dir: PathBuf::from(state_dir),
            discord_token,
            channel_id,
            claude_command,
            session_id,
            control_addr,
        })
    }
}

/// Runs until stdin closes (the `claude` process tore the MCP server
/// down along with itself).
pub async fn run(args: BridgeArgs) -> Result<()> {
    let ctx = Arc::new(build_fire_context(&args)?);

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                write_response(&mut stdout, json!(null), Some(rpc_error(-32700, &format!("parse error: {e}"))), None).await?;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let is_notification = request.get("id").is_none();
        let method = request.get("method").and_then(Value::as_str).unwrap_or("");

        match method {
            "initialize" => {
                write_response(
                    &mut stdout,
                    id,
                    None,
                    Some(json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "warden", "version": env!("CARGO_PKG_VERSION")},
                    })),
                )
                .await?;
            }
            "notifications/initialized" => {}
            "tools/list" => {
                write_response(&mut stdout, id, None, Some(json!({"tools": tool_definitions()}))).await?;
            }
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(json!({}));
                let name = params.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                let input = params.get("arguments").cloned().unwrap_or(json!({}));
                let result = execute_tool(&ctx, &args, &name, input).await;
                {
                    let state = ctx.fork_state.lock().await;
                    if let Err(e) = crate::bridge_context::write_fork_state_snapshot(&args.state_dir, &state) {
                        tracing::warn!(error = %e, "failed to persist fork state snapshot for stop-hook");
                    }
                }
                match result {
                    Ok(text) => {
                        write_response(&mut stdout, id, None, Some(json!({"content": [{"type": "text", "text": text}], "isError": false}))).await?;
                    }
                    Err(text) => {
                        write_response(&mut stdout, id, None, Some(json!({"content": [{"type": "text", "text": text}], "isError": true}))).await?;
                    }
                }
            }
            _ => {
                if !is_notification {
                    write_response(&mut stdout, id, Some(rpc_error(-32601, &format!("method not found: {method}"))), None).await?;
                }
            }
        }
    }

    Ok(())
}

fn build_fire_context(args: &BridgeArgs) -> Result<FireContext> {
    let descriptor = FireDescriptor::read(&crate::bridge_context::fire_context_path(&args.state_dir))?
        .unwrap_or_else(|| FireDescriptor::idle(false));

    let http = Arc::new(serenity::http::Http::new(&args.discord_token));
    let notify = Arc::new(DiscordChannel::new(http, args.channel_id));

    let mut ctx = FireContext::new(
        BudgetStore::new(args.state_dir.join("ping_budget.json")),
        PendingUpdates::new(args.state_dir.join("pending_updates.json")),
        ScheduleStore::new(&args.state_dir),
        notify,
        Arc::new(SystemClock),
    );

    match &descriptor.kind {
        FireKind::Idle => {}
        FireKind::Background { policy } => {
            *ctx.fork_state.get_mut() = ForkState::Background(BackgroundFork::new(policy.clone()));
        }
        FireKind::Interactive { idle_timeout_minutes } => {
            *ctx.fork_state.get_mut() = ForkState::Interactive(InteractiveFork::new(*idle_timeout_minutes, 0));
        }
    }
    ctx.set_busy(descriptor.busy);

    if let (Some(depth), Some(max)) = (descriptor.chain_depth, descriptor.max_chain) {
        ctx.chain = ChainContext::new(depth, max).ok();
    }
    ctx.chain_source = descriptor.chain_source.as_ref().map(chain_source_from_descriptor);

    Ok(ctx)
}

fn chain_source_from_descriptor(d: &ChainSourceDescriptor) -> warden_agent::fire_context::ChainSource {
    warden_agent::fire_context::ChainSource {
        message: d.message.clone(),
        description: d.description.clone(),
        background: d.background,
        skip_if_busy: d.skip_if_busy,
        model: d.model.clone(),
        isolated: d.isolated,
        thinking: d.thinking,
        policy: d.policy.clone(),
        chain_parent: ShortId::from(d.chain_parent.clone()),
    }
}

async fn execute_tool(ctx: &Arc<FireContext>, args: &BridgeArgs, name: &str, input: Value) -> std::result::Result<String, String> {
    let outcome: std::result::Result<String, ToolError> = match name {
        "ping_user" => PingUserTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0),
        "discord_embed" => DiscordEmbedTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0),
        "follow_up_chain" => FollowUpChainTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0),
        "report_updates" => {
            let result = ReportUpdatesTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0);
            if result.is_ok() {
                let state = ctx.fork_state.lock().await;
                match &*state {
                    ForkState::Background(bg) if bg.reported => {
                        let _ = crate::bridge_context::write_signal(&args.state_dir, &FireSignal::Report);
                    }
                    // An interactive fork's report_updates doubles as its
                    // exit: the summary is already durably queued in
                    // PendingUpdates above, so the orchestrator only needs
                    // to know to tear the fork down.
                    ForkState::Interactive(fg) if fg.exit_action == ForkExitAction::Report => {
                        let _ = crate::bridge_context::write_signal(&args.state_dir, &FireSignal::Exit);
                    }
                    _ => {}
                }
            }
            result
        }
        "save_context" => {
            let result = SaveContextTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0);
            if result.is_ok() {
                let _ = crate::bridge_context::write_signal(&args.state_dir, &FireSignal::Save);
            }
            result
        }
        "exit_fork" => {
            let result = ExitForkTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0);
            if result.is_ok() {
                let _ = crate::bridge_context::write_signal(&args.state_dir, &FireSignal::Exit);
            }
            result
        }
        "enter_fork" => {
            let result = EnterForkTool { ctx: ctx.clone() }.handle(input).await.map(|o| o.0);
            if result.is_ok() {
                if let Some(req) = ctx.take_enter_fork_request().await {
                    let _ = crate::bridge_context::write_signal(
                        &args.state_dir,
                        &FireSignal::EnterFork { topic: req.topic, idle_timeout_minutes: req.idle_timeout_minutes },
                    );
                }
            }
            result
        }
        "compact_session" => {
            let idle = matches!(&*ctx.fork_state.lock().await, ForkState::Idle);
            if !idle {
                return Err("denied: compact_session is only allowed outside a fork".to_string());
            }
            return compact_via_nested_cli(args).await;
        }
        "approve_tool_use" => return approve_tool_use(ctx, args, input).await,
        _ => Err(ToolError::Invalid(format!("unknown tool: {name}"))),
    };

    outcome.map_err(|e| e.to_string())
}

/// The `--permission-prompt-tool` target: `claude` calls this, with the
/// real tool name/input it's about to run, whenever it wants to use
/// something other than the eight fork tools. Round-trips to the
/// orchestrator's control server, which holds the live
/// `PermissionArbiter` and Discord channel this subprocess has no direct
/// access to.
///
/// Response shape follows the SDK's `--permission-prompt-tool` contract:
/// `{"behavior": "allow"|"deny", ...}`.
async fn approve_tool_use(ctx: &Arc<FireContext>, args: &BridgeArgs, input: Value) -> std::result::Result<String, String> {
    let Some(control_addr) = &args.control_addr else {
        return Ok(json!({"behavior": "deny", "message": "no control channel configured for this fire"}).to_string());
    };
    let tool_name = input.get("tool_name").and_then(Value::as_str).unwrap_or("").to_string();
    let tool_input = input.get("input").cloned().unwrap_or(json!({}));
    let in_background = matches!(&*ctx.fork_state.lock().await, ForkState::Background(_));

    match crate::control::request(control_addr, &tool_name, tool_input.clone(), in_background).await {
        Ok((true, _)) => Ok(json!({"behavior": "allow", "updatedInput": tool_input}).to_string()),
        Ok((false, message)) => Ok(json!({"behavior": "deny", "message": message}).to_string()),
        Err(e) => Ok(json!({"behavior": "deny", "message": format!("control channel unreachable: {e}")}).to_string()),
    }
}

async fn compact_via_nested_cli(args: &BridgeArgs) -> std::result::Result<String, String> {
    let Some(session_id) = &args.session_id else {
        return Err("no active session to compact".to_string());
    };
    let client = ClaudeCliClient::resumed(args.claude_command.clone(), None, session_id);
    client.compact().await.map(|_| "compacted".to_string()).map_err(|e| e.to_string())
}

fn rpc_error(code: i32, message: &str) -> Value {
    json!({"code": code, "message": message})
}

async fn write_response(
    stdout: &mut (impl AsyncWriteExt + Unpin),
    id: Value,
    error: Option<Value>,
    result: Option<Value>,
) -> Result<()> {
    let response = if let Some(err) = error {
        json!({"jsonrpc": "2.0", "id": id, "error": err})
    } else {
        json!({"jsonrpc": "2.0", "id": id, "result": result.unwrap_or(Value::Null)})
    };
    let mut text = serde_json::to_vec(&response)?;
    text.push(b'\n');
    stdout.write_all(&text).await?;
    stdout.flush().await?;
    Ok(())
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "ping_user",
            "description": "Send a short proactive message to the owner from a background fork.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "critical": {"type": "boolean", "default": false}
                },
                "required": ["message"]
            }
        }),
        json!({
            "name": "discord_embed",
            "description": "Send a rich embed to the owner from a background fork. Use for task lists, digests, or any structured data.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "color": {"type": "string", "description": "blue, green, red, or yellow"},
                    "fields": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "value": {"type": "string"},
                                "inline": {"type": "boolean"}
                            },
                            "required": ["name", "value"]
                        }
                    },
                    "critical": {"type": "boolean", "default": false}
                },
                "required": ["title"]
            }
        }),
        json!({
            "name": "follow_up_chain",
            "description": "Schedule a follow-up reminder inheriting this fire's policy, one link further into the chain.",
            "inputSchema": {
                "type": "object",
                "properties": {"minutes_from_now": {"type": "integer"}},
                "required": ["minutes_from_now"]
            }
        }),
        json!({
            "name": "save_context",
            "description": "Promote this interactive fork to become the main session once it exits.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "report_updates",
            "description": "Record a summary to surface on the main session.",
            "inputSchema": {
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }
        }),
        json!({
            "name": "enter_fork",
            "description": "Request that the next turn run in an interactive fork.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "idle_timeout_minutes": {"type": "integer"}
                }
            }
        }),
        json!({
            "name": "exit_fork",
            "description": "Exit the current interactive fork without promoting it.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "compact_session",
            "description": "Compact the persistent session's running context.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "approve_tool_use",
            "description": "Internal permission-prompt target; not for direct model use.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tool_name": {"type": "string"},
                    "input": {"type": "object"}
                },
                "required": ["tool_name", "input"]
            }
        }),
    ]
}
