//! Concrete `SessionClient` (§4.G) backed by the `claude` CLI binary
//! itself, shelled out to per turn. Grounded in the same
//! `tokio::process::Command` plumbing the teacher's `ClaudeCliProvider`
//! uses, but asking for `stream-json` output (so deltas are genuine,
//! not a post-hoc replay of one blob) and `--resume` (so fork/resume is
//! the CLI's own session continuation, not something we fake locally).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use warden_agent::session::{SessionClient, StopReason, StreamEvent};
use warden_agent::{AgentError, Result};
use warden_core::types::SessionId;

/// The eight fork tools (§4.E/§4.F), pre-approved for any fire running
/// with a bridge regardless of its own tool filter — see `build_command`.
const FORK_TOOL_NAMES: [&str; 8] = [
    "ping_user",
    "discord_embed",
    "follow_up_chain",
    "save_context",
    "report_updates",
    "enter_fork",
    "exit_fork",
    "compact_session",
];

/// Context for the `mcp-bridge` subcommand a fire's `claude` invocation
/// should be able to reach back into — handed across the process
/// boundary as environment variables on the MCP server's config entry,
/// since `--mcp-config` only lets us choose the bridge's command/args/env,
/// not hand it a live handle.
#[derive(Clone)]
pub struct BridgeConfig {
    pub state_dir: PathBuf,
    pub discord_token: String,
    /// Loopback address of the orchestrator's `control` server, handed to
    /// `mcp-bridge`'s `approve_tool_use` tool so an interactive
    /// permission prompt can reach the live `PermissionArbiter` even
    /// though the model loop itself runs out-of-process. `None` when this
    /// fire runs with `--dangerously-skip-permissions` or an explicit
    /// tool filter, where no prompt tool is registered at all.
    pub control_addr: Option<String>,
}

pub struct ClaudeCliClient {
    command: String,
    model: Option<String>,
    resume: Mutex<Option<String>>,
    last_session: Mutex<Option<SessionId>>,
    bridge: Option<BridgeConfig>,
    /// The Discord channel a fire's fork tools should speak through.
    /// Kept separate from `bridge` (rather than baked into
    /// `BridgeConfig`) because it isn't known until the owner's first DM
    /// arrives, well after this client is constructed at startup.
    channel_id: Mutex<u64>,
    allowed_tools: Vec<String>,
    blocked_tools: Vec<String>,
    dangerously_skip_permissions: bool,
    interactive_approval: bool,
}

impl ClaudeCliClient {
    pub fn new(command: String, model: Option<String>) -> Self {
        Self {
            command,
            model,
            resume: Mutex::new(None),
            last_session: Mutex::new(None),
            bridge: None,
            channel_id: Mutex::new(0),
            allowed_tools: Vec::new(),
            blocked_tools: Vec::new(),
            dangerously_skip_permissions: false,
            interactive_approval: false,
        }
    }

    pub fn resumed(command: String, model: Option<String>, session_id: &str) -> Self {
        Self {
            resume: Mutex::new(Some(session_id.to_string())),
            last_session: Mutex::new(Some(SessionId::from(session_id.to_string()))),
            ..Self::new(command, model)
        }
    }

    /// Point this client's fork tools at the `mcp-bridge` subcommand,
    /// handing it what it needs to rebuild a [`warden_agent::fire_context::FireContext`]
    /// and speak to the owner's channel.
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// The channel id a fire's fork tools should notify, learned once the
    /// owner's first DM arrives (`warden-core::config::WardenConfig` has
    /// no such field of its own — there is exactly one chat surface and
    /// it identifies itself, it isn't configured up front).
    pub fn with_channel_id(self, channel_id: u64) -> Self {
        *self.channel_id.lock().unwrap() = channel_id;
        self
    }

    pub fn set_channel_id(&self, channel_id: u64) {
        *self.channel_id.lock().unwrap() = channel_id;
    }

    /// Coarse stand-in for per-call interactive tool gating (see module
    /// docs): narrow the general SDK toolset for this invocation from a
    /// fire's `ToolFilter` before the model loop ever starts, since the
    /// `claude` CLI's own loop can't be paused mid-turn for an approval
    /// round-trip the way the SDK's `canUseTool` hook can.
    pub fn with_tool_filter(mut self, filter: &warden_core::policy::ToolFilter) -> Self {
        match filter {
            warden_core::policy::ToolFilter::Unrestricted => {}
            warden_core::policy::ToolFilter::Allow(tools) => self.allowed_tools = tools.clone(),
            warden_core::policy::ToolFilter::Block(tools) => self.blocked_tools = tools.clone(),
        }
        self
    }

    pub fn with_dangerously_skip_permissions(mut self, value: bool) -> Self {
        self.dangerously_skip_permissions = value;
        self
    }

    /// Register `mcp__warden__approve_tool_use` as this turn's
    /// `--permission-prompt-tool`, so a non-fork tool call blocks on the
    /// owner's Discord reaction rather than being silently allowed or
    /// silently refused. Only meaningful alongside `with_bridge` — the
    /// prompt tool needs `control_addr` to reach the arbiter.
    pub fn with_interactive_approval(mut self, value: bool) -> Self {
        self.interactive_approval = value;
        self
    }

    fn build_command(&self, prompt: &str) -> (Command, Vec<tempfile::NamedTempFile>) {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(session_id) = self.resume.lock().unwrap().clone() {
            cmd.arg("--resume").arg(session_id);
        }

        if self.bridge.is_some() {
            // The eight fork tools (§4.E) are the pre-declared set this
            // fire runs with, not "extras" a permission prompt should
            // gate — `gate::can_use_tool` bypasses them in the in-process
            // model, and the CLI needs the same bypass expressed as an
            // allowlist since `claude` itself decides whether to prompt.
            for tool in FORK_TOOL_NAMES {
                cmd.arg("--allowedTools").arg(format!("mcp__warden__{tool}"));
            }
        }

        if self.dangerously_skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        } else {
            for tool in &self.allowed_tools {
                cmd.arg("--allowedTools").arg(tool);
            }
            for tool in &self.blocked_tools {
                cmd.arg("--disallowedTools").arg(tool);
            }
            if self.interactive_approval {
                cmd.arg("--permission-prompt-tool").arg("mcp__warden__approve_tool_use");
            }
        }

        if let Some(bridge) = &self.bridge {
            // The Stop-hook runs as its own child process spawned by
            // `claude` directly, not through the MCP server, so it needs
            // its own copy of the state dir rather than relying on the
            // bridge's `--mcp-config` env map.
            cmd.env("WARDEN_BRIDGE_STATE_DIR", &bridge.state_dir);
        }

        let mut temp_files = Vec::new();
        if let Some(file) = self.write_mcp_config(&mut cmd) {
            temp_files.push(file);
        }
        if let Some(file) = self.write_settings(&mut cmd) {
            temp_files.push(file);
        }
        (cmd, temp_files)
    }

    /// Write the MCP bridge config to a temp file for `--mcp-config`.
    /// The returned handle must outlive the child process, since the
    /// path we gave `claude` only stays valid as long as the file does.
    fn write_mcp_config(&self, cmd: &mut Command) -> Option<tempfile::NamedTempFile> {
        let bridge = self.bridge.as_ref()?;
        let own_exe = std::env::current_exe().ok()?;
        let config = serde_json::json!({
            "mcpServers": {
                "warden": {
                    "type": "stdio",
                    "command": own_exe.to_string_lossy(),
                    "args": ["mcp-bridge"],
                    "env": {
                        "WARDEN_BRIDGE_STATE_DIR": bridge.state_dir.to_string_lossy(),
                        "WARDEN_BRIDGE_DISCORD_TOKEN": bridge.discord_token,
                        "WARDEN_BRIDGE_CHANNEL_ID": self.channel_id.lock().unwrap().to_string(),
                        "WARDEN_BRIDGE_CLAUDE_COMMAND": self.command,
                        "WARDEN_BRIDGE_SESSION_ID": self.resume.lock().unwrap().clone().unwrap_or_default(),
                        "WARDEN_BRIDGE_CONTROL_ADDR": bridge.control_addr.clone().unwrap_or_default(),
                    }
                }
            }
        });

        let file = tempfile::Builder::new()
            .prefix("warden-mcp-")
            .suffix(".json")
            .tempfile()
            .ok()?;
        std::fs::write(file.path(), serde_json::to_string(&config).ok()?).ok()?;
        cmd.arg("--mcp-config").arg(file.path());
        Some(file)
    }

    /// Register a Stop hook invoking this same binary's hidden
    /// `stop-hook` subcommand, per the real `claude` CLI's
    /// `--settings`-file hook mechanism: the child reads the turn's
    /// transcript on stdin and, to force another turn, prints
    /// `{"decision":"block","reason":...}` on stdout.
    fn write_settings(&self, cmd: &mut Command) -> Option<tempfile::NamedTempFile> {
        self.bridge.as_ref()?;
        let own_exe = std::env::current_exe().ok()?;
        let settings = serde_json::json!({
            "hooks": {
                "Stop": [
                    {
                        "matcher": "",
                        "hooks": [
                            {"type": "command", "command": format!("{} stop-hook", own_exe.to_string_lossy())}
                        ]
                    }
                ]
            }
        });

        let file = tempfile::Builder::new()
            .prefix("warden-settings-")
            .suffix(".json")
            .tempfile()
            .ok()?;
        std::fs::write(file.path(), serde_json::to_string(&settings).ok()?).ok()?;
        cmd.arg("--settings").arg(file.path());
        Some(file)
    }

    async fn run_turn(&self, prompt: &str, tx: &mpsc::Sender<StreamEvent>) -> Result<SessionId> {
        let (mut command, _temp_files) = self.build_command(prompt);
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::Session(format!("claude CLI not found at '{}'", self.command))
            } else {
                AgentError::Session(format!("failed to spawn claude CLI: {e}"))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Session("claude CLI gave no stdout pipe".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut final_session: Option<SessionId> = None;
        let mut stop_reason = StopReason::EndTurn;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AgentError::Session(format!("reading claude CLI stdout: {e}")))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let event: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, line = %line, "skipping malformed stream-json line");
                    continue;
                }
            };
            if let Some((session_id, reason)) = self.handle_event(&event, tx).await {
                final_session = Some(session_id);
                stop_reason = reason;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AgentError::Session(format!("claude CLI process error: {e}")))?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                use tokio::io::AsyncReadExt;
                let _ = err.read_to_string(&mut stderr).await;
            }
            let _ = tx.send(StreamEvent::Error(stderr.clone())).await;
            return Err(AgentError::Session(format!(
                "claude CLI exited with status {status}: {stderr}"
            )));
        }

        let session_id = final_session.ok_or_else(|| {
            AgentError::Session("claude CLI stream ended without a result event".to_string())
        })?;

        *self.resume.lock().unwrap() = Some(session_id.as_str().to_string());
        *self.last_session.lock().unwrap() = Some(session_id.clone());

        let _ = tx
            .send(StreamEvent::Done {
                session_id: session_id.clone(),
                stop_reason,
            })
            .await;

        Ok(session_id)
    }

    /// Translate one `stream-json` line into zero or more `StreamEvent`s.
    /// Returns the session id and stop reason once a terminal `result`
    /// event is seen.
    async fn handle_event(
        &self,
        event: &Value,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Option<(SessionId, StopReason)> {
        match event.get("type").and_then(Value::as_str) {
            Some("assistant") => {
                let content = event.pointer("/message/content")?.as_array()?;
                for block in content {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                let _ = tx.send(StreamEvent::TextDelta(text.to_string())).await;
                            }
                        }
                        Some("tool_use") => {
                            let id = block.get("id").and_then(Value::as_str).unwrap_or("").to_string();
                            let name = block.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                            let input = block.get("input").cloned().unwrap_or(Value::Null);
                            let _ = tx.send(StreamEvent::ToolUse { id, name, input }).await;
                        }
                        _ => {}
                    }
                }
                None
            }
            Some("result") => {
                let session_id = event.get("session_id").and_then(Value::as_str)?.to_string();
                let stop_reason = match event.get("subtype").and_then(Value::as_str) {
                    Some("success") => StopReason::EndTurn,
                    _ => StopReason::ToolUse,
                };
                Some((SessionId::from(session_id), stop_reason))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl SessionClient for ClaudeCliClient {
    async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<StreamEvent>) -> Result<SessionId> {
        self.run_turn(prompt, &tx).await
    }

    fn fork(&self) -> Box<dyn SessionClient> {
        let resume = self.resume.lock().unwrap().clone();
        Box::new(ClaudeCliClient {
            command: self.command.clone(),
            model: self.model.clone(),
            resume: Mutex::new(resume.clone()),
            last_session: Mutex::new(resume.map(SessionId::from)),
            bridge: self.bridge.clone(),
            channel_id: Mutex::new(*self.channel_id.lock().unwrap()),
            allowed_tools: self.allowed_tools.clone(),
            blocked_tools: self.blocked_tools.clone(),
            dangerously_skip_permissions: self.dangerously_skip_permissions,
            interactive_approval: self.interactive_approval,
        })
    }

    async fn compact(&self) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(8);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        self.run_turn("/compact", &tx).await?;
        drop(tx);
        let _ = drain.await;
        Ok(())
    }

    fn session_id(&self) -> Option<SessionId> {
        self.last_session.lock().unwrap().clone()
    }

    fn set_channel_id(&self, channel_id: u64) {
        ClaudeCliClient::set_channel_id(self, channel_id);
    }
}
