//! Loopback approval bridge: lets a `claude` CLI subprocess's tool calls
//! route through the in-process [`PermissionArbiter`] and the live
//! Discord channel, even though the model loop itself runs in a child
//! process rather than behind an in-process `canUseTool` hook.
//!
//! The orchestrator binds an ephemeral TCP port on loopback and writes it
//! to `.control_port` under the state directory; `claude` is launched
//! with `--permission-prompt-tool mcp__warden__approve_tool_use`, and
//! that tool (in `mcp_bridge.rs`) is the only caller of [`request`].
//! Protocol is the same one-JSON-object-per-line shape `mcp_bridge.rs`
//! already speaks over stdio, just carried over a socket instead.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use warden_permissions::PermissionArbiter;

use crate::error::Result;

/// The one messageable target in the process, set before each agent
/// fire (§4.D "channel: ref to current messageable target") and read by
/// the control server when an approval round-trip needs somewhere to
/// post to.
pub type SharedChannel = Arc<RwLock<Option<Arc<dyn warden_permissions::ApprovalChannel>>>>;

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    tool_name: String,
    input: serde_json::Value,
    /// Whether the fire asking for approval is a background fork (§4.D
    /// rule 1: "If in background fork: deny" — extras outside the
    /// pre-declared fork toolset are refused outright, never prompted).
    in_background: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    allow: bool,
    message: String,
}

/// Bind an ephemeral loopback port and persist it to `.control_port` so
/// the `mcp-bridge` subprocess (launched after this returns) can find
/// it. Returns the bound address.
pub async fn bind(state_dir: &Path) -> Result<(TcpListener, String)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let addr_str = addr.to_string();
    std::fs::write(state_dir.join(".control_port"), &addr_str)?;
    Ok((listener, addr_str))
}

/// Serve approval requests forever. Each connection is one request/response;
/// a new connection is opened per tool call rather than kept alive, since
/// calls are rare and infrequent enough that connection setup cost doesn't
/// matter and it sidesteps any need for request framing beyond newlines.
pub async fn serve(listener: TcpListener, arbiter: Arc<PermissionArbiter>, channel: SharedChannel) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "control: accept failed");
                continue;
            }
        };
        let arbiter = arbiter.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, arbiter, channel).await {
                tracing::warn!(error = %e, "control: connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, arbiter: Arc<PermissionArbiter>, channel: SharedChannel) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let Some(line) = lines.next_line().await? else {
        return Ok(());
    };
    let request: Request = match serde_json::from_str(&line) {
        Ok(r) => r,
        Err(e) => {
            let response = Response { allow: false, message: format!("malformed request: {e}") };
            write_response(&mut write_half, &response).await?;
            return Ok(());
        }
    };

    let input_json = request.input.to_string();
    let guard = channel.read().await;
    let response = match guard.as_ref() {
        Some(channel) => {
            let result = arbiter
                .handle_tool_permission(channel.as_ref(), &request.tool_name, &input_json, request.in_background)
                .await;
            match result {
                warden_permissions::PermissionResult::Allow => Response { allow: true, message: "allowed".into() },
                warden_permissions::PermissionResult::Deny { message } => Response { allow: false, message },
            }
        }
        None => Response { allow: false, message: "no active channel to request approval on".into() },
    };
    drop(guard);

    write_response(&mut write_half, &response).await
}

async fn write_response(write_half: &mut (impl AsyncWriteExt + Unpin), response: &Response) -> Result<()> {
    let mut bytes = serde_json::to_vec(response)?;
    bytes.push(b'\n');
    write_half.write_all(&bytes).await?;
    write_half.flush().await?;
    Ok(())
}

/// Client side, called from the `mcp-bridge` subprocess's `approve_tool_use`
/// tool handler.
pub async fn request(
    control_addr: &str,
    tool_name: &str,
    input: serde_json::Value,
    in_background: bool,
) -> std::result::Result<(bool, String), String> {
    let stream = TcpStream::connect(control_addr).await.map_err(|e| e.to_string())?;
    let (read_half, mut write_half) = stream.into_split();

    let request = Request { tool_name: tool_name.to_string(), input, in_background };
    let mut bytes = serde_json::to_vec(&request).map_err(|e| e.to_string())?;
    bytes.push(b'\n');
    write_half.write_all(&bytes).await.map_err(|e| e.to_string())?;
    write_half.flush().await.map_err(|e| e.to_string())?;

    let mut lines = BufReader::new(read_half).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "control server closed the connection without a response".to_string())?;
    let response: Response = serde_json::from_str(&line).map_err(|e| e.to_string())?;
    Ok((response.allow, response.message))
}
