//! The contract the agent SDK gives us (§4.G): streamed text deltas, tool
//! calls the runtime gates through `canUseTool`, a `Stop` hook, and the
//! ability to fork and resume sessions by opaque id. We don't own the
//! model loop — the SDK drives it — we only implement this trait's shape
//! against whatever concrete client library is wired in at the edge.

use async_trait::async_trait;
use tokio::sync::mpsc;
use warden_core::types::SessionId;

/// One increment of a streamed turn.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    ToolUse { id: String, name: String, input: serde_json::Value },
    Done { session_id: SessionId, stop_reason: StopReason },
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

/// A single live or forked agent session. `warden-discord` and the CLI
/// hold concrete implementations backed by whatever SDK client is
/// configured; this crate only depends on the shape.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Stream a prompt's response, publishing each [`StreamEvent`] to
    /// `tx` as it arrives. Resolves once the turn ends (`Done` or
    /// `Error` was the last event sent).
    async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<StreamEvent>) -> crate::Result<SessionId>;

    /// An independent clone of this session's context; turns run on the
    /// clone never affect this client's history (§4.G `create_forked_client`).
    fn fork(&self) -> Box<dyn SessionClient>;

    /// Ask the SDK to compact this session's running context (`compact_session`, §4.E).
    async fn compact(&self) -> crate::Result<()>;

    /// The session id this client last completed a turn under, if any.
    fn session_id(&self) -> Option<SessionId>;

    /// Tell this client which chat-surface channel its fork tools should
    /// notify, once it's known (§4.G — unknown at construction for the
    /// main client, since it's built before the owner's first DM). A
    /// no-op for clients with no notion of a channel.
    fn set_channel_id(&self, _channel_id: u64) {}
}

/// Run one turn on `client` without an interested listener, returning
/// the resulting session id (§4.G `run_on_client`). This is exactly what
/// a background fork needs: deltas are irrelevant unless a fork tool
/// (`ping_user`, `discord_embed`, `report_updates`) chose to surface
/// something through its own channel.
pub async fn run_on_client(client: &dyn SessionClient, prompt: &str) -> crate::Result<SessionId> {
    let (tx, mut rx) = mpsc::channel(32);
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let result = client.stream_chat(prompt, tx).await;
    let _ = drain.await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeClient {
        calls: Arc<AtomicUsize>,
        session_id: SessionId,
    }

    #[async_trait]
    impl SessionClient for FakeClient {
        async fn stream_chat(&self, prompt: &str, tx: mpsc::Sender<StreamEvent>) -> crate::Result<SessionId> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tx.send(StreamEvent::TextDelta(format!("echo: {prompt}"))).await.ok();
            tx.send(StreamEvent::Done {
                session_id: self.session_id.clone(),
                stop_reason: StopReason::EndTurn,
            })
            .await
            .ok();
            Ok(self.session_id.clone())
        }

        fn fork(&self) -> Box<dyn SessionClient> {
            Box::new(FakeClient {
                calls: Arc::new(AtomicUsize::new(0)),
                session_id: self.session_id.clone(),
            })
        }

        async fn compact(&self) -> crate::Result<()> {
            Ok(())
        }

        fn session_id(&self) -> Option<SessionId> {
            Some(self.session_id.clone())
        }
    }

    #[tokio::test]
    async fn run_on_client_drains_without_a_listener() {
        let client = FakeClient {
            calls: Arc::new(AtomicUsize::new(0)),
            session_id: SessionId::from("sess-1".to_string()),
        };
        let id = run_on_client(&client, "hello").await.unwrap();
        assert_eq!(id.as_str(), "sess-1");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
