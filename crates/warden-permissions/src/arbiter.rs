//! Reactive permission arbiter (§4.D): the `canUseTool` gate for the
//! agent runtime. Background forks are denied outright; `dont_ask` mode
//! resolves instantly from the session-allow set; everything else goes
//! through an interactive approval round-trip on the chat surface.
//!
//! Uses `tokio::sync::Notify` + `tokio::time::timeout` rather than a raw
//! `Future` + `select!`: the cooperative single-threaded runtime this
//! shares with the rest of the process (§5) needs the wakeup to survive
//! being resolved from an entirely different task (the reaction-add
//! handler) without leaving the waiting task in a broken state.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;

use crate::format::format_tool_label;

const APPROVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Opaque handle to the message carrying the approval reactions.
/// Concrete chat-surface ids (Discord snowflakes, etc.) convert into
/// this via `From`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub u64);

impl From<u64> for MessageId {
    fn from(v: u64) -> Self {
        MessageId(v)
    }
}

/// The three reactions a pending approval message accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emoji {
    Approve,
    Deny,
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionResult {
    Allow,
    Deny { message: String },
}

impl PermissionResult {
    pub fn deny(message: impl Into<String>) -> Self {
        PermissionResult::Deny { message: message.into() }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionResult::Allow)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to send approval request")]
    SendFailed,
}

/// The chat-surface operations the arbiter needs; implemented by
/// `warden-discord`'s channel adapter. Edits are best-effort: a failure
/// is swallowed rather than propagated, mirroring the original's
/// `contextlib.suppress(discord.DiscordException)`.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn send_approval_request(&self, label: &str) -> Result<MessageId, ChannelError>;
    async fn edit_message(&self, id: MessageId, content: String);
}

struct PendingApproval {
    notify: Notify,
    result: StdMutex<Option<Emoji>>,
}

/// Per-session permission state: the dont-ask flag, the session-allow
/// set, and any approvals currently awaiting a reaction.
pub struct PermissionArbiter {
    dont_ask: AtomicBool,
    session_allowed: Mutex<HashSet<String>>,
    pending: Mutex<HashMap<MessageId, Arc<PendingApproval>>>,
}

impl Default for PermissionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionArbiter {
    pub fn new() -> Self {
        Self {
            dont_ask: AtomicBool::new(true),
            session_allowed: Mutex::new(HashSet::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn dont_ask(&self) -> bool {
        self.dont_ask.load(Ordering::SeqCst)
    }

    pub fn set_dont_ask(&self, value: bool) {
        self.dont_ask.store(value, Ordering::SeqCst);
    }

    pub async fn is_session_allowed(&self, tool_name: &str) -> bool {
        self.session_allowed.lock().await.contains(tool_name)
    }

    pub async fn session_allow(&self, tool_name: &str) {
        self.session_allowed.lock().await.insert(tool_name.to_string());
    }

    /// Resolve a pending approval from the reaction-add handler. Safe to
    /// call for an id with no pending approval (already resolved, or
    /// never existed) — it's just a no-op.
    pub async fn resolve_approval(&self, message_id: MessageId, emoji: Emoji) {
        let pending = self.pending.lock().await;
        if let Some(entry) = pending.get(&message_id) {
            let mut result = entry.result.lock().unwrap();
            if result.is_none() {
                *result = Some(emoji);
                entry.notify.notify_one();
            }
        }
    }

    /// Wake every pending approval with no emoji set, so each resolves
    /// to a cancelled-deny instead of hanging until its timeout.
    pub async fn cancel_pending(&self) {
        let mut pending = self.pending.lock().await;
        for entry in pending.values() {
            entry.notify.notify_one();
        }
        pending.clear();
    }

    /// Clear the session-allow set and cancel all pending approvals.
    pub async fn reset(&self) {
        self.cancel_pending().await;
        self.session_allowed.lock().await.clear();
    }

    /// Send the approval request, wait for a reaction or a 60s timeout,
    /// and resolve to the matching [`PermissionResult`].
    pub async fn request_approval(
        &self,
        channel: &dyn ApprovalChannel,
        tool_name: &str,
        input_json: &str,
    ) -> PermissionResult {
        if self.is_session_allowed(tool_name).await {
            return PermissionResult::Allow;
        }

        let label = format_tool_label(tool_name, input_json);

        let message_id = match channel.send_approval_request(&format!("`{label}`")).await {
            Ok(id) => id,
            Err(_) => return PermissionResult::deny("failed to send approval request"),
        };

        let entry = Arc::new(PendingApproval {
            notify: Notify::new(),
            result: StdMutex::new(None),
        });
        self.pending.lock().await.insert(message_id, entry.clone());

        let outcome = timeout(APPROVAL_TIMEOUT, entry.notify.notified()).await;
        self.pending.lock().await.remove(&message_id);

        if outcome.is_err() {
            channel
                .edit_message(message_id, format!("~~`{label}`~~ — timed out"))
                .await;
            return PermissionResult::deny("approval timed out");
        }

        let emoji = *entry.result.lock().unwrap();
        match emoji {
            None => {
                channel
                    .edit_message(message_id, format!("~~`{label}`~~ — cancelled"))
                    .await;
                PermissionResult::deny("approval cancelled")
            }
            Some(Emoji::Approve) => {
                channel.edit_message(message_id, format!("`{label}` — allowed")).await;
                PermissionResult::Allow
            }
            Some(Emoji::Always) => {
                self.session_allow(tool_name).await;
                channel
                    .edit_message(message_id, format!("`{label}` — always allowed"))
                    .await;
                PermissionResult::Allow
            }
            Some(Emoji::Deny) => {
                channel.edit_message(message_id, format!("`{label}` — denied")).await;
                PermissionResult::deny("denied via Discord")
            }
        }
    }

    /// The full `canUseTool` gate: bg forks are refused outright;
    /// `dont_ask` mode is silent allow-or-deny from the session set;
    /// otherwise an interactive approval round-trip runs.
    pub async fn handle_tool_permission(
        &self,
        channel: &dyn ApprovalChannel,
        tool_name: &str,
        input_json: &str,
        in_bg_fork: bool,
    ) -> PermissionResult {
        if in_bg_fork {
            return PermissionResult::deny(format!("{tool_name} is not allowed"));
        }
        if self.dont_ask() {
            return if self.is_session_allowed(tool_name).await {
                PermissionResult::Allow
            } else {
                PermissionResult::deny(format!("{tool_name} is not allowed"))
            };
        }
        self.request_approval(channel, tool_name, input_json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdSyncMutex;

    struct FakeChannel {
        next_id: StdSyncMutex<u64>,
        edits: StdSyncMutex<Vec<(MessageId, String)>>,
    }

    impl FakeChannel {
        fn new() -> Self {
            Self {
                next_id: StdSyncMutex::new(1),
                edits: StdSyncMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ApprovalChannel for FakeChannel {
        async fn send_approval_request(&self, _label: &str) -> Result<MessageId, ChannelError> {
            let mut n = self.next_id.lock().unwrap();
            let id = MessageId(*n);
            *n += 1;
            Ok(id)
        }

        async fn edit_message(&self, id: MessageId, content: String) {
            self.edits.lock().unwrap().push((id, content));
        }
    }

    #[tokio::test]
    async fn bg_fork_is_denied_without_touching_the_channel() {
        let arbiter = PermissionArbiter::new();
        let channel = FakeChannel::new();
        let result = arbiter
            .handle_tool_permission(&channel, "Bash", "{}", true)
            .await;
        assert_eq!(result, PermissionResult::deny("Bash is not allowed"));
        assert!(channel.edits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dont_ask_mode_denies_unlisted_tools_silently() {
        let arbiter = PermissionArbiter::new();
        assert!(arbiter.dont_ask());
        let channel = FakeChannel::new();
        let result = arbiter
            .handle_tool_permission(&channel, "Bash", "{}", false)
            .await;
        assert_eq!(result, PermissionResult::deny("Bash is not allowed"));
    }

    #[tokio::test]
    async fn dont_ask_mode_allows_session_allowed_tools() {
        let arbiter = PermissionArbiter::new();
        arbiter.session_allow("Bash").await;
        let channel = FakeChannel::new();
        let result = arbiter
            .handle_tool_permission(&channel, "Bash", "{}", false)
            .await;
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn approve_reaction_resolves_to_allow() {
        let arbiter = Arc::new(PermissionArbiter::new());
        let channel = Arc::new(FakeChannel::new());

        let a = arbiter.clone();
        let c = channel.clone();
        let handle = tokio::spawn(async move { a.request_approval(c.as_ref(), "Bash", "{}").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        arbiter.resolve_approval(MessageId(1), Emoji::Approve).await;

        let result = handle.await.unwrap();
        assert!(result.is_allowed());
    }

    #[tokio::test]
    async fn always_reaction_allows_and_session_allows_future_calls() {
        let arbiter = Arc::new(PermissionArbiter::new());
        arbiter.set_dont_ask(false);
        let channel = Arc::new(FakeChannel::new());

        let a = arbiter.clone();
        let c = channel.clone();
        let handle = tokio::spawn(async move { a.request_approval(c.as_ref(), "Bash", "{}").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        arbiter.resolve_approval(MessageId(1), Emoji::Always).await;
        let result = handle.await.unwrap();
        assert!(result.is_allowed());
        assert!(arbiter.is_session_allowed("Bash").await);
    }

    #[tokio::test]
    async fn cancel_pending_resolves_waiters_to_cancelled_deny() {
        let arbiter = Arc::new(PermissionArbiter::new());
        let channel = Arc::new(FakeChannel::new());

        let a = arbiter.clone();
        let c = channel.clone();
        let handle = tokio::spawn(async move { a.request_approval(c.as_ref(), "Bash", "{}").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        arbiter.cancel_pending().await;

        let result = handle.await.unwrap();
        assert_eq!(result, PermissionResult::deny("approval cancelled"));
    }
}
