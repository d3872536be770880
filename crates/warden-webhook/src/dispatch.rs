//! Seam between the HTTP layer and whatever owns the agent runtime and
//! background-fork execution, mirroring `warden_agent::NotifyChannel`'s
//! role for outbound pings.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch failed: {0}")]
    Failed(String),
}

/// Hands a rendered webhook prompt off to background-fork execution.
/// The handler fires this and returns 202 without waiting for the fork
/// to actually run — dispatch only needs to enqueue it.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, webhook_id: &str, prompt: String) -> Result<(), DispatchError>;
}
