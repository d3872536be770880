//! The chat-surface adapter: a [`DiscordChannel`] speaking the three
//! abstract contracts the core depends on (`ApprovalChannel`,
//! `MessageSink`, `NotifyChannel`), and a [`DiscordAdapter`] that owns
//! the gateway connection and reconnects whenever it drops — the bot is
//! always online.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::builder::{CreateMessage, EditMessage};
use serenity::model::channel::ReactionType;
use serenity::model::gateway::GatewayIntents;
use serenity::model::id::ChannelId as SerenityChannelId;
use serenity::Client;
use tracing::{error, info, warn};
use warden_agent::fire_context::{EmbedContent, NotifyChannel, NotifyError};
use warden_permissions::arbiter::{ApprovalChannel, ChannelError, MessageId, PermissionArbiter};
use warden_streamer::{MessageHandle, MessageSink};

use crate::embed::build_embed;
use crate::error::DiscordError;
use crate::handler::{DiscordHandler, MessageRouter};
use crate::send;

/// Single messageable target: the owner's DM channel or a guild channel
/// they've pointed the bot at. There is exactly one live target per
/// process (§4.D "channel: ref to current messageable target").
pub struct DiscordChannel {
    http: Arc<serenity::http::Http>,
    channel_id: SerenityChannelId,
}

impl DiscordChannel {
    pub fn new(http: Arc<serenity::http::Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: SerenityChannelId::new(channel_id),
        }
    }

    /// The raw channel id, so callers that only get an `Arc<DiscordChannel>`
    /// (background-fire dispatch, webhook dispatch) can remember where to
    /// send things without reaching back into serenity's types.
    pub fn channel_id(&self) -> u64 {
        self.channel_id.get()
    }
}

#[async_trait]
impl ApprovalChannel for DiscordChannel {
    async fn send_approval_request(&self, label: &str) -> Result<MessageId, ChannelError> {
        let msg = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().content(label))
            .await
            .map_err(|_| ChannelError::SendFailed)?;

        for emoji in [APPROVE_EMOJI, DENY_EMOJI, ALWAYS_EMOJI] {
            let _ = self
                .http
                .create_reaction(self.channel_id, msg.id, &ReactionType::Unicode(emoji.to_string()))
                .await;
        }

        Ok(MessageId(msg.id.get()))
    }

    async fn edit_message(&self, id: MessageId, content: String) {
        let target = serenity::model::id::MessageId::new(id.0);
        let _ = self
            .channel_id
            .edit_message(&self.http, target, EditMessage::new().content(content))
            .await;
    }
}

#[async_trait]
impl MessageSink for DiscordChannel {
    async fn send(&self, content: &str) -> MessageHandle {
        match self.channel_id.say(&self.http, content).await {
            Ok(msg) => MessageHandle(msg.id.get()),
            Err(e) => {
                warn!(error = %e, "discord: failed to send message");
                MessageHandle(0)
            }
        }
    }

    async fn edit(&self, handle: MessageHandle, content: &str) {
        let target = serenity::model::id::MessageId::new(handle.0);
        let _ = self
            .channel_id
            .edit_message(&self.http, target, EditMessage::new().content(content))
            .await;
    }

    async fn typing(&self) {
        let _ = self.channel_id.broadcast_typing(&self.http).await;
    }
}

#[async_trait]
impl NotifyChannel for DiscordChannel {
    async fn send_ping(&self, message: &str) -> Result<(), NotifyError> {
        send::send_chunked(&self.http, self.channel_id, message)
            .await
            .map_err(|_| NotifyError::SendFailed)
    }

    async fn send_embed(&self, content: EmbedContent<'_>) -> Result<(), NotifyError> {
        let embed = build_embed(&content);
        self.channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
            .map(|_| ())
            .map_err(|_| NotifyError::SendFailed)
    }
}

const APPROVE_EMOJI: &str = "\u{2705}"; // ✅
const DENY_EMOJI: &str = "\u{274c}"; // ❌
const ALWAYS_EMOJI: &str = "\u{267e}\u{fe0f}"; // ♾️

/// Map a reaction's unicode emoji back to the [`warden_permissions::arbiter::Emoji`]
/// it represents, `None` for anything else (e.g. unrelated reactions on
/// the same message).
pub fn emoji_from_reaction(reaction: &ReactionType) -> Option<warden_permissions::arbiter::Emoji> {
    use warden_permissions::arbiter::Emoji;
    match reaction {
        ReactionType::Unicode(s) if s == APPROVE_EMOJI => Some(Emoji::Approve),
        ReactionType::Unicode(s) if s == DENY_EMOJI => Some(Emoji::Deny),
        ReactionType::Unicode(s) if s == ALWAYS_EMOJI => Some(Emoji::Always),
        _ => None,
    }
}

/// Drives the gateway connection for the lifetime of the process,
/// reconnecting whenever it drops.
pub struct DiscordAdapter<R: MessageRouter + 'static> {
    token: String,
    arbiter: Arc<PermissionArbiter>,
    router: Arc<R>,
    status: String,
    activity: Option<(String, String)>,
}

impl<R: MessageRouter + 'static> DiscordAdapter<R> {
    pub fn new(token: impl Into<String>, arbiter: Arc<PermissionArbiter>, router: Arc<R>) -> Self {
        Self {
            token: token.into(),
            arbiter,
            router,
            status: "online".to_string(),
            activity: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_activity(mut self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.activity = Some((kind.into(), name.into()));
        self
    }

    /// Never returns — runs for the lifetime of the process. Logs and
    /// returns immediately if no token was configured.
    pub async fn run(self) {
        if self.token.trim().is_empty() {
            error!("discord: {}", DiscordError::NoToken);
            return;
        }

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MESSAGE_REACTIONS;

        let mut client = loop {
            match self.build_client(intents).await {
                Ok(c) => break c,
                Err(e) => {
                    error!("discord: initial connect failed ({e}), retrying in 30s");
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            }
        };

        loop {
            info!("discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!("discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("discord: gateway stopped cleanly, reconnecting in 5s");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;

            client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("discord: reconnect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, DiscordError> {
        let handler = DiscordHandler::new(
            Arc::clone(&self.arbiter),
            Arc::clone(&self.router),
            self.status.clone(),
            self.activity.clone(),
        );
        Ok(Client::builder(&self.token, intents).event_handler(handler).await?)
    }
}
