//! Serenity event handler: owner detection (§4.L — "the chat surface's
//! application owner id is trusted; messages from other identities are
//! ignored"), message routing, and reaction-driven approval resolution.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serenity::all::ActivityData;
use serenity::model::channel::{Message, Reaction};
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::model::user::OnlineStatus;
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};
use warden_permissions::arbiter::{MessageId, PermissionArbiter};

use crate::ack::AckHandle;
use crate::adapter::{emoji_from_reaction, DiscordChannel};

/// What the orchestrator (the `warden` binary) does with an owner
/// message once it's been accepted. `channel` is the messageable target
/// to reply on; `content` is the mention-stripped message text.
#[async_trait]
pub trait MessageRouter: Send + Sync {
    async fn handle_message(&self, channel: Arc<DiscordChannel>, content: String);
}

pub struct DiscordHandler<R: MessageRouter + 'static> {
    arbiter: Arc<PermissionArbiter>,
    router: Arc<R>,
    status: String,
    activity: Option<(String, String)>,
    owner_id: OnceLock<UserId>,
}

impl<R: MessageRouter + 'static> DiscordHandler<R> {
    pub fn new(
        arbiter: Arc<PermissionArbiter>,
        router: Arc<R>,
        status: String,
        activity: Option<(String, String)>,
    ) -> Self {
        Self {
            arbiter,
            router,
            status,
            activity,
            owner_id: OnceLock::new(),
        }
    }
}

#[async_trait]
impl<R: MessageRouter + 'static> EventHandler for DiscordHandler<R> {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(name = %ready.user.name, "discord bot connected");

        match ctx.http.get_current_application_info().await {
            Ok(info) => {
                let owner_id = info.owner.as_ref().map(|o| o.id).unwrap_or(ready.user.id);
                self.owner_id.set(owner_id).ok();
                info!(owner_id = %owner_id, "discord: trusted owner identity resolved");
            }
            Err(e) => {
                warn!(error = %e, "discord: failed to resolve application owner, trusting nobody");
            }
        }

        let status = parse_online_status(&self.status);
        let presence_activity = self.activity.as_ref().map(|(kind, name)| build_activity(kind, name));
        ctx.set_presence(presence_activity, status);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(&owner_id) = self.owner_id.get() else {
            return;
        };
        if msg.author.id != owner_id {
            return;
        }

        let content = strip_mention(&msg.content).trim().to_string();
        if content.is_empty() {
            return;
        }

        let channel = Arc::new(DiscordChannel::new(Arc::clone(&ctx.http), msg.channel_id.get()));
        let mut ack = AckHandle::new(Arc::clone(&ctx.http), msg.channel_id, msg.id);
        ack.thinking().await;

        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.handle_message(channel, content).await;
            ack.done_ok().await;
        });
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        self.resolve_reaction(reaction).await;
    }
}

impl<R: MessageRouter + 'static> DiscordHandler<R> {
    async fn resolve_reaction(&self, reaction: Reaction) {
        let Some(user_id) = reaction.user_id else {
            return;
        };
        if Some(&user_id) != self.owner_id.get() {
            return;
        }
        let Some(emoji) = emoji_from_reaction(&reaction.emoji) else {
            return;
        };
        self.arbiter
            .resolve_approval(MessageId(reaction.message_id.get()), emoji)
            .await;
    }
}

/// Remove an @mention prefix (e.g. `<@123456789>`) from a message.
fn strip_mention(s: &str) -> &str {
    let trimmed = s.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<@") {
        if let Some(end) = rest.find('>') {
            return rest[end + 1..].trim_start();
        }
    }
    trimmed
}

fn parse_online_status(s: &str) -> OnlineStatus {
    match s.to_lowercase().as_str() {
        "idle" => OnlineStatus::Idle,
        "dnd" | "do_not_disturb" => OnlineStatus::DoNotDisturb,
        "invisible" => OnlineStatus::Invisible,
        _ => OnlineStatus::Online,
    }
}

fn build_activity(kind: &str, name: &str) -> ActivityData {
    match kind.to_lowercase().as_str() {
        "listening" => ActivityData::listening(name),
        "watching" => ActivityData::watching(name),
        "competing" => ActivityData::competing(name),
        "custom" => ActivityData::custom(name),
        _ => ActivityData::playing(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_mention_removes_leading_mention() {
        assert_eq!(strip_mention("<@123456789> hello there"), "hello there");
    }

    #[test]
    fn strip_mention_leaves_plain_text_alone() {
        assert_eq!(strip_mention("hello there"), "hello there");
    }

    #[test]
    fn parse_online_status_defaults_to_online() {
        assert_eq!(parse_online_status("bogus"), OnlineStatus::Online);
        assert_eq!(parse_online_status("idle"), OnlineStatus::Idle);
    }
}
