//! `warden-discord` — the chat-surface adapter (§2 crate layout): a
//! serenity-backed implementation of the abstract messaging/approval
//! contracts the core depends on (`ApprovalChannel`, `MessageSink`,
//! `NotifyChannel`), plus owner detection and reaction-driven approval
//! resolution. Everything past that contract — embed rendering, button
//! wiring beyond reactions — is explicitly out of scope (§1 non-goals).

pub mod ack;
pub mod adapter;
pub mod embed;
pub mod error;
pub mod handler;
pub mod send;

pub use adapter::{DiscordAdapter, DiscordChannel};
pub use error::DiscordError;
pub use handler::{DiscordHandler, MessageRouter};
