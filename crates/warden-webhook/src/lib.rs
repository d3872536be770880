//! HTTP webhook ingress (§4.K, §6.3): a small axum service that turns
//! authenticated, validated, screened payloads into background-fork
//! prompts via [`dispatch::WebhookDispatcher`].

pub mod auth;
pub mod dispatch;
pub mod handler;
pub mod screen;
pub mod validate;

pub use dispatch::{DispatchError, WebhookDispatcher};
pub use handler::{router, WebhookState};
