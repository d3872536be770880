//! Agent session runtime (§4.G): the `SessionClient` contract the core
//! depends on from the upstream agent SDK — streamed text deltas, a
//! `canUseTool` hook, a `Stop` hook, and fork/resume by opaque session
//! id — plus the fork-tool contracts (§4.E, §4.F) and stop-hook
//! enforcement built on top of it. The SDK drives its own tool-calling
//! loop internally; this crate only supplies the hooks it calls into.

pub mod error;
pub mod fire_context;
pub mod gate;
pub mod runtime;
pub mod session;
pub mod stop_hook;
pub mod tools;

pub use error::{AgentError, Result};
pub use fire_context::{ChainSource, EmbedContent, EmbedField, EnterForkRequest, FireContext, NotifyChannel, NotifyError};
pub use gate::can_use_tool;
pub use runtime::{AgentLockGuard, AgentRuntime};
pub use session::{run_on_client, SessionClient, StopReason, StreamEvent};
pub use stop_hook::{check_stop_hook, StopVerdict};
