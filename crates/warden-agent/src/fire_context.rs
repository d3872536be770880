//! Per-fire context threaded explicitly through tool handlers, rather
//! than reached for as process-wide globals: the fork state, an active
//! chain (if this fire is a link in one), the ping budget, the pending
//! updates queue, the entry this fire came from (needed to build a
//! follow-up reminder), and the channel to speak through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warden_budget::BudgetStore;
use warden_core::policy::ForkPolicy;
use warden_core::types::ShortId;
use warden_core::Clock;
use warden_fork::{ChainContext, ForkState};
use warden_inquiries::PendingUpdates;
use warden_schedule::ScheduleStore;
use tokio::sync::Mutex;

/// The fields a follow-up chain reminder inherits from the entry that
/// fired (§4.F: "inheriting all policy knobs and the `chain_parent` id
/// of the root").
#[derive(Debug, Clone)]
pub struct ChainSource {
    pub message: String,
    pub description: Option<String>,
    pub background: bool,
    pub skip_if_busy: bool,
    pub model: Option<String>,
    pub isolated: bool,
    pub thinking: bool,
    pub policy: ForkPolicy,
    pub chain_parent: ShortId,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to deliver message")]
    SendFailed,
}

/// What `enter_fork` leaves for the orchestrator to act on before the
/// next turn (§4.E: "Signals orchestrator to fork the next turn").
#[derive(Debug, Clone)]
pub struct EnterForkRequest {
    pub topic: Option<String>,
    pub idle_timeout_minutes: Option<u32>,
}

/// One `fields` entry of a `discord_embed` call.
#[derive(Debug, Clone)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// The body of a `discord_embed` call, borrowed for the duration of
/// `send_embed` so callers don't pay for a clone they don't need.
pub struct EmbedContent<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub color: Option<&'a str>,
    pub fields: &'a [EmbedField],
    pub footer: &'a str,
}

/// What `ping_user` and `discord_embed` actually speak through; a thin
/// seam so `warden-discord` supplies the concrete delivery and this
/// crate stays ignorant of serenity.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    async fn send_ping(&self, message: &str) -> Result<(), NotifyError>;
    async fn send_embed(&self, content: EmbedContent<'_>) -> Result<(), NotifyError>;
}

/// Everything a fire's tool handlers need, bundled so the loop passes
/// one reference instead of five.
pub struct FireContext {
    pub fork_state: Mutex<ForkState>,
    pub chain: Option<ChainContext>,
    pub chain_source: Option<ChainSource>,
    pub budget: BudgetStore,
    pub pending_updates: PendingUpdates,
    pub schedule: ScheduleStore,
    pub notify: Arc<dyn NotifyChannel>,
    pub clock: Arc<dyn Clock>,
    busy: AtomicBool,
    enter_fork_request: Mutex<Option<EnterForkRequest>>,
}

impl FireContext {
    pub fn new(
        budget: BudgetStore,
        pending_updates: PendingUpdates,
        schedule: ScheduleStore,
        notify: Arc<dyn NotifyChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            fork_state: Mutex::new(ForkState::Idle),
            chain: None,
            chain_source: None,
            budget,
            pending_updates,
            schedule,
            notify,
            clock,
            busy: AtomicBool::new(false),
            enter_fork_request: Mutex::new(None),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn set_busy(&self, value: bool) {
        self.busy.store(value, Ordering::SeqCst);
    }

    pub async fn request_enter_fork(&self, request: EnterForkRequest) {
        *self.enter_fork_request.lock().await = Some(request);
    }

    /// Drained by the orchestrator before starting the next turn.
    pub async fn take_enter_fork_request(&self) -> Option<EnterForkRequest> {
        self.enter_fork_request.lock().await.take()
    }
}
