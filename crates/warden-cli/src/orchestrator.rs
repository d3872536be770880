//! Ties every other module together into the running process (§4.D,
//! §4.L): the owner's one Discord channel, the scheduler's fires, and
//! webhook dispatches all funnel through here, each acquiring the same
//! `AgentRuntime` lock a chat turn would. The orchestrator is the one
//! thing in the process that remembers which channel to speak to across
//! turns — `warden-discord` hands us a fresh [`DiscordChannel`] on every
//! incoming message rather than holding one itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use futures_util::{future, StreamExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use warden_agent::session::{SessionClient, StreamEvent};
use warden_agent::AgentRuntime;
use warden_budget::BudgetStore;
use warden_core::clock::{Clock, SystemClock};
use warden_core::policy::ForkPolicy;
use warden_core::types::SessionId;
use warden_core::WardenConfig;
use warden_discord::adapter::DiscordChannel;
use warden_discord::handler::MessageRouter;
use warden_fork::InteractiveFork;
use warden_inquiries::PendingUpdates;
use warden_permissions::PermissionArbiter;
use warden_schedule::{Fire, Reminder, Routine, ScheduleStore};
use warden_storage::sessions::SessionStore;
use warden_streamer::stream_to_channel;
use warden_webhook::DispatchError;

use crate::bridge_context::{self, ChainSourceDescriptor, FireDescriptor, FireKind, FireSignal};
use crate::claude_session::{BridgeConfig, ClaudeCliClient};
use crate::control;
use crate::error::Result;

/// An interactive fork currently holding the owner's conversation, kept
/// alive across multiple owner turns and multiple `claude` invocations
/// (§4.E: the subprocess itself can't track idle time across its own
/// exits, so this struct is the one thing that can).
struct ActiveFork {
    client: Arc<dyn SessionClient>,
    state: InteractiveFork,
}

pub struct Orchestrator {
    config: WardenConfig,
    runtime: Arc<AgentRuntime>,
    schedule: Arc<ScheduleStore>,
    sessions: SessionStore,
    control_addr: String,
    timezone: Tz,
    channel: RwLock<Option<Arc<DiscordChannel>>>,
    approval_channel: control::SharedChannel,
    channel_id: AtomicU64,
    active_fork: AsyncMutex<Option<ActiveFork>>,
}

impl Orchestrator {
    pub fn new(
        config: WardenConfig,
        runtime: Arc<AgentRuntime>,
        schedule: Arc<ScheduleStore>,
        sessions: SessionStore,
        approval_channel: control::SharedChannel,
        control_addr: String,
        timezone: Tz,
    ) -> Self {
        Self {
            config,
            runtime,
            schedule,
            sessions,
            control_addr,
            timezone,
            channel: RwLock::new(None),
            approval_channel,
            channel_id: AtomicU64::new(0),
            active_fork: AsyncMutex::new(None),
        }
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            state_dir: self.config.state_dir.clone(),
            discord_token: self.config.discord_token.clone(),
            control_addr: Some(self.control_addr.clone()),
        }
    }

    fn budget_store(&self) -> BudgetStore {
        BudgetStore::new(self.config.state_dir.join("ping_budget.json"))
    }

    fn pending_updates(&self) -> PendingUpdates {
        PendingUpdates::new(self.config.state_dir.join("pending_updates.json"))
    }

    async fn channel(&self) -> Option<Arc<DiscordChannel>> {
        self.channel.read().await.clone()
    }

    /// Remember `channel` as the current messageable target and forward
    /// it everywhere a fire might need to reach the owner: the control
    /// server's approval round-trip, and the main client's fork tools.
    async fn adopt_channel(&self, channel: Arc<DiscordChannel>) {
        self.channel_id.store(channel.channel_id(), Ordering::SeqCst);
        self.runtime.set_channel_id(channel.channel_id());
        *self.approval_channel.write().await = Some(channel.clone() as Arc<dyn warden_permissions::ApprovalChannel>);
        *self.channel.write().await = Some(channel);
    }

    async fn current_main_session(&self) -> Option<String> {
        self.sessions.current().ok().flatten().map(|r| r.session_id)
    }

    async fn record_initial_session(&self, session_id: &SessionId) {
        if self.sessions.current().ok().flatten().is_none() {
            if let Err(e) = self.sessions.record_created(session_id.as_str(), None, Utc::now()) {
                warn!(error = %e, "recording initial session");
            }
        }
    }

    async fn record_promotion(&self, session_id: &SessionId, parent: Option<&str>) {
        if let Err(e) = self.sessions.record_promoted(session_id.as_str(), parent, Utc::now()) {
            warn!(error = %e, "recording session promotion");
        }
    }

    fn write_fire_descriptor(&self, descriptor: &FireDescriptor) {
        if let Err(e) = descriptor.write(&bridge_context::fire_context_path(&self.config.state_dir)) {
            warn!(error = %e, "writing fire descriptor");
        }
        let _ = bridge_context::take_signal(&self.config.state_dir);
    }

    fn interactive_descriptor(&self, idle_timeout_minutes: u32) -> FireDescriptor {
        FireDescriptor {
            kind: FireKind::Interactive { idle_timeout_minutes },
            busy: false,
            chain_depth: None,
            max_chain: None,
            chain_source: None,
        }
    }

    fn build_fire_client(
        &self,
        model: Option<&str>,
        isolated: bool,
        policy: &ForkPolicy,
        resume_session: Option<String>,
    ) -> ClaudeCliClient {
        let model = model.map(str::to_string).or_else(|| self.config.claude_model.clone());
        let client = match resume_session.filter(|_| !isolated) {
            Some(session_id) => ClaudeCliClient::resumed(self.config.claude_command.clone(), model, &session_id),
            None => ClaudeCliClient::new(self.config.claude_command.clone(), model),
        };
        client
            .with_bridge(self.bridge_config())
            .with_tool_filter(&policy.tool_filter)
            .with_interactive_approval(true)
            .with_channel_id(self.channel_id.load(Ordering::SeqCst))
    }

    /// Pull whatever reports background forks queued up since the last
    /// main-session turn and fold them into the owner's message (§3.4).
    async fn prepend_pending_updates(&self, content: &str) -> String {
        let updates = match self.pending_updates().pop_all() {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "draining pending updates");
                return content.to_string();
            }
        };
        if updates.is_empty() {
            return content.to_string();
        }
        let mut preamble = String::from("UPDATES FROM BACKGROUND FORKS SINCE YOUR LAST TURN:\n");
        for update in &updates {
            preamble.push_str(&format!("- [{}] {}\n", update.timestamp.to_rfc3339(), update.message));
        }
        format!("{preamble}\n{content}")
    }

    // --- turn execution --------------------------------------------------

    async fn run_main_turn(&self, channel: Option<&Arc<DiscordChannel>>, prompt: &str) -> Result<SessionId> {
        let session_id = match channel {
            Some(channel) => stream_turn_on(self.runtime.as_ref(), channel, prompt).await?,
            None => {
                let (tx, mut rx) = mpsc::channel(32);
                let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
                let id = self.runtime.stream_chat(prompt, tx).await?;
                let _ = drain.await;
                id
            }
        };
        self.record_initial_session(&session_id).await;
        Ok(session_id)
    }

    async fn run_foreground_fire(&self, prompt: &str) -> Result<()> {
        self.write_fire_descriptor(&FireDescriptor::idle(false));
        let channel = self.channel().await;
        self.run_main_turn(channel.as_ref(), prompt).await?;
        match channel {
            Some(channel) => self.handle_main_turn_signal(&channel).await,
            None => {
                if let Ok(Some(_)) = bridge_context::take_signal(&self.config.state_dir) {
                    warn!("dropped a fire signal: no chat channel is attached yet");
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_background_fire(
        &self,
        policy: &ForkPolicy,
        model: Option<&str>,
        isolated: bool,
        busy: bool,
        chain: Option<(u32, u32, ChainSourceDescriptor)>,
        prompt: &str,
    ) {
        let resume = self.current_main_session().await;
        let client = self.build_fire_client(model, isolated, policy, resume);
        let (chain_depth, max_chain, chain_source) = match chain {
            Some((depth, max, source)) => (Some(depth), Some(max), Some(source)),
            None => (None, None, None),
        };
        let descriptor = FireDescriptor {
            kind: FireKind::Background { policy: policy.clone() },
            busy,
            chain_depth,
            max_chain,
            chain_source,
        };
        self.write_fire_descriptor(&descriptor);
        if let Err(e) = warden_agent::run_on_client(&client, prompt).await {
            warn!(error = %e, "background fire failed");
        }
    }

    // --- owner chat turns --------------------------------------------------

    async fn handle_owner_turn(&self, channel: Arc<DiscordChannel>, content: String) {
        self.adopt_channel(channel.clone()).await;
        let _guard = self.runtime.lock().await;

        let active = self.active_fork.lock().await.take();
        if let Some(mut active) = active {
            let now_ms = SystemClock.monotonic_ms();
            active.state.touch_activity(now_ms);
            active.state.clear_prompted();
            self.write_fire_descriptor(&self.interactive_descriptor(active.state.idle_timeout_minutes));
            if let Err(e) = stream_turn(active.client.as_ref(), &channel, &content).await {
                warn!(error = %e, "interactive fork turn failed");
            }
            self.conclude_interactive_turn(active).await;
            return;
        }

        let content = self.prepend_pending_updates(&content).await;
        self.write_fire_descriptor(&FireDescriptor::idle(false));
        match self.run_main_turn(Some(&channel), &content).await {
            Ok(_) => self.handle_main_turn_signal(&channel).await,
            Err(e) => warn!(error = %e, "main chat turn failed"),
        }
    }

    async fn handle_main_turn_signal(&self, channel: &Arc<DiscordChannel>) {
        match bridge_context::take_signal(&self.config.state_dir) {
            Ok(Some(FireSignal::EnterFork { topic, idle_timeout_minutes })) => {
                self.enter_interactive_fork(topic, idle_timeout_minutes.unwrap_or(10), channel).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "reading fire signal"),
        }
    }

    async fn enter_interactive_fork(&self, topic: Option<String>, idle_timeout_minutes: u32, channel: &Arc<DiscordChannel>) {
        let client: Arc<dyn SessionClient> = Arc::from(self.runtime.create_forked_client());
        client.set_channel_id(self.channel_id.load(Ordering::SeqCst));
        let now_ms = SystemClock.monotonic_ms();
        let state = InteractiveFork::new(idle_timeout_minutes, now_ms);
        let active = ActiveFork { client, state };

        self.write_fire_descriptor(&self.interactive_descriptor(idle_timeout_minutes));
        let prompt = warden_prompt::assemble::fork_started_prompt(topic.as_deref().unwrap_or("(no topic given)"));
        if let Err(e) = stream_turn(active.client.as_ref(), channel, &prompt).await {
            warn!(error = %e, "interactive fork start turn failed");
        }
        self.conclude_interactive_turn(active).await;
    }

    async fn conclude_interactive_turn(&self, active: ActiveFork) {
        match bridge_context::take_signal(&self.config.state_dir) {
            Ok(Some(FireSignal::Save)) => {
                let parent = self.current_main_session().await;
                if let Some(session_id) = active.client.session_id() {
                    self.runtime.swap_client(active.client, session_id.clone());
                    self.record_promotion(&session_id, parent.as_deref()).await;
                }
                info!("interactive fork saved back to the main session");
            }
            Ok(Some(FireSignal::Report)) | Ok(Some(FireSignal::Exit)) => {
                info!("interactive fork exited");
            }
            Ok(Some(FireSignal::EnterFork { .. })) | Ok(None) => {
                *self.active_fork.lock().await = Some(active);
            }
            Err(e) => {
                warn!(error = %e, "reading interactive fire signal, leaving fork active");
                *self.active_fork.lock().await = Some(active);
            }
        }
    }

    // --- idle watchdog ------------------------------------------------------

    /// Second periodic task (§4.H): nudges an idle interactive fork once,
    /// then forces it closed if it's still idle past the timeout on a
    /// later tick. Serialized behind the agent lock, same as any other
    /// fire, so it never races a live owner turn.
    pub async fn run_idle_watchdog(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            self.idle_watchdog_tick().await;
        }
    }

    async fn idle_watchdog_tick(&self) {
        let _guard = self.runtime.lock().await;
        let active = self.active_fork.lock().await.take();
        let Some(mut active) = active else { return };

        let Some(channel) = self.channel().await else {
            *self.active_fork.lock().await = Some(active);
            return;
        };

        let now_ms = SystemClock.monotonic_ms();
        if active.state.should_auto_exit(now_ms) {
            self.write_fire_descriptor(&self.interactive_descriptor(active.state.idle_timeout_minutes));
            let prompt = warden_prompt::assemble::fork_timeout_escalated_prompt(active.state.idle_timeout_minutes);
            if let Err(e) = stream_turn(active.client.as_ref(), &channel, &prompt).await {
                warn!(error = %e, "forced fork-exit nudge failed");
            }
            self.conclude_interactive_turn(active).await;
        } else if active.state.is_idle(now_ms) && active.state.prompted_at().is_none() {
            active.state.set_prompted(now_ms);
            self.write_fire_descriptor(&self.interactive_descriptor(active.state.idle_timeout_minutes));
            let prompt = warden_prompt::assemble::fork_timeout_prompt(active.state.idle_timeout_minutes);
            if let Err(e) = stream_turn(active.client.as_ref(), &channel, &prompt).await {
                warn!(error = %e, "idle-timeout nudge failed");
            }
            self.conclude_interactive_turn(active).await;
        } else {
            *self.active_fork.lock().await = Some(active);
        }
    }

    // --- scheduler fires ------------------------------------------------------

    pub async fn consume_fires(self: Arc<Self>, mut fires: mpsc::UnboundedReceiver<Fire>) {
        while let Some(fire) = fires.recv().await {
            match fire {
                Fire::Routine(routine) => self.fire_routine(routine).await,
                Fire::Reminder(reminder) => self.fire_reminder(reminder).await,
            }
        }
    }

    async fn fire_routine(&self, routine: Routine) {
        let busy = self.runtime.locked();
        let _guard = match self.acquire_for_fire(routine.skip_if_busy, &routine.id).await {
            Some(guard) => guard,
            None => return,
        };

        let (routines, reminders) = self.entry_lists();
        let now = Utc::now();
        let budget = match self.budget_store().load(now) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "loading ping budget for routine fire");
                return;
            }
        };
        let prompt = warden_prompt::assemble::routine_prompt(&routine, &routines, &reminders, busy, false, &budget, now, self.timezone);

        if routine.background {
            self.run_background_fire(&routine.policy, routine.model.as_deref(), routine.isolated, busy, None, &prompt)
                .await;
        } else if let Err(e) = self.run_foreground_fire(&prompt).await {
            warn!(error = %e, "foreground routine fire failed");
        }
    }

    async fn fire_reminder(&self, reminder: Reminder) {
        let busy = self.runtime.locked();
        let _guard = match self.acquire_for_fire(reminder.skip_if_busy, &reminder.id).await {
            Some(guard) => guard,
            None => return,
        };

        let (routines, reminders_list) = self.entry_lists();
        let now = Utc::now();
        let budget = match self.budget_store().load(now) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "loading ping budget for reminder fire");
                return;
            }
        };
        let prompt = warden_prompt::assemble::reminder_prompt(&reminder, &routines, &reminders_list, busy, &budget, now, self.timezone);

        if reminder.background {
            let chain = (reminder.max_chain > 0).then(|| {
                (
                    reminder.chain_depth,
                    reminder.max_chain,
                    ChainSourceDescriptor {
                        message: reminder.message.clone(),
                        description: reminder.description.clone(),
                        background: reminder.background,
                        skip_if_busy: reminder.skip_if_busy,
                        model: reminder.model.clone(),
                        isolated: reminder.isolated,
                        thinking: reminder.thinking,
                        policy: reminder.policy.clone(),
                        chain_parent: reminder
                            .chain_parent
                            .clone()
                            .unwrap_or_else(|| reminder.id.clone())
                            .as_str()
                            .to_string(),
                    },
                )
            });
            self.run_background_fire(&reminder.policy, reminder.model.as_deref(), reminder.isolated, busy, chain, &prompt)
                .await;
        } else if let Err(e) = self.run_foreground_fire(&prompt).await {
            warn!(error = %e, "foreground reminder fire failed");
        }
    }

    async fn fire_webhook(&self, webhook_id: &str, prompt: String) {
        let spec = match self.schedule.find_webhook(webhook_id) {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                warn!(id = %webhook_id, "webhook fired but its spec is gone");
                return;
            }
            Err(e) => {
                warn!(error = %e, "loading webhook spec");
                return;
            }
        };
        let busy = self.runtime.locked();
        let _guard = self.runtime.lock().await;
        self.run_background_fire(&spec.policy, spec.model.as_deref(), spec.isolated, busy, None, &prompt)
            .await;
    }

    async fn acquire_for_fire(&self, skip_if_busy: bool, id: &warden_core::types::ShortId) -> Option<warden_agent::AgentLockGuard<'_>> {
        if skip_if_busy {
            let guard = self.runtime.try_lock();
            if guard.is_none() {
                info!(%id, "skipping busy fire (skip_if_busy)");
            }
            guard
        } else {
            Some(self.runtime.lock().await)
        }
    }

    fn entry_lists(&self) -> (Vec<Routine>, Vec<Reminder>) {
        let routines = self.schedule.list_routines().unwrap_or_default();
        let reminders = self.schedule.list_reminders().unwrap_or_default();
        (routines, reminders)
    }
}

async fn stream_turn(client: &dyn SessionClient, channel: &Arc<DiscordChannel>, prompt: &str) -> warden_agent::Result<SessionId> {
    let (tx, rx) = mpsc::channel(64);
    let sink = Arc::clone(channel);
    let deltas = ReceiverStream::new(rx).filter_map(|event| {
        future::ready(match event {
            StreamEvent::TextDelta(text) => Some(text),
            _ => None,
        })
    });
    let streaming = tokio::spawn(async move { stream_to_channel(sink.as_ref(), deltas).await });
    let result = client.stream_chat(prompt, tx).await;
    let _ = streaming.await;
    result
}

async fn stream_turn_on(runtime: &AgentRuntime, channel: &Arc<DiscordChannel>, prompt: &str) -> warden_agent::Result<SessionId> {
    let (tx, rx) = mpsc::channel(64);
    let sink = Arc::clone(channel);
    let deltas = ReceiverStream::new(rx).filter_map(|event| {
        future::ready(match event {
            StreamEvent::TextDelta(text) => Some(text),
            _ => None,
        })
    });
    let streaming = tokio::spawn(async move { stream_to_channel(sink.as_ref(), deltas).await });
    let result = runtime.stream_chat(prompt, tx).await;
    let _ = streaming.await;
    result
}

/// Thin `Arc`-wrapping handle implementing the two traits that need to
/// outlive a single call (§2): the Discord adapter's `MessageRouter` and
/// the webhook listener's `WebhookDispatcher`, both held for the life of
/// the process by something that only has `&self` at the call site.
#[derive(Clone)]
pub struct OrchestratorHandle(pub Arc<Orchestrator>);

#[async_trait]
impl MessageRouter for OrchestratorHandle {
    async fn handle_message(&self, channel: Arc<DiscordChannel>, content: String) {
        self.0.handle_owner_turn(channel, content).await;
    }
}

#[async_trait]
impl warden_webhook::WebhookDispatcher for OrchestratorHandle {
    async fn dispatch(&self, webhook_id: &str, prompt: String) -> std::result::Result<(), DispatchError> {
        let handle = self.clone();
        let webhook_id = webhook_id.to_string();
        tokio::spawn(async move {
            handle.0.fire_webhook(&webhook_id, prompt).await;
        });
        Ok(())
    }
}

/// Build every long-lived piece and run until the process is asked to
/// stop (§4.L: single-instance pid guard lives in `main`, held for this
/// call's whole lifetime).
pub async fn run(config: WardenConfig) -> Result<()> {
    std::fs::create_dir_all(&config.state_dir)?;

    let schedule = Arc::new(ScheduleStore::new(&config.state_dir));
    let sessions = SessionStore::new(config.state_dir.clone());
    let arbiter = Arc::new(PermissionArbiter::new());
    let approval_channel: control::SharedChannel = Arc::new(RwLock::new(None));

    let (listener, control_addr) = control::bind(&config.state_dir).await?;
    tokio::spawn(control::serve(listener, Arc::clone(&arbiter), Arc::clone(&approval_channel)));

    let resume_session = sessions.current().ok().flatten().map(|r| r.session_id);
    let main_client = match &resume_session {
        Some(session_id) => ClaudeCliClient::resumed(config.claude_command.clone(), config.claude_model.clone(), session_id),
        None => ClaudeCliClient::new(config.claude_command.clone(), config.claude_model.clone()),
    }
    .with_bridge(BridgeConfig {
        state_dir: config.state_dir.clone(),
        discord_token: config.discord_token.clone(),
        control_addr: Some(control_addr.clone()),
    })
    .with_interactive_approval(true);

    let runtime = Arc::new(AgentRuntime::new(Arc::new(main_client)));
    let timezone: Tz = config.timezone.parse().unwrap_or(Tz::UTC);

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::clone(&runtime),
        Arc::clone(&schedule),
        sessions,
        approval_channel,
        control_addr,
        timezone,
    ));
    let handle = Arc::new(OrchestratorHandle(Arc::clone(&orchestrator)));

    tokio::spawn(
        warden_discord::adapter::DiscordAdapter::new(config.discord_token.clone(), Arc::clone(&arbiter), Arc::clone(&handle)).run(),
    );

    let (engine, fires) = warden_schedule::SchedulerEngine::new(Arc::clone(&schedule), timezone);
    tokio::spawn(engine.run());
    tokio::spawn(Arc::clone(&orchestrator).consume_fires(fires));
    tokio::spawn(Arc::clone(&orchestrator).run_idle_watchdog());

    if let Some(secret) = config.webhook_secret.clone() {
        let state = Arc::new(warden_webhook::WebhookState {
            schedule: ScheduleStore::new(&config.state_dir),
            secret,
            budget: BudgetStore::new(config.state_dir.join("ping_budget.json")),
            dispatcher: handle.clone() as Arc<dyn warden_webhook::WebhookDispatcher>,
            clock: Arc::new(SystemClock),
        });
        let app = warden_webhook::router(state);
        let bind_addr = config.webhook_bind.clone();
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!(addr = %bind_addr, "webhook listener bound");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "webhook listener exited");
            }
        });
    } else {
        info!("no webhook secret configured; webhook listener not started");
    }

    info!(user = %config.user_name, bot = %config.bot_name, "warden orchestrator started");
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    Ok(())
}
