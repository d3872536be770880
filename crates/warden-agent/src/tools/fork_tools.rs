//! The eight tools exposed to the agent by fork state and the chain
//! state machine (§4.E, §4.F). Each wraps the shared [`FireContext`] and
//! enforces its own row of the allowed-in / constraint table rather than
//! relying on the permission arbiter, which only gates the SDK's
//! general-purpose tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use warden_core::policy::UpdateMainSession;
use warden_core::types::ShortId;
use warden_fork::ForkExitAction;
use warden_schedule::types::Reminder;

use crate::fire_context::{EnterForkRequest, FireContext};
use crate::session::SessionClient;
use crate::tools::{Tool, ToolError, ToolOutput};

fn invalid(err: serde_json::Error) -> ToolError {
    ToolError::Invalid(err.to_string())
}

#[derive(Deserialize)]
struct PingArgs {
    message: String,
    #[serde(default)]
    critical: bool,
}

pub struct PingUserTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for PingUserTool {
    fn name(&self) -> &'static str {
        "ping_user"
    }

    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: PingArgs = serde_json::from_value(input).map_err(invalid)?;
        let now = self.ctx.now();

        let mut state = self.ctx.fork_state.lock().await;
        let bg = state
            .background_mut()
            .ok_or_else(|| ToolError::Denied("ping_user is only available in a background fork".into()))?;

        if !bg.policy.allow_ping {
            return Err(ToolError::Denied("pinging is disabled for this fork".into()));
        }
        if self.ctx.is_busy() && !args.critical {
            return Err(ToolError::Denied("the main conversation is busy".into()));
        }
        if !args.critical && bg.non_critical_ping_already_sent() {
            return Err(ToolError::Denied("Already sent 1 ping this session".into()));
        }

        if args.critical {
            self.ctx.budget.record_critical(now).map_err(|e| ToolError::Failed(e.to_string()))?;
        } else if !self.ctx.budget.try_use(now).map_err(|e| ToolError::Failed(e.to_string()))? {
            return Err(ToolError::Denied("ping budget exhausted".into()));
        }

        self.ctx
            .notify
            .send_ping(&format!("[bg] {}", args.message))
            .await
            .map_err(|_| ToolError::Failed("failed to deliver ping".into()))?;

        bg.record_ping();
        Ok(ToolOutput::new("sent"))
    }
}

#[derive(Deserialize)]
struct EmbedFieldArg {
    name: String,
    value: String,
    #[serde(default)]
    inline: bool,
}

#[derive(Deserialize)]
struct EmbedArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    fields: Vec<EmbedFieldArg>,
    #[serde(default)]
    critical: bool,
}

pub struct DiscordEmbedTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for DiscordEmbedTool {
    fn name(&self) -> &'static str {
        "discord_embed"
    }

    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: EmbedArgs = serde_json::from_value(input).map_err(invalid)?;
        let now = self.ctx.now();

        let mut state = self.ctx.fork_state.lock().await;
        let bg = state
            .background_mut()
            .ok_or_else(|| ToolError::Denied("discord_embed is only available in a background fork".into()))?;

        if !bg.policy.allow_ping {
            return Err(ToolError::Denied("pinging is disabled for this fork".into()));
        }
        if self.ctx.is_busy() && !args.critical {
            return Err(ToolError::Denied("the main conversation is busy".into()));
        }
        if !args.critical && bg.non_critical_ping_already_sent() {
            return Err(ToolError::Denied("Already sent 1 ping this session".into()));
        }

        if args.critical {
            self.ctx.budget.record_critical(now).map_err(|e| ToolError::Failed(e.to_string()))?;
        } else if !self.ctx.budget.try_use(now).map_err(|e| ToolError::Failed(e.to_string()))? {
            return Err(ToolError::Denied("ping budget exhausted".into()));
        }

        let fields: Vec<crate::fire_context::EmbedField> = args
            .fields
            .iter()
            .map(|f| crate::fire_context::EmbedField {
                name: f.name.clone(),
                value: f.value.clone(),
                inline: f.inline,
            })
            .collect();

        self.ctx
            .notify
            .send_embed(crate::fire_context::EmbedContent {
                title: &args.title,
                description: args.description.as_deref(),
                color: args.color.as_deref(),
                fields: &fields,
                footer: "bg",
            })
            .await
            .map_err(|_| ToolError::Failed("failed to deliver embed".into()))?;

        bg.record_ping();
        Ok(ToolOutput::new("sent"))
    }
}

#[derive(Deserialize)]
struct FollowUpArgs {
    minutes_from_now: u32,
}

pub struct FollowUpChainTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for FollowUpChainTool {
    fn name(&self) -> &'static str {
        "follow_up_chain"
    }

    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: FollowUpArgs = serde_json::from_value(input).map_err(invalid)?;

        let chain = self
            .ctx
            .chain
            .ok_or_else(|| ToolError::Denied("no chain context active".into()))?;
        if !chain.can_follow_up() {
            return Err(ToolError::Denied("chain has reached its max depth".into()));
        }
        let next_depth = chain.next_depth().expect("can_follow_up implies a next depth");

        let source = self
            .ctx
            .chain_source
            .as_ref()
            .ok_or_else(|| ToolError::Denied("no chain context active".into()))?;

        let now = self.ctx.now();
        let run_at = now + chrono::Duration::minutes(i64::from(args.minutes_from_now));

        let reminder = Reminder::new(
            ShortId::new(),
            source.message.clone(),
            run_at,
            source.description.clone(),
            source.background,
            source.skip_if_busy,
            source.model.clone(),
            source.isolated,
            source.thinking,
            source.policy.clone(),
            next_depth,
            chain.max_chain,
            Some(source.chain_parent.clone()),
        )
        .map_err(|e| ToolError::Invalid(e.to_string()))?;

        self.ctx
            .schedule
            .save_reminder(&reminder)
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        Ok(ToolOutput::new(format!("scheduled follow-up at depth {next_depth}")))
    }
}

pub struct SaveContextTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for SaveContextTool {
    fn name(&self) -> &'static str {
        "save_context"
    }

    async fn handle(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut state = self.ctx.fork_state.lock().await;
        let fg = state
            .interactive_mut()
            .ok_or_else(|| ToolError::Denied("save_context is only available in an interactive fork".into()))?;
        fg.exit_action = ForkExitAction::Save;
        Ok(ToolOutput::new("will promote this fork to the main session"))
    }
}

#[derive(Deserialize)]
struct ReportArgs {
    message: String,
}

pub struct ReportUpdatesTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for ReportUpdatesTool {
    fn name(&self) -> &'static str {
        "report_updates"
    }

    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ReportArgs = serde_json::from_value(input).map_err(invalid)?;
        let now = self.ctx.now();

        let mut state = self.ctx.fork_state.lock().await;
        match &mut *state {
            warden_fork::ForkState::Background(bg) => {
                if bg.policy.update_main_session == UpdateMainSession::Blocked {
                    return Err(ToolError::Denied("reports are disabled for this fork".into()));
                }
                self.ctx
                    .pending_updates
                    .append(&args.message, now)
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                bg.record_report();
            }
            warden_fork::ForkState::Interactive(fg) => {
                self.ctx
                    .pending_updates
                    .append(&args.message, now)
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                fg.exit_action = ForkExitAction::Report;
            }
            warden_fork::ForkState::Idle => {
                return Err(ToolError::Denied("no fork is active".into()));
            }
        }
        Ok(ToolOutput::new("recorded"))
    }
}

#[derive(Deserialize)]
struct EnterForkArgs {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    idle_timeout_minutes: Option<u32>,
}

pub struct EnterForkTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for EnterForkTool {
    fn name(&self) -> &'static str {
        "enter_fork"
    }

    async fn handle(&self, input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: EnterForkArgs = serde_json::from_value(input).map_err(invalid)?;
        {
            let state = self.ctx.fork_state.lock().await;
            if !matches!(&*state, warden_fork::ForkState::Idle) {
                return Err(ToolError::Denied("enter_fork is only available on the main session".into()));
            }
        }
        self.ctx
            .request_enter_fork(EnterForkRequest {
                topic: args.topic,
                idle_timeout_minutes: args.idle_timeout_minutes,
            })
            .await;
        Ok(ToolOutput::new("will fork the next turn"))
    }
}

pub struct ExitForkTool {
    pub ctx: Arc<FireContext>,
}

#[async_trait]
impl Tool for ExitForkTool {
    fn name(&self) -> &'static str {
        "exit_fork"
    }

    async fn handle(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let mut state = self.ctx.fork_state.lock().await;
        let fg = state
            .interactive_mut()
            .ok_or_else(|| ToolError::Denied("exit_fork is only available in an interactive fork".into()))?;
        fg.exit_action = ForkExitAction::Exit;
        Ok(ToolOutput::new("exiting fork"))
    }
}

pub struct CompactSessionTool {
    pub ctx: Arc<FireContext>,
    pub session: Arc<dyn SessionClient>,
}

#[async_trait]
impl Tool for CompactSessionTool {
    fn name(&self) -> &'static str {
        "compact_session"
    }

    async fn handle(&self, _input: serde_json::Value) -> Result<ToolOutput, ToolError> {
        {
            let state = self.ctx.fork_state.lock().await;
            if !matches!(&*state, warden_fork::ForkState::Idle) {
                return Err(ToolError::Denied("compact_session is only available on the persistent session".into()));
            }
        }
        self.session
            .compact()
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;
        Ok(ToolOutput::new("compacted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fire_context::{EmbedContent, NotifyError};
    use warden_budget::BudgetStore;
    use warden_core::policy::ForkPolicy;
    use warden_core::{Clock, SystemClock};
    use warden_fork::{BackgroundFork, ChainContext, ForkState, InteractiveFork};
    use warden_inquiries::PendingUpdates;
    use warden_schedule::ScheduleStore;

    struct MuteNotify;

    #[async_trait]
    impl crate::fire_context::NotifyChannel for MuteNotify {
        async fn send_ping(&self, _message: &str) -> Result<(), NotifyError> {
            Ok(())
        }
        async fn send_embed(&self, _content: EmbedContent<'_>) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn test_ctx(tmp: &tempfile::TempDir) -> Arc<FireContext> {
        Arc::new(FireContext::new(
            BudgetStore::new(tmp.path().join("ping_budget.json")),
            PendingUpdates::new(tmp.path().join("pending_updates.json")),
            ScheduleStore::new(tmp.path()),
            Arc::new(MuteNotify),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test]
    async fn ping_user_denied_outside_background_fork() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let tool = PingUserTool { ctx };
        let err = tool
            .handle(serde_json::json!({"message": "hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)));
    }

    #[tokio::test]
    async fn ping_user_enforces_one_non_critical_ping_per_fire() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        *ctx.fork_state.lock().await = ForkState::Background(BackgroundFork::new(ForkPolicy::default()));
        let tool = PingUserTool { ctx: ctx.clone() };

        tool.handle(serde_json::json!({"message": "first"})).await.unwrap();
        let err = tool
            .handle(serde_json::json!({"message": "second"}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Denied("Already sent 1 ping this session".into()));
    }

    #[tokio::test]
    async fn ping_user_respects_allow_ping_false() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let mut policy = ForkPolicy::default();
        policy.allow_ping = false;
        *ctx.fork_state.lock().await = ForkState::Background(BackgroundFork::new(policy));
        let tool = PingUserTool { ctx };
        let err = tool
            .handle(serde_json::json!({"message": "hi", "critical": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)));
    }

    #[tokio::test]
    async fn follow_up_chain_refuses_at_max_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx_inner = FireContext::new(
            BudgetStore::new(tmp.path().join("ping_budget.json")),
            PendingUpdates::new(tmp.path().join("pending_updates.json")),
            ScheduleStore::new(tmp.path()),
            Arc::new(MuteNotify),
            Arc::new(SystemClock),
        );
        ctx_inner.chain = Some(ChainContext::new(2, 2).unwrap());
        let ctx = Arc::new(ctx_inner);
        let tool = FollowUpChainTool { ctx };
        let err = tool
            .handle(serde_json::json!({"minutes_from_now": 10}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)));
    }

    #[tokio::test]
    async fn save_context_sets_exit_action() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let now_ms = SystemClock.monotonic_ms();
        *ctx.fork_state.lock().await = ForkState::Interactive(InteractiveFork::new(10, now_ms));
        let tool = SaveContextTool { ctx: ctx.clone() };
        tool.handle(serde_json::Value::Null).await.unwrap();
        let mut state = ctx.fork_state.lock().await;
        assert_eq!(state.interactive_mut().unwrap().exit_action, ForkExitAction::Save);
    }

    #[tokio::test]
    async fn report_updates_denied_when_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let mut policy = ForkPolicy::default();
        policy.update_main_session = UpdateMainSession::Blocked;
        *ctx.fork_state.lock().await = ForkState::Background(BackgroundFork::new(policy));
        let tool = ReportUpdatesTool { ctx };
        let err = tool
            .handle(serde_json::json!({"message": "done"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)));
    }

    #[tokio::test]
    async fn enter_fork_records_a_request_for_the_orchestrator() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let tool = EnterForkTool { ctx: ctx.clone() };
        tool.handle(serde_json::json!({"topic": "deploy"})).await.unwrap();
        let req = ctx.take_enter_fork_request().await.unwrap();
        assert_eq!(req.topic.as_deref(), Some("deploy"));
    }
}
