//! Fork state (§4.E) and the chain-reminder state machine (§4.F).
//!
//! Exactly one of a background fork or an interactive fork is active per
//! process at a time; entering one resets the other's derived flags.
//! Time here is monotonic milliseconds from [`warden_core::Clock`], never
//! wall-clock, so idle-timeout comparisons are immune to clock skew.

use serde::{Deserialize, Serialize};
use warden_core::ForkPolicy;

/// How a fork asked to conclude, set by an agent tool call or the
/// idle-watchdog and drained by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkExitAction {
    #[default]
    None,
    Save,
    Report,
    Exit,
}

/// State tracked while a background fork is running.
#[derive(Debug, Clone)]
pub struct BackgroundFork {
    pub fork_saved: bool,
    pub ping_count: u32,
    pub output_sent: bool,
    pub reported: bool,
    pub policy: ForkPolicy,
}

impl BackgroundFork {
    pub fn new(policy: ForkPolicy) -> Self {
        Self {
            fork_saved: false,
            ping_count: 0,
            output_sent: false,
            reported: false,
            policy,
        }
    }

    /// At most one non-critical ping per fire (§4.E). Critical pings are
    /// exempt — budget/criticality accounting lives in `warden-budget`,
    /// this only tracks the one-ping rule.
    pub fn non_critical_ping_already_sent(&self) -> bool {
        self.ping_count >= 1
    }

    pub fn record_ping(&mut self) {
        self.ping_count += 1;
        self.output_sent = true;
    }

    pub fn record_report(&mut self) {
        self.reported = true;
    }

    pub fn request_save(&mut self) {
        self.fork_saved = true;
    }
}

/// State tracked while an interactive fork is running.
#[derive(Debug, Clone)]
pub struct InteractiveFork {
    pub idle_timeout_minutes: u32,
    last_activity_ms: i64,
    prompted_at_ms: Option<i64>,
    pub exit_action: ForkExitAction,
}

impl InteractiveFork {
    pub fn new(idle_timeout_minutes: u32, now_ms: i64) -> Self {
        Self {
            idle_timeout_minutes,
            last_activity_ms: now_ms,
            prompted_at_ms: None,
            exit_action: ForkExitAction::None,
        }
    }

    pub fn touch_activity(&mut self, now_ms: i64) {
        self.last_activity_ms = now_ms;
    }

    fn timeout_ms(&self) -> i64 {
        i64::from(self.idle_timeout_minutes) * 60_000
    }

    /// `now - last_activity > idle_timeout`.
    pub fn is_idle(&self, now_ms: i64) -> bool {
        now_ms - self.last_activity_ms > self.timeout_ms()
    }

    pub fn set_prompted(&mut self, now_ms: i64) {
        self.prompted_at_ms = Some(now_ms);
    }

    pub fn clear_prompted(&mut self) {
        self.prompted_at_ms = None;
    }

    pub fn prompted_at(&self) -> Option<i64> {
        self.prompted_at_ms
    }

    /// `prompted_at != None && now - prompted_at > idle_timeout`.
    pub fn should_auto_exit(&self, now_ms: i64) -> bool {
        match self.prompted_at_ms {
            Some(prompted) => now_ms - prompted > self.timeout_ms(),
            None => false,
        }
    }
}

/// The two fork modes are mutually exclusive; at most one is `Some` at a
/// time. Construct through [`ForkState::enter_background`] /
/// [`ForkState::enter_interactive`] / [`ForkState::clear`] rather than
/// touching the variants directly, so the mutual-exclusion invariant
/// can't be broken by a stray assignment.
#[derive(Debug, Default)]
pub enum ForkState {
    #[default]
    Idle,
    Background(BackgroundFork),
    Interactive(InteractiveFork),
}

impl ForkState {
    pub fn enter_background(&mut self, policy: ForkPolicy) {
        *self = ForkState::Background(BackgroundFork::new(policy));
    }

    pub fn enter_interactive(&mut self, idle_timeout_minutes: u32, now_ms: i64) {
        *self = ForkState::Interactive(InteractiveFork::new(idle_timeout_minutes, now_ms));
    }

    pub fn clear(&mut self) {
        *self = ForkState::Idle;
    }

    pub fn in_background(&self) -> bool {
        matches!(self, ForkState::Background(_))
    }

    pub fn in_interactive(&self) -> bool {
        matches!(self, ForkState::Interactive(_))
    }

    pub fn background_mut(&mut self) -> Option<&mut BackgroundFork> {
        match self {
            ForkState::Background(bg) => Some(bg),
            _ => None,
        }
    }

    pub fn interactive_mut(&mut self) -> Option<&mut InteractiveFork> {
        match self {
            ForkState::Interactive(fg) => Some(fg),
            _ => None,
        }
    }
}

/// A chain reminder's invariants (§3.1, §4.F): `chain_depth <= max_chain`,
/// and `chain_parent` identifies the root of the chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainContext {
    pub chain_depth: u32,
    pub max_chain: u32,
}

impl ChainContext {
    /// Validates the invariant at construction time rather than letting
    /// an out-of-range depth propagate silently.
    pub fn new(chain_depth: u32, max_chain: u32) -> Result<Self, &'static str> {
        if chain_depth > max_chain {
            return Err("chain_depth must be <= max_chain");
        }
        Ok(Self {
            chain_depth,
            max_chain,
        })
    }

    /// Whether `follow_up_chain` may be offered at all (§4.F: not offered
    /// once `chain_depth == max_chain`).
    pub fn can_follow_up(&self) -> bool {
        self.chain_depth < self.max_chain
    }

    /// The depth a new follow-up reminder would be created at.
    pub fn next_depth(&self) -> Option<u32> {
        self.can_follow_up().then_some(self.chain_depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entering_interactive_clears_background() {
        let mut state = ForkState::default();
        state.enter_background(ForkPolicy::default());
        assert!(state.in_background());
        state.enter_interactive(10, 0);
        assert!(!state.in_background());
        assert!(state.in_interactive());
    }

    #[test]
    fn background_enforces_single_non_critical_ping() {
        let mut bg = BackgroundFork::new(ForkPolicy::default());
        assert!(!bg.non_critical_ping_already_sent());
        bg.record_ping();
        assert!(bg.non_critical_ping_already_sent());
        assert!(bg.output_sent);
    }

    #[test]
    fn interactive_is_idle_after_timeout() {
        let mut fork = InteractiveFork::new(10, 0);
        assert!(!fork.is_idle(5 * 60_000));
        fork.touch_activity(0);
        assert!(fork.is_idle(10 * 60_000 + 1));
    }

    #[test]
    fn interactive_should_auto_exit_after_prompt_plus_timeout() {
        let mut fork = InteractiveFork::new(10, 0);
        assert!(!fork.should_auto_exit(100_000));
        fork.set_prompted(0);
        assert!(!fork.should_auto_exit(10 * 60_000));
        assert!(fork.should_auto_exit(10 * 60_000 + 1));
    }

    #[test]
    fn chain_context_rejects_depth_exceeding_max() {
        assert!(ChainContext::new(3, 2).is_err());
        assert!(ChainContext::new(2, 2).is_ok());
    }

    #[test]
    fn chain_context_refuses_follow_up_at_max_depth() {
        let ctx = ChainContext::new(2, 2).unwrap();
        assert!(!ctx.can_follow_up());
        assert_eq!(ctx.next_depth(), None);
        let ctx = ChainContext::new(1, 2).unwrap();
        assert!(ctx.can_follow_up());
        assert_eq!(ctx.next_depth(), Some(2));
    }
}
