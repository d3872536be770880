//! Stop-hook contract (§4.G): run when the SDK reports the model is
//! done with its turn. Outside a background fork this always passes —
//! only a background fork's unreported output can block completion.

use warden_core::policy::UpdateMainSession;
use warden_fork::{BackgroundFork, ForkState};

/// What the stop hook tells the SDK to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopVerdict {
    Pass,
    /// The model must keep going; this system message explains why.
    Block(String),
}

/// Evaluate the contract for the current fork state.
pub fn check_stop_hook(state: &ForkState) -> StopVerdict {
    let ForkState::Background(bg) = state else {
        return StopVerdict::Pass;
    };
    evaluate_background(bg)
}

fn evaluate_background(bg: &BackgroundFork) -> StopVerdict {
    match bg.policy.update_main_session {
        UpdateMainSession::Always => {
            if bg.reported {
                StopVerdict::Pass
            } else {
                StopVerdict::Block(
                    "Call report_updates before finishing so the main session learns what happened.".into(),
                )
            }
        }
        UpdateMainSession::OnPing => {
            if bg.output_sent && !bg.reported {
                StopVerdict::Block(
                    "You pinged the owner but haven't called report_updates — do that before finishing."
                        .into(),
                )
            } else {
                StopVerdict::Pass
            }
        }
        UpdateMainSession::Freely | UpdateMainSession::Blocked => StopVerdict::Pass,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::policy::ForkPolicy;

    fn bg_with(update_main_session: UpdateMainSession) -> ForkState {
        let mut policy = ForkPolicy::default();
        policy.update_main_session = update_main_session;
        ForkState::Background(BackgroundFork::new(policy))
    }

    #[test]
    fn outside_a_background_fork_always_passes() {
        assert_eq!(check_stop_hook(&ForkState::Idle), StopVerdict::Pass);
    }

    #[test]
    fn always_mode_blocks_until_reported() {
        let state = bg_with(UpdateMainSession::Always);
        assert!(matches!(check_stop_hook(&state), StopVerdict::Block(_)));
    }

    #[test]
    fn always_mode_passes_once_reported() {
        let mut state = bg_with(UpdateMainSession::Always);
        if let ForkState::Background(bg) = &mut state {
            bg.record_report();
        }
        assert_eq!(check_stop_hook(&state), StopVerdict::Pass);
    }

    #[test]
    fn on_ping_mode_passes_when_nothing_was_sent() {
        let state = bg_with(UpdateMainSession::OnPing);
        assert_eq!(check_stop_hook(&state), StopVerdict::Pass);
    }

    #[test]
    fn on_ping_mode_blocks_after_a_ping_with_no_report() {
        let mut state = bg_with(UpdateMainSession::OnPing);
        if let ForkState::Background(bg) = &mut state {
            bg.record_ping();
        }
        assert!(matches!(check_stop_hook(&state), StopVerdict::Block(_)));
    }

    #[test]
    fn on_ping_mode_passes_after_ping_and_report() {
        let mut state = bg_with(UpdateMainSession::OnPing);
        if let ForkState::Background(bg) = &mut state {
            bg.record_ping();
            bg.record_report();
        }
        assert_eq!(check_stop_hook(&state), StopVerdict::Pass);
    }

    #[test]
    fn freely_and_blocked_modes_always_pass() {
        assert_eq!(check_stop_hook(&bg_with(UpdateMainSession::Freely)), StopVerdict::Pass);
        assert_eq!(check_stop_hook(&bg_with(UpdateMainSession::Blocked)), StopVerdict::Pass);
    }
}
