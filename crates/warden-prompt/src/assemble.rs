//! Per-fire prompt assembly (§4.I): tag line + optional bg preamble +
//! optional chain-context paragraph + the entry's message body.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use warden_budget::PingBudget;
use warden_core::policy::ForkPolicy;
use warden_schedule::{Reminder, Routine};

use crate::preamble::bg_preamble;
use crate::schedule::forward_schedule;

/// Build the prompt text for a firing routine.
pub fn routine_prompt(
    routine: &Routine,
    routines: &[Routine],
    reminders: &[Reminder],
    busy: bool,
    persistent: bool,
    budget: &PingBudget,
    now: DateTime<Utc>,
    timezone: Tz,
) -> String {
    if !routine.background {
        return format!("[routine:{}] {}", routine.id, routine.message);
    }
    let schedule = forward_schedule(routines, reminders, routine.id.as_str(), now, timezone);
    let preamble = bg_preamble(&schedule, &routine.policy, busy, persistent, budget, now);
    format!("[routine-bg:{}] {}{}", routine.id, preamble, routine.message)
}

fn chain_context(reminder: &Reminder) -> Option<String> {
    if reminder.max_chain == 0 {
        return None;
    }
    let check_num = reminder.chain_depth + 1;
    let total = reminder.max_chain + 1;
    Some(if reminder.chain_depth < reminder.max_chain {
        format!(
            "\nCHAIN CONTEXT: This is a follow-up chain reminder \
(check {check_num} of {total}). You have `follow_up_chain` \
available -- call follow_up_chain(minutes_from_now=N) to schedule \
another check. If the task is done or no longer needs follow-up, \
simply don't call it and the chain ends."
        )
    } else {
        format!(
            "\nCHAIN CONTEXT: This is the FINAL check in this follow-up chain \
(check {check_num} of {total}). `follow_up_chain` is NOT available \
-- this is your last chance to act on this reminder. If the task \
needs attention, ping the user now."
        )
    })
}

/// Build the prompt text for a firing reminder.
pub fn reminder_prompt(
    reminder: &Reminder,
    routines: &[Routine],
    reminders: &[Reminder],
    busy: bool,
    budget: &PingBudget,
    now: DateTime<Utc>,
    timezone: Tz,
) -> String {
    let tag = if reminder.background {
        format!("reminder-bg:{}", reminder.id)
    } else {
        format!("reminder:{}", reminder.id)
    };
    let mut parts = vec![format!("[{tag}]")];

    if reminder.background {
        let schedule = forward_schedule(routines, reminders, reminder.id.as_str(), now, timezone);
        let preamble = bg_preamble(&schedule, &reminder.policy, busy, false, budget, now);
        parts.push(preamble.trim_end().to_string());
    }

    if let Some(chain) = chain_context(reminder) {
        parts.push(chain);
    }

    parts.push(format!("\n{}", reminder.message));
    parts.join("\n")
}

/// Build the prompt text for a fired webhook (§4.K, §6.3): tag line, bg
/// preamble (webhooks always run as background forks, but never
/// participate in the forward-schedule lookahead since they have no
/// cron/run_at of their own — an empty schedule), a WEBHOOK DATA section
/// carrying the payload fields verbatim and marked untrusted since it's
/// attacker-reachable input, and a TASK section with the interpolated
/// message.
pub fn webhook_prompt(
    id: &str,
    fields: &[(String, String)],
    rendered_message: &str,
    policy: &ForkPolicy,
    busy: bool,
    budget: &PingBudget,
    now: DateTime<Utc>,
) -> String {
    let preamble = bg_preamble(&[], policy, busy, false, budget, now);

    let mut data_section = String::from("WEBHOOK DATA (untrusted):\n");
    if fields.is_empty() {
        data_section.push_str("(no fields)\n");
    } else {
        for (key, value) in fields {
            data_section.push_str(&format!("{key}: {value}\n"));
        }
    }

    format!("[webhook:{id}] {preamble}{data_section}\nTASK:\n{rendered_message}")
}

/// Idle-timeout nudge sent to an interactive fork that's gone quiet
/// (§4.H second periodic task, first notice).
pub fn fork_timeout_prompt(idle_timeout_minutes: u32) -> String {
    format!(
        "[fork-timeout] This fork has been idle for {idle_timeout_minutes} minutes. \
Decide what to do: use `save_context` to promote to main session, \
`report_updates(message)` to send a summary, or `exit_fork` to discard. \
If the user is still engaged, ask them what they'd like to do."
    )
}

/// Escalated nudge sent when the fork is still idle after the first
/// notice — this one must resolve.
pub fn fork_timeout_escalated_prompt(idle_timeout_minutes: u32) -> String {
    format!(
        "[fork-timeout] REMINDER: This fork has been idle for over {} minutes \
and you already received a timeout notice. You MUST exit now: \
use `save_context`, `report_updates(message)`, or `exit_fork`.",
        idle_timeout_minutes * 2
    )
}

/// Resume prompt handed to a newly-entered interactive fork that was
/// started from a background routine/reminder's enter_fork action.
pub fn fork_started_prompt(action: &str) -> String {
    format!(
        "[fork-started] You were running a background routine and the user asked to \
open a conversation about it. Here's what they requested: {action}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_core::policy::ForkPolicy;
    use warden_core::types::ShortId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn foreground_routine_prompt_has_no_preamble() {
        let routine = Routine {
            id: ShortId::from("r1"),
            message: "say hi".into(),
            cron: "0 9 * * *".into(),
            description: None,
            background: false,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        let budget = PingBudget::new(now());
        let out = routine_prompt(&routine, &[], &[], false, false, &budget, now(), Tz::UTC);
        assert_eq!(out, "[routine:r1] say hi");
    }

    #[test]
    fn background_routine_prompt_has_tag_and_preamble() {
        let routine = Routine {
            id: ShortId::from("r1"),
            message: "check inbox".into(),
            cron: "0 9 * * *".into(),
            description: None,
            background: true,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        let budget = PingBudget::new(now());
        let out = routine_prompt(&routine, &[routine.clone()], &[], false, false, &budget, now(), Tz::UTC);
        assert!(out.starts_with("[routine-bg:r1]"));
        assert!(out.ends_with("check inbox"));
    }

    #[test]
    fn final_chain_check_says_not_available() {
        let reminder = Reminder::new(
            ShortId::from("c1"),
            "did you finish?".into(),
            now(),
            None,
            false,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            2,
            2,
            None,
        )
        .unwrap();
        let budget = PingBudget::new(now());
        let out = reminder_prompt(&reminder, &[], &[], false, &budget, now(), Tz::UTC);
        assert!(out.contains("FINAL check"));
        assert!(out.contains("NOT available"));
    }

    #[test]
    fn webhook_prompt_carries_tag() {
        let budget = PingBudget::new(now());
        let out = webhook_prompt(
            "ci",
            &[],
            "build finished",
            &ForkPolicy::default(),
            false,
            &budget,
            now(),
        );
        assert!(out.starts_with("[webhook:ci]"));
        assert!(out.contains("build finished"));
    }

    #[test]
    fn webhook_prompt_includes_untrusted_data_section() {
        let budget = PingBudget::new(now());
        let fields = vec![("repo".to_string(), "myrepo".to_string()), ("status".to_string(), "failure".to_string())];
        let out = webhook_prompt("ci", &fields, "Check build.", &ForkPolicy::default(), false, &budget, now());
        assert!(out.contains("WEBHOOK DATA"));
        assert!(out.to_lowercase().contains("untrusted"));
        assert!(out.contains("repo: myrepo"));
        assert!(out.contains("status: failure"));
    }

    #[test]
    fn webhook_prompt_has_task_section_with_interpolated_message() {
        let budget = PingBudget::new(now());
        let out = webhook_prompt(
            "ci",
            &[("repo".to_string(), "ollim-bot".to_string())],
            "Check ollim-bot build status.",
            &ForkPolicy::default(),
            false,
            &budget,
            now(),
        );
        assert!(out.contains("TASK"));
        assert!(out.contains("Check ollim-bot build status."));
    }

    #[test]
    fn webhook_prompt_includes_bg_preamble() {
        let budget = PingBudget::new(now());
        let out = webhook_prompt("ci", &[], "Check.", &ForkPolicy::default(), false, &budget, now());
        assert!(out.contains("ping_user") || out.contains("discarded"));
    }
}
