//! Background-fork preamble text (§4.I): ping rules, update-mode
//! instructions, budget status, forward schedule, tool restrictions.

use chrono::{DateTime, Utc};
use warden_budget::PingBudget;
use warden_core::policy::{ForkPolicy, ToolFilter, UpdateMainSession};

use crate::schedule::ScheduleEntry;

fn ping_section(allow_ping: bool) -> &'static str {
    if allow_ping {
        "Your text output will be discarded. Use `ping_user` (MCP tool) to send \
a plain text alert, or `discord_embed` for structured data. Only alert \
if something genuinely warrants attention.\n\n"
    } else {
        "Your text output will be discarded. \
Pinging is disabled for this task — `ping_user` and `discord_embed` \
are not available.\n\n"
    }
}

fn update_section(mode: UpdateMainSession) -> &'static str {
    match mode {
        UpdateMainSession::Always => {
            "This runs on a forked session -- by default everything is discarded.\n\
You MUST call `report_updates(message)` before finishing to update \
the main session on what happened.\n\n"
        }
        UpdateMainSession::Freely => {
            "This runs on a forked session -- by default everything is discarded.\n\
You may optionally call `report_updates(message)` to update the main \
session on what happened -- or just finish without it.\n\n"
        }
        UpdateMainSession::Blocked => {
            "This runs on a forked session. This task runs silently -- no reporting to the main session.\n\n"
        }
        UpdateMainSession::OnPing => {
            "This runs on a forked session -- by default everything is discarded.\n\
- Call `report_updates(message)` to update the main session on what \
happened (fork discarded).\n\
- If you send a ping or embed, you MUST also call `report_updates`.\n\
- Call nothing if nothing useful happened.\n\n"
        }
    }
}

fn busy_line(busy: bool, allow_ping: bool) -> &'static str {
    if busy && allow_ping {
        "User is mid-conversation. Do NOT use `ping_user` or `discord_embed` \
unless `critical=True`. Use `report_updates` for all findings -- \
they'll appear in the main session when the conversation ends.\n\n"
    } else {
        ""
    }
}

fn schedule_section(schedule: &[ScheduleEntry], now: DateTime<Utc>, refill_rate_minutes: f64) -> String {
    if schedule.is_empty() {
        return "No more bg tasks today.\n".to_string();
    }
    let last_forward = schedule.iter().filter(|e| e.tag != Some("just fired")).last();
    let window_label = match last_forward {
        Some(e) => {
            let hours = (e.fire_time - now).num_minutes() as f64 / 60.0;
            format!("next {}h", hours.round().max(1.0) as i64)
        }
        None => "recent".to_string(),
    };
    let mut lines = vec![format!("Upcoming bg tasks ({window_label}):")];
    for entry in schedule {
        let time_str = entry.fire_time.format("%-I:%M %p");
        let silent = if entry.silent { " (silent)" } else { "" };
        let tag_str = entry.tag.map(|t| format!(" [{t}]")).unwrap_or_default();
        lines.push(format!(
            "- {time_str}: {}{silent} — \"{}\" ({}){tag_str}",
            entry.label, entry.description, entry.file_path
        ));
    }
    if let Some(e) = last_forward {
        let minutes_to_last = (e.fire_time - now).num_minutes() as f64;
        let refills = (minutes_to_last / refill_rate_minutes) as i64;
        if refills > 0 {
            let s = if refills != 1 { "s" } else { "" };
            lines.push(format!("~{refills} refill{s} before last task."));
        }
    }
    lines.join("\n") + "\n"
}

fn regret_line(can_report: bool) -> &'static str {
    if can_report {
        "Before pinging, ask: would the user regret missing this? \
Informational summaries and low-stakes check-ins → report_updates. \
Time-sensitive actions, accountability nudges, health routines → ping.\n\
When budget is tight, save pings for tasks the user would regret missing. "
    } else {
        "Before pinging, ask: would the user regret missing this? \
Skip low-stakes check-ins. \
Time-sensitive actions, accountability nudges, health routines → ping.\n"
    }
}

fn budget_section(
    schedule: &[ScheduleEntry],
    now: DateTime<Utc>,
    budget: &PingBudget,
    can_report: bool,
) -> String {
    format!(
        "Ping budget: {}.\n{}Send at most 1 ping or embed per bg session.\n{}critical=True bypasses the budget — reserve for things the user would be devastated to miss.\n\n",
        budget.status_string(),
        schedule_section(schedule, now, budget.refill_rate_minutes()),
        regret_line(can_report),
    )
}

fn tools_section(filter: &ToolFilter) -> String {
    match filter {
        ToolFilter::Unrestricted => String::new(),
        ToolFilter::Allow(list) => {
            let body = list.iter().map(|t| format!("  - {t}")).collect::<Vec<_>>().join("\n");
            format!("TOOL RESTRICTIONS: Only these tools are available for this task:\n{body}\n\n")
        }
        ToolFilter::Block(list) => {
            let body = list.iter().map(|t| format!("  - {t}")).collect::<Vec<_>>().join("\n");
            format!("TOOL RESTRICTIONS: These tools are NOT available for this task:\n{body}\n\n")
        }
    }
}

fn persistent_section(persistent: bool) -> &'static str {
    if persistent {
        "SESSION: Persistent — your context carries across fires. \
You have a `compact_session` tool to compress context when it grows large.\n\n"
    } else {
        ""
    }
}

/// Assemble the full bg preamble, in the same section order as the
/// original: persistent line, ping rules, update mode, busy line, budget
/// + schedule, tool restrictions.
pub fn bg_preamble(
    schedule: &[ScheduleEntry],
    policy: &ForkPolicy,
    busy: bool,
    persistent: bool,
    budget: &PingBudget,
    now: DateTime<Utc>,
) -> String {
    let budget_section = if policy.allow_ping {
        budget_section(schedule, now, budget, policy.update_main_session != UpdateMainSession::Blocked)
    } else {
        String::new()
    };
    format!(
        "{}{}{}{}{}{}",
        persistent_section(persistent),
        ping_section(policy.allow_ping),
        update_section(policy.update_main_session),
        busy_line(busy, policy.allow_ping),
        budget_section,
        tools_section(&policy.tool_filter),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn budget_at(now: DateTime<Utc>) -> PingBudget {
        PingBudget::new(now)
    }

    #[test]
    fn omits_budget_section_when_ping_disabled() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut policy = ForkPolicy::default();
        policy.allow_ping = false;
        let out = bg_preamble(&[], &policy, false, false, &budget_at(now), now);
        assert!(!out.contains("Ping budget"));
        assert!(out.contains("Pinging is disabled"));
    }

    #[test]
    fn busy_line_only_shown_when_busy_and_ping_allowed() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let policy = ForkPolicy::default();
        let out = bg_preamble(&[], &policy, true, false, &budget_at(now), now);
        assert!(out.contains("mid-conversation"));
    }

    #[test]
    fn tool_restrictions_render_allow_list() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut policy = ForkPolicy::default();
        policy.tool_filter = ToolFilter::Allow(vec!["ping_user".to_string()]);
        let out = bg_preamble(&[], &policy, false, false, &budget_at(now), now);
        assert!(out.contains("Only these tools are available"));
        assert!(out.contains("ping_user"));
    }
}
