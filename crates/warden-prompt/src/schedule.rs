//! Forward-schedule lookahead for the bg preamble (§4.I.1): "what else is
//! about to fire, and what just fired within the grace window."

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use warden_schedule::{CronSchedule, Reminder, Routine};

const GRACE_MINUTES: i64 = 15;
const BASE_WINDOW_HOURS: i64 = 3;
const MAX_WINDOW_HOURS: i64 = 12;
const MIN_FORWARD: usize = 3;
const TRUNCATE_LEN: usize = 60;

/// One upcoming or just-fired bg task, ready to render into the preamble.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub id: String,
    pub fire_time: DateTime<Utc>,
    pub label: String,
    pub description: String,
    pub file_path: String,
    pub silent: bool,
    pub tag: Option<&'static str>,
}

fn truncate_description(description: Option<&str>, message: &str) -> String {
    if let Some(d) = description {
        return d.to_string();
    }
    let flat: String = message.split('\n').collect::<Vec<_>>().join(" ");
    let flat = flat.trim();
    if flat.chars().count() <= TRUNCATE_LEN {
        flat.to_string()
    } else {
        format!("{}...", flat.chars().take(TRUNCATE_LEN).collect::<String>())
    }
}

enum Candidate<'a> {
    Routine(&'a Routine),
    Reminder(&'a Reminder),
}

impl Candidate<'_> {
    fn id(&self) -> &str {
        match self {
            Candidate::Routine(r) => r.id.as_str(),
            Candidate::Reminder(r) => r.id.as_str(),
        }
    }

    fn allow_ping(&self) -> bool {
        match self {
            Candidate::Routine(r) => r.policy.allow_ping,
            Candidate::Reminder(r) => r.policy.allow_ping,
        }
    }

    fn label(&self) -> String {
        match self {
            Candidate::Routine(r) => r.description.clone().unwrap_or_else(|| "Routine".to_string()),
            Candidate::Reminder(r) if r.max_chain > 0 => {
                let check = r.chain_depth + 1;
                let total = r.max_chain + 1;
                format!("Chain reminder ({check}/{total})")
            }
            Candidate::Reminder(_) => "Reminder".to_string(),
        }
    }

    fn description(&self) -> String {
        match self {
            Candidate::Routine(r) => truncate_description(r.description.as_deref(), &r.message),
            Candidate::Reminder(r) => truncate_description(r.description.as_deref(), &r.message),
        }
    }

    fn file_path(&self) -> String {
        match self {
            Candidate::Routine(r) => r.relative_path(),
            Candidate::Reminder(r) => r.relative_path(),
        }
    }
}

/// Build the forward schedule: every background routine/reminder firing
/// is a candidate, most-recent-first-fired within grace through the
/// dynamic forward window, widened if fewer than [`MIN_FORWARD`] tasks
/// fall inside the base window.
pub fn forward_schedule(
    routines: &[Routine],
    reminders: &[Reminder],
    current_id: &str,
    now: DateTime<Utc>,
    timezone: Tz,
) -> Vec<ScheduleEntry> {
    let base_cutoff = now + Duration::hours(BASE_WINDOW_HOURS);
    let max_cutoff = now + Duration::hours(MAX_WINDOW_HOURS);
    let grace_start = now - Duration::minutes(GRACE_MINUTES);

    let mut candidates: Vec<(DateTime<Utc>, Candidate)> = Vec::new();

    for r in routines {
        if !r.background {
            continue;
        }
        let Ok(cron) = CronSchedule::parse(&r.cron) else {
            continue;
        };
        let local_now = now.with_timezone(&timezone);
        if let Some(prev_local) = cron.prev_within(&local_now, Duration::minutes(GRACE_MINUTES)) {
            candidates.push((prev_local.with_timezone(&Utc), Candidate::Routine(r)));
        }
        if let Some(next_local) = cron.next_after(&local_now) {
            let next = next_local.with_timezone(&Utc);
            if next <= max_cutoff {
                candidates.push((next, Candidate::Routine(r)));
            }
        }
    }

    for rem in reminders {
        if !rem.background {
            continue;
        }
        if rem.run_at >= grace_start && rem.run_at <= max_cutoff {
            candidates.push((rem.run_at, Candidate::Reminder(rem)));
        }
    }

    candidates.sort_by_key(|(t, _)| *t);

    let (forward, recent): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|(t, _)| *t > now);

    let selected_forward = if forward.len() < MIN_FORWARD {
        forward
    } else {
        let in_window: Vec<_> = forward.iter().filter(|(t, _)| *t <= base_cutoff).cloned().collect();
        if in_window.len() >= MIN_FORWARD {
            in_window
        } else {
            forward.into_iter().take(MIN_FORWARD).collect()
        }
    };

    let mut selected = recent;
    selected.extend(selected_forward);

    selected
        .into_iter()
        .map(|(fire_time, item)| {
            let tag = if item.id() == current_id {
                Some("this task")
            } else if fire_time <= now {
                Some("just fired")
            } else {
                None
            };
            ScheduleEntry {
                id: item.id().to_string(),
                fire_time,
                label: item.label(),
                description: item.description(),
                file_path: item.file_path(),
                silent: !item.allow_ping(),
                tag,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_core::policy::ForkPolicy;
    use warden_core::types::ShortId;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn routine(id: &str, cron: &str) -> Routine {
        Routine {
            id: ShortId::from(id),
            message: "do the thing".into(),
            cron: cron.into(),
            description: None,
            background: true,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        }
    }

    #[test]
    fn tags_the_current_entry_as_this_task() {
        let r = routine("rt1", "*/5 * * * *");
        let entries = forward_schedule(&[r], &[], "rt1", at(0), Tz::UTC);
        assert!(entries.iter().any(|e| e.id == "rt1" && e.tag == Some("this task")));
    }

    #[test]
    fn widens_window_when_fewer_than_min_forward() {
        // Fires once at 9h and 11h out — both beyond the 3h base window,
        // but within the 12h max, and fewer than MIN_FORWARD(3) fall in
        // the base window, so the widened window should surface both.
        let r1 = routine("rt1", "0 18 * * *");
        let r2 = routine("rt2", "0 20 * * *");
        let entries = forward_schedule(&[r1, r2], &[], "other", at(0), Tz::UTC);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn never_includes_fires_beyond_max_window() {
        let r = routine("rt1", "0 0 1 1 *");
        let entries = forward_schedule(&[r], &[], "other", at(0), Tz::UTC);
        assert!(entries.is_empty());
    }

    #[test]
    fn foreground_entries_are_excluded() {
        let mut r = routine("rt1", "*/5 * * * *");
        r.background = false;
        let entries = forward_schedule(&[r], &[], "other", at(0), Tz::UTC);
        assert!(entries.is_empty());
    }
}
