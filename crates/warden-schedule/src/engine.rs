//! Polling scheduler loop (§4.H): every 10 seconds, diff the routines and
//! reminders on disk against a registry of pending jobs and fire the ones
//! whose time has come. No background timer crate — everything is driven
//! off a `tokio::time::interval` tick, matching the single cooperative
//! event loop the rest of the runtime shares (§5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::cron::CronSchedule;
use crate::error::Result;
use crate::store::ScheduleStore;
use crate::types::{Reminder, Routine};

const POLL_INTERVAL: StdDuration = StdDuration::from_secs(10);
const PAST_DUE_GRACE: StdDuration = StdDuration::from_secs(5);

fn job_id_routine(id: &str) -> String {
    format!("routine_{id}")
}

fn job_id_reminder(id: &str) -> String {
    format!("rem_{id}")
}

/// What fired, handed to whoever is driving the agent runtime.
#[derive(Debug, Clone)]
pub enum Fire {
    Routine(Routine),
    Reminder(Reminder),
}

struct RegisteredJob {
    next_fire: DateTime<Utc>,
    cron: Option<CronSchedule>,
}

/// Drives the 10-second poll/diff/fire loop. Holds no agent-runtime
/// dependency itself — it emits [`Fire`] values on a channel and leaves
/// prompt assembly and execution to the caller.
pub struct SchedulerEngine {
    store: Arc<ScheduleStore>,
    timezone: Tz,
    jobs: HashMap<String, RegisteredJob>,
    tx: mpsc::UnboundedSender<Fire>,
}

impl SchedulerEngine {
    pub fn new(store: Arc<ScheduleStore>, timezone: Tz) -> (Self, mpsc::UnboundedReceiver<Fire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                timezone,
                jobs: HashMap::new(),
                tx,
            },
            rx,
        )
    }

    /// Run the poll loop forever. Intended to be spawned as its own task;
    /// a per-tick error is logged and the loop continues rather than
    /// tearing down (§7: "tolerates per-job exceptions without tearing
    /// down the loop").
    pub async fn run(mut self) {
        let mut ticker = interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(Utc::now()) {
                tracing::error!(error = %e, "scheduler tick failed");
            }
        }
    }

    /// One diff-and-fire pass, exposed separately from [`Self::run`] so
    /// tests can drive it with a fixed `now` instead of wall-clock time.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.register_new(now)?;
        self.prune_missing()?;
        self.fire_due(now)?;
        Ok(())
    }

    fn register_new(&mut self, now: DateTime<Utc>) -> Result<()> {
        for routine in self.store.list_routines()? {
            let job_id = job_id_routine(routine.id.as_str());
            if self.jobs.contains_key(&job_id) {
                continue;
            }
            let cron = match CronSchedule::parse(&routine.cron) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(id = %routine.id, error = %e, "routine has invalid cron, skipping");
                    continue;
                }
            };
            let local_now = now.with_timezone(&self.timezone);
            let Some(next_local) = cron.next_after(&local_now) else {
                tracing::warn!(id = %routine.id, "cron expression never fires");
                continue;
            };
            self.jobs.insert(
                job_id,
                RegisteredJob {
                    next_fire: next_local.with_timezone(&Utc),
                    cron: Some(cron),
                },
            );
        }

        for reminder in self.store.list_reminders()? {
            let job_id = job_id_reminder(reminder.id.as_str());
            if self.jobs.contains_key(&job_id) {
                continue;
            }
            let next_fire = if reminder.run_at <= now {
                now + chrono::Duration::from_std(PAST_DUE_GRACE).unwrap()
            } else {
                reminder.run_at
            };
            self.jobs.insert(job_id, RegisteredJob { next_fire, cron: None });
        }
        Ok(())
    }

    fn prune_missing(&mut self) -> Result<()> {
        let routine_ids: std::collections::HashSet<String> = self
            .store
            .list_routines()?
            .into_iter()
            .map(|r| job_id_routine(r.id.as_str()))
            .collect();
        let reminder_ids: std::collections::HashSet<String> = self
            .store
            .list_reminders()?
            .into_iter()
            .map(|r| job_id_reminder(r.id.as_str()))
            .collect();
        self.jobs.retain(|job_id, _| {
            if job_id.starts_with("routine_") {
                routine_ids.contains(job_id)
            } else {
                reminder_ids.contains(job_id)
            }
        });
        Ok(())
    }

    fn fire_due(&mut self, now: DateTime<Utc>) -> Result<()> {
        let due: Vec<String> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.next_fire <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in due {
            if let Some(suffix) = job_id.strip_prefix("routine_") {
                if let Some(routine) = self
                    .store
                    .list_routines()?
                    .into_iter()
                    .find(|r| r.id.as_str() == suffix)
                {
                    let _ = self.tx.send(Fire::Routine(routine));
                }
                // Recompute the next fire in place rather than removing —
                // routines repeat until the owner deletes the file.
                let mut rescheduled = false;
                if let Some(job) = self.jobs.get(&job_id) {
                    if let Some(cron) = &job.cron {
                        let local_now = now.with_timezone(&self.timezone);
                        if let Some(next_local) = cron.next_after(&local_now) {
                            let next_fire = next_local.with_timezone(&Utc);
                            self.jobs.get_mut(&job_id).unwrap().next_fire = next_fire;
                            rescheduled = true;
                        }
                    }
                }
                if !rescheduled {
                    self.jobs.remove(&job_id);
                }
            } else if let Some(suffix) = job_id.strip_prefix("rem_") {
                if let Some(reminder) = self
                    .store
                    .list_reminders()?
                    .into_iter()
                    .find(|r| r.id.as_str() == suffix)
                {
                    // One-shot: consumed on fire regardless of outcome (§7).
                    let _ = self.store.remove_reminder(suffix);
                    let _ = self.tx.send(Fire::Reminder(reminder));
                }
                self.jobs.remove(&job_id);
            }
        }
        Ok(())
    }

    pub fn registered_job_count(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_core::policy::ForkPolicy;
    use warden_core::types::ShortId;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    #[test]
    fn registers_and_fires_a_due_reminder() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::new(tmp.path()));
        let reminder = Reminder::new(
            ShortId::from("r1"),
            "check build".into(),
            at(0),
            None,
            false,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            0,
            0,
            None,
        )
        .unwrap();
        store.save_reminder(&reminder).unwrap();

        let (mut engine, mut rx) = SchedulerEngine::new(store.clone(), Tz::UTC);
        engine.tick(at(0)).unwrap();
        let fired = rx.try_recv().unwrap();
        match fired {
            Fire::Reminder(r) => assert_eq!(r.id.as_str(), "r1"),
            _ => panic!("expected a reminder fire"),
        }
        assert!(store.list_reminders().unwrap().is_empty());
    }

    #[test]
    fn routine_refires_on_its_own_cron() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::new(tmp.path()));
        let routine = Routine {
            id: ShortId::from("rt1"),
            message: "morning check".into(),
            cron: "*/1 * * * *".into(),
            description: None,
            background: true,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        store.save_routine(&routine).unwrap();

        let (mut engine, mut rx) = SchedulerEngine::new(store.clone(), Tz::UTC);
        engine.tick(at(0)).unwrap();
        assert!(rx.try_recv().is_err());
        engine.tick(at(2)).unwrap();
        assert!(rx.try_recv().is_ok());
        assert_eq!(engine.registered_job_count(), 1);
    }

    #[test]
    fn prunes_job_whose_entry_was_deleted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ScheduleStore::new(tmp.path()));
        let reminder = Reminder::new(
            ShortId::from("r2"),
            "later".into(),
            at(30),
            None,
            false,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            0,
            0,
            None,
        )
        .unwrap();
        store.save_reminder(&reminder).unwrap();

        let (mut engine, _rx) = SchedulerEngine::new(store.clone(), Tz::UTC);
        engine.tick(at(0)).unwrap();
        assert_eq!(engine.registered_job_count(), 1);

        store.remove_reminder("r2").unwrap();
        engine.tick(at(1)).unwrap();
        assert_eq!(engine.registered_job_count(), 0);
    }
}
