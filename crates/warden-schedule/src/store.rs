//! Directory-backed persistence for routines, reminders, and webhooks,
//! layered on top of `warden_storage::markdown`'s atomic entry format.

use std::path::{Path, PathBuf};

use warden_storage::markdown;

use crate::error::{Result, SchedulerError};
use crate::types::{Reminder, Routine, WebhookSpec};

/// Owns the three entry directories under the state dir (`routines/`,
/// `reminders/`, `webhooks/`) and converts to/from the typed entries.
pub struct ScheduleStore {
    routines_dir: PathBuf,
    reminders_dir: PathBuf,
    webhooks_dir: PathBuf,
}

impl ScheduleStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        let state_dir = state_dir.as_ref();
        Self {
            routines_dir: state_dir.join("routines"),
            reminders_dir: state_dir.join("reminders"),
            webhooks_dir: state_dir.join("webhooks"),
        }
    }

    pub fn list_routines(&self) -> Result<Vec<Routine>> {
        let mut out = Vec::new();
        for (path, entry) in markdown::read_dir(&self.routines_dir)? {
            match Routine::from_header(&entry.header, &entry.body) {
                Ok(routine) => out.push(routine),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed routine");
                }
            }
        }
        Ok(out)
    }

    pub fn list_reminders(&self) -> Result<Vec<Reminder>> {
        let mut out = Vec::new();
        for (path, entry) in markdown::read_dir(&self.reminders_dir)? {
            match Reminder::from_header(&entry.header, &entry.body) {
                Ok(reminder) => out.push(reminder),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed reminder");
                }
            }
        }
        Ok(out)
    }

    pub fn list_webhooks(&self) -> Result<Vec<WebhookSpec>> {
        let mut out = Vec::new();
        for (path, entry) in markdown::read_dir(&self.webhooks_dir)? {
            match WebhookSpec::from_header(&entry.header, &entry.body) {
                Ok(webhook) => out.push(webhook),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed webhook");
                }
            }
        }
        Ok(out)
    }

    pub fn find_webhook(&self, id: &str) -> Result<Option<WebhookSpec>> {
        Ok(self.list_webhooks()?.into_iter().find(|w| w.id == id))
    }

    pub fn save_routine(&self, routine: &Routine) -> Result<PathBuf> {
        let header = routine.to_header();
        Ok(markdown::write(
            &self.routines_dir,
            routine.id.as_str(),
            &routine.message,
            &header,
            &routine.message,
        )?)
    }

    pub fn save_reminder(&self, reminder: &Reminder) -> Result<PathBuf> {
        let header = reminder.to_header();
        Ok(markdown::write(
            &self.reminders_dir,
            reminder.id.as_str(),
            &reminder.message,
            &header,
            &reminder.message,
        )?)
    }

    pub fn save_webhook(&self, webhook: &WebhookSpec) -> Result<PathBuf> {
        let header = webhook.to_header();
        Ok(markdown::write(
            &self.webhooks_dir,
            &webhook.id,
            &webhook.id,
            &header,
            &webhook.message,
        )?)
    }

    pub fn remove_routine(&self, id: &str) -> Result<()> {
        if !markdown::remove(&self.routines_dir, id)? {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn remove_reminder(&self, id: &str) -> Result<()> {
        if !markdown::remove(&self.reminders_dir, id)? {
            return Err(SchedulerError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use warden_core::policy::ForkPolicy;
    use warden_core::types::ShortId;

    #[test]
    fn routine_round_trips_through_store() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(tmp.path());
        let routine = Routine {
            id: ShortId::from("abc12345"),
            message: "water the garden".to_string(),
            cron: "0 7 * * *".to_string(),
            description: None,
            background: true,
            skip_if_busy: false,
            model: None,
            isolated: false,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        store.save_routine(&routine).unwrap();
        let loaded = store.list_routines().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].cron, "0 7 * * *");
    }

    #[test]
    fn reminder_remove_reports_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(tmp.path());
        assert!(store.remove_reminder("nope").is_err());
    }

    #[test]
    fn webhook_lookup_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(tmp.path());
        let webhook = WebhookSpec {
            id: "ci".to_string(),
            message: "build finished".to_string(),
            fields: Default::default(),
            isolated: false,
            model: None,
            thinking: true,
            policy: ForkPolicy::default(),
        };
        store.save_webhook(&webhook).unwrap();
        assert!(store.find_webhook("ci").unwrap().is_some());
        assert!(store.find_webhook("missing").unwrap().is_none());
    }

    #[test]
    fn reminders_sort_and_survive_chain_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ScheduleStore::new(tmp.path());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let reminder = Reminder::new(
            ShortId::from("child123"),
            "follow up".into(),
            now,
            None,
            true,
            false,
            None,
            false,
            true,
            ForkPolicy::default(),
            1,
            2,
            Some(ShortId::from("root1234")),
        )
        .unwrap();
        store.save_reminder(&reminder).unwrap();
        let loaded = store.list_reminders().unwrap();
        assert_eq!(loaded[0].chain_parent.as_ref().unwrap().as_str(), "root1234");
    }
}
