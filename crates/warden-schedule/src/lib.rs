//! `warden-schedule` — file-backed routines, reminders and webhooks, plus
//! the polling loop that turns them into agent prompts.
//!
//! Entries live as markdown files with a YAML header (see
//! `warden_storage::markdown`); there is no database. The
//! [`engine::SchedulerEngine`] polls the entry directories every 10
//! seconds, diffs them against its own job registry, and emits a
//! [`engine::Fire`] for whichever routine or reminder is due.

pub mod cron;
pub mod engine;
pub mod error;
pub mod store;
pub mod types;

pub use cron::{dow_from_names, dow_to_names, CronSchedule};
pub use engine::{Fire, SchedulerEngine};
pub use error::{Result, SchedulerError};
pub use store::ScheduleStore;
pub use types::{FieldSpec, FieldType, Reminder, Routine, WebhookSpec};
