//! Clickable-button prompt storage. When the bot renders a button whose
//! action should resume a stored prompt, it registers the prompt here
//! first so the click survives a process restart; entries older than
//! `MAX_AGE` are pruned whenever the store is read.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use warden_core::types::ShortId;
use warden_storage::json::{read_json, write_json};

use crate::error::Result;

const MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InquiryRecord {
    prompt: String,
    ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InquiriesFile(HashMap<String, InquiryRecord>);

/// File-backed store of id -> prompt, with a 7-day TTL.
pub struct Inquiries {
    path: PathBuf,
}

impl Inquiries {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self, now: DateTime<Utc>) -> Result<InquiriesFile> {
        let mut file: InquiriesFile = read_json(&self.path)?.unwrap_or_default();
        let cutoff = now - Duration::days(MAX_AGE_DAYS);
        file.0.retain(|_, rec| rec.ts >= cutoff);
        Ok(file)
    }

    fn save(&self, file: &InquiriesFile) -> Result<()> {
        write_json(&self.path, file)?;
        Ok(())
    }

    /// Store `prompt` under a freshly-generated id and persist it.
    pub fn register(&self, prompt: &str, now: DateTime<Utc>) -> Result<ShortId> {
        let mut file = self.load(now)?;
        let id = ShortId::new();
        file.0.insert(
            id.as_str().to_string(),
            InquiryRecord {
                prompt: prompt.to_string(),
                ts: now,
            },
        );
        self.save(&file)?;
        Ok(id)
    }

    /// Remove and return the prompt for `id`, if present and unexpired.
    pub fn pop(&self, id: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let mut file = self.load(now)?;
        let removed = file.0.remove(id).map(|rec| rec.prompt);
        self.save(&file)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    #[test]
    fn register_then_pop_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Inquiries::new(tmp.path().join("inquiries.json"));
        let id = store.register("do the thing", at(0)).unwrap();
        let popped = store.pop(id.as_str(), at(0)).unwrap();
        assert_eq!(popped.as_deref(), Some("do the thing"));
    }

    #[test]
    fn pop_is_once_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Inquiries::new(tmp.path().join("inquiries.json"));
        let id = store.register("do the thing", at(0)).unwrap();
        store.pop(id.as_str(), at(0)).unwrap();
        assert_eq!(store.pop(id.as_str(), at(0)).unwrap(), None);
    }

    #[test]
    fn entries_older_than_seven_days_are_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Inquiries::new(tmp.path().join("inquiries.json"));
        let id = store.register("stale", at(0)).unwrap();
        assert_eq!(store.pop(id.as_str(), at(8)).unwrap(), None);
    }

    #[test]
    fn unknown_id_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Inquiries::new(tmp.path().join("inquiries.json"));
        assert_eq!(store.pop("doesnotexist", at(0)).unwrap(), None);
    }
}
