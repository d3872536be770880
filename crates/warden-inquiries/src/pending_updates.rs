//! Ordered list of `(timestamp, message)` entries appended by forks that
//! chose to report back. Drained before the next main-session user turn
//! so their content is prepended into that turn.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_storage::json::{read_json, write_json};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// File-backed, insertion-ordered queue of pending updates.
pub struct PendingUpdates {
    path: PathBuf,
}

impl PendingUpdates {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<PendingUpdate>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn save(&self, updates: &[PendingUpdate]) -> Result<()> {
        write_json(&self.path, &updates)?;
        Ok(())
    }

    /// Append one update, preserving insertion order.
    pub fn append(&self, message: &str, now: DateTime<Utc>) -> Result<()> {
        let mut updates = self.load()?;
        updates.push(PendingUpdate {
            timestamp: now,
            message: message.to_string(),
        });
        self.save(&updates)
    }

    /// Read without removing.
    pub fn peek(&self) -> Result<Vec<PendingUpdate>> {
        self.load()
    }

    /// Remove and return every pending update, oldest first.
    pub fn pop_all(&self) -> Result<Vec<PendingUpdate>> {
        let updates = self.load()?;
        self.save(&[])?;
        Ok(updates)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn append_preserves_insertion_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PendingUpdates::new(tmp.path().join("pending_updates.json"));
        store.append("first", at(0)).unwrap();
        store.append("second", at(1)).unwrap();
        let all = store.peek().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "first");
        assert_eq!(all[1].message, "second");
    }

    #[test]
    fn pop_all_drains_and_clears() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PendingUpdates::new(tmp.path().join("pending_updates.json"));
        store.append("a", at(0)).unwrap();
        let drained = store.pop_all().unwrap();
        assert_eq!(drained.len(), 1);
        assert!(store.peek().unwrap().is_empty());
    }
}
