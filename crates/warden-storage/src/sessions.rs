//! Session identity and lifecycle-event log: `sessions.json` plus an
//! append-only `session_history.jsonl`, the two files under §3.5/§6.4
//! that let the process resume its last session id across a restart and
//! retain a full audit trail of how every session came to exist.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::json::{append_jsonl, read_json, write_json};

/// One tracked session: its own id, the session it forked from (if any),
/// and when it was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub parent_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle events recorded in `session_history.jsonl`. Retention is
/// append-only — no pruning — so this is a full audit trail, not a
/// working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Created,
    Compacted,
    Forked,
    Promoted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    session_id: String,
    parent_session_id: Option<String>,
    event: SessionEvent,
    timestamp: DateTime<Utc>,
}

/// File-backed session identity store: current session record plus an
/// append-only event log, both under the owner's state directory.
pub struct SessionStore {
    sessions_path: PathBuf,
    history_path: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            sessions_path: state_dir.join("sessions.json"),
            history_path: state_dir.join("session_history.jsonl"),
        }
    }

    /// The last-known main session id, if one has ever been recorded.
    pub fn current(&self) -> Result<Option<SessionRecord>> {
        read_json(&self.sessions_path)
    }

    /// Record a freshly created session as the current one and append a
    /// `created` event.
    pub fn record_created(
        &self,
        session_id: &str,
        parent_session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = SessionRecord {
            session_id: session_id.to_string(),
            parent_session_id: parent_session_id.map(str::to_string),
            created_at: now,
        };
        write_json(&self.sessions_path, &record)?;
        self.append_event(session_id, parent_session_id, SessionEvent::Created, now)
    }

    /// Append a `forked` event without changing the current session
    /// record — the fork's own session only becomes current if promoted.
    pub fn record_forked(
        &self,
        session_id: &str,
        parent_session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.append_event(
            session_id,
            Some(parent_session_id),
            SessionEvent::Forked,
            now,
        )
    }

    /// Append a `compacted` event for the current main session.
    pub fn record_compacted(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.append_event(session_id, None, SessionEvent::Compacted, now)
    }

    /// A forked session replaced the main session: update the current
    /// record and append a `promoted` event.
    pub fn record_promoted(
        &self,
        session_id: &str,
        parent_session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let record = SessionRecord {
            session_id: session_id.to_string(),
            parent_session_id: parent_session_id.map(str::to_string),
            created_at: now,
        };
        write_json(&self.sessions_path, &record)?;
        self.append_event(session_id, parent_session_id, SessionEvent::Promoted, now)
    }

    /// Full history, oldest first, for `warden sessions`-style inspection.
    pub fn history(&self) -> Result<Vec<(String, Option<String>, SessionEvent, DateTime<Utc>)>> {
        let entries: Vec<HistoryEntry> = crate::json::read_jsonl(&self.history_path)?;
        Ok(entries
            .into_iter()
            .map(|e| (e.session_id, e.parent_session_id, e.event, e.timestamp))
            .collect())
    }

    fn append_event(
        &self,
        session_id: &str,
        parent_session_id: Option<&str>,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<()> {
        append_jsonl(
            &self.history_path,
            &HistoryEntry {
                session_id: session_id.to_string(),
                parent_session_id: parent_session_id.map(str::to_string),
                event,
                timestamp: now,
            },
        )
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
    fn no_current_session_before_anything_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        assert!(store.current().unwrap().is_none());
    }

    #[test]
    fn record_created_sets_current_and_logs_event() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.record_created("sess-1", None, at(0)).unwrap();

        let current = store.current().unwrap().unwrap();
        assert_eq!(current.session_id, "sess-1");
        assert!(current.parent_session_id.is_none());

        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, "sess-1");
        assert_eq!(history[0].2, SessionEvent::Created);
    }

    #[test]
    fn forked_session_does_not_change_current_until_promoted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.record_created("main-1", None, at(0)).unwrap();
        store.record_forked("fork-1", "main-1", at(1)).unwrap();

        assert_eq!(store.current().unwrap().unwrap().session_id, "main-1");

        store
            .record_promoted("fork-1", Some("main-1"), at(2))
            .unwrap();
        let current = store.current().unwrap().unwrap();
        assert_eq!(current.session_id, "fork-1");
        assert_eq!(current.parent_session_id.as_deref(), Some("main-1"));

        let history = store.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].2, SessionEvent::Forked);
        assert_eq!(history[2].2, SessionEvent::Promoted);
    }

    #[test]
    fn history_is_append_only_across_compaction() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.record_created("sess-1", None, at(0)).unwrap();
        store.record_compacted("sess-1", at(1)).unwrap();
        store.record_compacted("sess-1", at(2)).unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].2, SessionEvent::Compacted);
        assert_eq!(history[2].2, SessionEvent::Compacted);
        // current session record is untouched by compaction events
        assert_eq!(store.current().unwrap().unwrap().session_id, "sess-1");
    }
}
