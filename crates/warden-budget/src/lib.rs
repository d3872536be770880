//! Refill-on-read ping budget: a leaky bucket gating how often the agent
//! may proactively message the owner from a background fork, plus daily
//! and critical-use counters for the preamble summary.

pub mod error;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use warden_storage::json::{read_json, write_json};

pub use error::{BudgetError, Result};

const DEFAULT_CAPACITY: f64 = 5.0;
const DEFAULT_REFILL_RATE_MINUTES: f64 = 90.0;

/// Persisted ping-budget state. `available` is refilled lazily — every
/// read computes the refill against `now` before looking at the value,
/// so there is no background task driving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingBudget {
    capacity: f64,
    available: f64,
    refill_rate_minutes: f64,
    last_refill: DateTime<Utc>,
    critical_used: u32,
    critical_reset_date: NaiveDate,
    daily_used: u32,
    daily_used_reset: NaiveDate,
}

impl PingBudget {
    /// A fresh, fully-available budget as of `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            available: DEFAULT_CAPACITY,
            refill_rate_minutes: DEFAULT_REFILL_RATE_MINUTES,
            last_refill: now,
            critical_used: 0,
            critical_reset_date: now.date_naive(),
            daily_used: 0,
            daily_used_reset: now.date_naive(),
        }
    }

    /// Apply refill and daily-counter resets for `now`. Idempotent: call
    /// before reading any field so reads always reflect elapsed time.
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        let elapsed_minutes =
            (now - self.last_refill).num_milliseconds() as f64 / 60_000.0;
        if elapsed_minutes > 0.0 {
            let refilled = elapsed_minutes / self.refill_rate_minutes;
            self.available = (self.available + refilled).min(self.capacity);
        }
        self.last_refill = now;

        let today = now.date_naive();
        if self.daily_used_reset != today {
            self.daily_used = 0;
            self.daily_used_reset = today;
        }
        if self.critical_reset_date != today {
            self.critical_used = 0;
            self.critical_reset_date = today;
        }
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate_minutes(&self) -> f64 {
        self.refill_rate_minutes
    }

    pub fn daily_used(&self) -> u32 {
        self.daily_used
    }

    pub fn critical_used(&self) -> u32 {
        self.critical_used
    }

    /// Attempt to spend one regular token. Refreshes first. Returns
    /// `false` (leaving state otherwise unchanged) when exhausted.
    pub fn try_use(&mut self, now: DateTime<Utc>) -> bool {
        self.refresh(now);
        if self.available >= 1.0 {
            self.available -= 1.0;
            self.daily_used += 1;
            true
        } else {
            false
        }
    }

    /// Record a critical ping. Bypasses the regular bucket entirely —
    /// always succeeds — but still counts toward `critical_used` for
    /// reporting. Callers enforce `allow_ping` separately; critical does
    /// not override it.
    pub fn record_critical(&mut self, now: DateTime<Utc>) {
        self.refresh(now);
        self.critical_used += 1;
    }

    pub fn set_capacity(&mut self, capacity: f64) {
        self.capacity = capacity;
        self.available = self.available.min(capacity);
    }

    pub fn set_refill_rate(&mut self, refill_rate_minutes: f64) {
        self.refill_rate_minutes = refill_rate_minutes;
    }

    /// Minutes until one more whole token becomes available, 0 if one
    /// already is.
    pub fn minutes_to_next_refill(&self, now: DateTime<Utc>) -> f64 {
        let mut projected = self.clone();
        projected.refresh(now);
        if projected.available >= 1.0 {
            return 0.0;
        }
        (1.0 - projected.available) * projected.refill_rate_minutes
    }

    /// One-line summary for the preamble: remaining tokens and today's
    /// regular usage.
    pub fn status_string(&self) -> String {
        format!(
            "{:.1}/{} pings available, {} used today",
            self.available, self.capacity as i64, self.daily_used
        )
    }

    /// Fuller summary including critical usage, for contexts with more
    /// room (e.g. the CLI).
    pub fn full_status_string(&self) -> String {
        format!(
            "{:.1}/{} pings available (refills 1 per {:.0}m), {} used today, {} critical today",
            self.available,
            self.capacity as i64,
            self.refill_rate_minutes,
            self.daily_used,
            self.critical_used
        )
    }

    /// Load the persisted budget at `path`, refreshing it against `now`;
    /// a missing file yields a fresh full budget rather than an error —
    /// first run has nothing to load yet.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let mut budget = read_json(path)?.unwrap_or_else(|| PingBudget::new(now));
        budget.refresh(now);
        Ok(budget)
    }

    /// Persist the current state atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)?;
        Ok(())
    }
}

/// File-backed handle bundling a path with load/refresh/save, for callers
/// that don't want to thread the path through every call.
pub struct BudgetStore {
    path: PathBuf,
}

impl BudgetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self, now: DateTime<Utc>) -> Result<PingBudget> {
        PingBudget::load(&self.path, now)
    }

    pub fn save(&self, budget: &PingBudget) -> Result<()> {
        budget.save(&self.path)
    }

    /// Refill, then attempt to spend one regular token, persisting the
    /// result either way.
    pub fn try_use(&self, now: DateTime<Utc>) -> Result<bool> {
        let mut budget = self.load(now)?;
        let ok = budget.try_use(now);
        self.save(&budget)?;
        Ok(ok)
    }

    /// Record a critical ping and persist.
    pub fn record_critical(&self, now: DateTime<Utc>) -> Result<()> {
        let mut budget = self.load(now)?;
        budget.record_critical(now);
        self.save(&budget)
    }

    pub fn set_capacity(&self, now: DateTime<Utc>, capacity: f64) -> Result<()> {
        let mut budget = self.load(now)?;
        budget.set_capacity(capacity);
        self.save(&budget)
    }

    pub fn set_refill_rate(&self, now: DateTime<Utc>, minutes: f64) -> Result<()> {
        let mut budget = self.load(now)?;
        budget.set_refill_rate(minutes);
        self.save(&budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    #[test]
    fn fresh_budget_is_full() {
        let b = PingBudget::new(at(0));
        assert_eq!(b.available(), 5.0);
    }

    #[test]
    fn refill_respects_capacity_ceiling() {
        let mut b = PingBudget::new(at(0));
        for _ in 0..5 {
            assert!(b.try_use(at(0)));
        }
        assert!(!b.try_use(at(0)));
        // wait far longer than needed to refill fully
        b.refresh(at(10_000));
        assert_eq!(b.available(), 5.0);
    }

    #[test]
    fn try_use_fails_when_exhausted_and_leaves_state() {
        let mut b = PingBudget::new(at(0));
        for _ in 0..5 {
            b.try_use(at(0));
        }
        let before = b.available();
        assert!(!b.try_use(at(1)));
        assert!(b.available() >= before);
    }

    #[test]
    fn critical_bypasses_bucket_but_is_counted() {
        let mut b = PingBudget::new(at(0));
        for _ in 0..5 {
            b.try_use(at(0));
        }
        b.record_critical(at(0));
        b.record_critical(at(0));
        assert_eq!(b.critical_used(), 2);
        assert_eq!(b.available(), 0.0);
    }

    #[test]
    fn daily_counters_reset_on_new_day() {
        let mut b = PingBudget::new(at(0));
        b.try_use(at(0));
        assert_eq!(b.daily_used(), 1);
        let next_day = at(0) + chrono::Duration::days(1);
        b.refresh(next_day);
        assert_eq!(b.daily_used(), 0);
    }

    #[test]
    fn set_capacity_clamps_available_down() {
        let mut b = PingBudget::new(at(0));
        b.set_capacity(2.0);
        assert_eq!(b.available(), 2.0);
    }

    #[test]
    fn store_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ping_budget.json");
        let store = BudgetStore::new(&path);
        assert!(store.try_use(at(0)).unwrap());
        let loaded = store.load(at(0)).unwrap();
        assert_eq!(loaded.available(), 4.0);
    }

    #[test]
    fn missing_file_loads_as_fresh_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("missing.json");
        let loaded = PingBudget::load(&path, at(0)).unwrap();
        assert_eq!(loaded.available(), 5.0);
    }
}
