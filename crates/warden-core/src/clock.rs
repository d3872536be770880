//! Clock abstraction so time-dependent logic (ping budget refill, idle
//! watchdog, forward schedule) can be driven by a virtual clock in tests
//! instead of the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of "now" for both wall-clock timestamps and monotonic durations.
///
/// Implementors must be cheap to call repeatedly — every budget read and
/// every scheduler tick calls `now()`.
pub trait Clock: Send + Sync {
    /// Calendar time, used for persisted timestamps and cron evaluation.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic milliseconds since an arbitrary epoch, used for idle
    /// tracking where calendar adjustments (DST, clock skew) must not
    /// perturb duration comparisons.
    fn monotonic_ms(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> i64 {
        // `std::time::Instant` isn't `Copy`-comparable across threads without
        // a fixed origin, so we anchor to process start once and report
        // elapsed milliseconds from there.
        static ORIGIN: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let origin = *ORIGIN.get_or_init(std::time::Instant::now);
        origin.elapsed().as_millis() as i64
    }
}

/// A clock that advances only when told to — for property tests that drive
/// virtual time through budget refills, idle timeouts, and forward-schedule
/// windows without sleeping in real time.
pub struct VirtualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
    mono_ms: AtomicI64,
}

impl VirtualClock {
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
            mono_ms: AtomicI64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("virtual clock poisoned");
        *guard += chrono::Duration::from_std(by).expect("duration fits in chrono range");
        self.mono_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("virtual clock poisoned")
    }

    fn monotonic_ms(&self) -> i64 {
        self.mono_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_advances_both_calendar_and_monotonic() {
        let clock = VirtualClock::at(DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc));
        let before = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(90));
        assert_eq!(clock.monotonic_ms(), 90_000);
    }
}
