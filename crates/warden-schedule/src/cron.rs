//! Five-field cron parsing and evaluation (`minute hour day month dow`,
//! weekday `0=Sunday`), plus the day-of-week name conversion spec.md's
//! Design Notes calls out as a source-language divergence to re-solve.
//!
//! There's no scheduler backend underneath this crate to hand a named-day
//! expression to — `CronSchedule` matches its own numeric fields directly
//! — so [`dow_to_names`]/[`dow_from_names`] exist purely as the documented,
//! testable conversion (§8.3's involution law) rather than glue code for an
//! external dependency.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};

use crate::error::{Result, SchedulerError};

/// One parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: BTreeSet<u32>,
    hour: BTreeSet<u32>,
    day: BTreeSet<u32>,
    month: BTreeSet<u32>,
    dow: BTreeSet<u32>,
    /// Whether the day-of-month field was `*` (changes AND/OR semantics
    /// with day-of-week, per POSIX cron).
    day_is_star: bool,
    dow_is_star: bool,
    source: String,
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<BTreeSet<u32>> {
    let bad = |reason: &str| SchedulerError::InvalidCron {
        expr: field.to_string(),
        reason: reason.to_string(),
    };

    let mut out = BTreeSet::new();
    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((r, s)) => (
                r,
                s.parse::<u32>().map_err(|_| bad("bad step"))?,
            ),
            None => (part, 1),
        };
        if step == 0 {
            return Err(bad("step cannot be zero"));
        }

        let (lo, hi) = if range_part == "*" {
            (min, max)
        } else if let Some((a, b)) = range_part.split_once('-') {
            let a: u32 = a.parse().map_err(|_| bad("bad range start"))?;
            let b: u32 = b.parse().map_err(|_| bad("bad range end"))?;
            if a > b || a < min || b > max {
                return Err(bad("range out of bounds"));
            }
            (a, b)
        } else {
            let v: u32 = range_part.parse().map_err(|_| bad("bad value"))?;
            if v < min || v > max {
                return Err(bad("value out of bounds"));
            }
            (v, v)
        };

        let mut v = lo;
        while v <= hi {
            out.insert(v);
            v += step;
        }
    }
    if out.is_empty() {
        return Err(bad("field matches nothing"));
    }
    Ok(out)
}

impl CronSchedule {
    /// Parse a standard 5-field cron expression. Weekday is 0=Sunday
    /// (7 is also accepted as Sunday, per cron convention).
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(SchedulerError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("expected 5 fields, found {}", fields.len()),
            });
        }
        let minute = parse_field(fields[0], 0, 59)?;
        let hour = parse_field(fields[1], 0, 23)?;
        let day = parse_field(fields[2], 1, 31)?;
        let month = parse_field(fields[3], 1, 12)?;
        let mut dow = parse_field(fields[4], 0, 7)?;
        // 7 is an alias for Sunday (0) in cron convention.
        if dow.remove(&7) {
            dow.insert(0);
        }
        Ok(Self {
            minute,
            hour,
            day,
            month,
            dow,
            day_is_star: fields[2] == "*",
            dow_is_star: fields[4] == "*",
            source: expr.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn matches<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        if !self.minute.contains(&dt.minute()) || !self.hour.contains(&dt.hour()) {
            return false;
        }
        if !self.month.contains(&dt.month()) {
            return false;
        }
        // chrono weekday: Mon=0..Sun=6 via num_days_from_sunday gives Sun=0.
        let dow = dt.weekday().num_days_from_sunday();
        let day_ok = self.day.contains(&dt.day());
        let dow_ok = self.dow.contains(&dow);

        // POSIX rule: if both day-of-month and day-of-week are restricted,
        // a date matches when EITHER is satisfied; if only one is
        // restricted, only that one need match.
        match (self.day_is_star, self.dow_is_star) {
            (true, true) => true,
            (true, false) => dow_ok,
            (false, true) => day_ok,
            (false, false) => day_ok || dow_ok,
        }
    }

    /// First fire strictly after `from`, searching minute-by-minute up to
    /// four years out. `None` means the expression can never match (e.g.
    /// `31 2 29 2 *` combined with a day-of-week that never lands there
    /// in range — vanishingly rare but not impossible to construct).
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut candidate = truncate_to_minute(from) + Duration::minutes(1);
        let limit = truncate_to_minute(from) + Duration::days(4 * 366);
        while candidate <= limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    /// Most recent fire at or before `from`, but not before `from - grace`.
    /// Used for the forward-schedule's "just fired" lookback window.
    pub fn prev_within<Tz: TimeZone>(
        &self,
        from: &DateTime<Tz>,
        grace: Duration,
    ) -> Option<DateTime<Tz>> {
        let mut candidate = truncate_to_minute(from);
        let limit = candidate.clone() - grace;
        while candidate >= limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate -= Duration::minutes(1);
        }
        None
    }
}

fn truncate_to_minute<Tz: TimeZone>(dt: &DateTime<Tz>) -> DateTime<Tz> {
    dt.clone() - Duration::seconds(dt.second() as i64) - Duration::nanoseconds(dt.nanosecond() as i64)
}

const DOW_NAMES: [(&str, &str); 7] = [
    ("0", "sun"),
    ("1", "mon"),
    ("2", "tue"),
    ("3", "wed"),
    ("4", "thu"),
    ("5", "fri"),
    ("6", "sat"),
];

fn map_token(token: &str, table: &[(&str, &str)], forward: bool) -> String {
    for (num, name) in table {
        let (from, to) = if forward { (num, name) } else { (name, num) };
        if token.eq_ignore_ascii_case(from) {
            return (*to).to_string();
        }
    }
    token.to_string()
}

/// Map a standard-cron `0=Sunday` numeric weekday field to named days
/// (`sun`..`sat`), preserving `*`, lists, ranges, and steps. Mirrors the
/// original scheduler's `_convert_dow`.
pub fn dow_to_names(field: &str) -> String {
    convert_dow(field, true)
}

/// Inverse of [`dow_to_names`]: named days back to numeric `0=Sunday`
/// tokens. Exists so the conversion is demonstrably an involution
/// (`dow_from_names(dow_to_names(x)) == x`), per §8.3.
pub fn dow_from_names(field: &str) -> String {
    convert_dow(field, false)
}

fn convert_dow(field: &str, forward: bool) -> String {
    if field == "*" || field.starts_with("*/") {
        return field.to_string();
    }
    field
        .split(',')
        .map(|part| convert_dow_part(part, forward))
        .collect::<Vec<_>>()
        .join(",")
}

fn convert_dow_part(part: &str, forward: bool) -> String {
    if let Some((range_part, step)) = part.split_once('/') {
        return format!("{}/{}", convert_range(range_part, forward), step);
    }
    convert_range(part, forward)
}

fn convert_range(part: &str, forward: bool) -> String {
    if let Some((a, b)) = part.split_once('-') {
        format!(
            "{}-{}",
            map_token(a, &DOW_NAMES, forward),
            map_token(b, &DOW_NAMES, forward)
        )
    } else {
        map_token(part, &DOW_NAMES, forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::UTC;

    #[test]
    fn rejects_wrong_field_count() {
        assert!(CronSchedule::parse("0 9 * *").is_err());
    }

    #[test]
    fn weekday_alias_seven_is_sunday() {
        let sched = CronSchedule::parse("0 9 * * 7").unwrap();
        let sunday = UTC.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        assert!(sched.next_after(&(sunday - Duration::minutes(1))) == Some(sunday));
    }

    #[test]
    fn weekday_range_matches_monday_through_friday() {
        let sched = CronSchedule::parse("0 9 * * 1-5").unwrap();
        // 2026-02-02 is a Monday.
        let monday = UTC.with_ymd_and_hms(2026, 2, 2, 9, 0, 0).unwrap();
        let from = monday - Duration::days(3);
        assert_eq!(sched.next_after(&from), Some(monday));
    }

    #[test]
    fn posix_or_semantics_when_both_day_and_dow_restricted() {
        // Fires on the 1st of the month OR on Sundays.
        let sched = CronSchedule::parse("0 0 1 * 0").unwrap();
        let sunday_not_first = UTC.with_ymd_and_hms(2026, 2, 8, 0, 0, 0).unwrap(); // a Sunday
        assert!(sched.next_after(&(sunday_not_first - Duration::minutes(1))) == Some(sunday_not_first));
    }

    #[test]
    fn dow_conversion_is_an_involution() {
        for field in ["0", "1-5", "0,6", "*/2", "1-3/2", "*"] {
            let names = dow_to_names(field);
            let back = dow_from_names(&names);
            assert_eq!(back, field, "round trip failed for {field}");
        }
    }

    #[test]
    fn dow_to_names_matches_known_mapping() {
        assert_eq!(dow_to_names("0"), "sun");
        assert_eq!(dow_to_names("1-5"), "mon-fri");
        assert_eq!(dow_to_names("0,6"), "sun,sat");
    }
}
