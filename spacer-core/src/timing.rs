//! Study-day boundaries.
//!
//! A collection counts days from its creation; a day starts at the configured
//! rollover hour. Timezone-aware timing is used once the collection records
//! the offset it was created in, otherwise days are counted in UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

pub const SECS_PER_DAY: i64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedTimingToday {
    /// Days since the collection was created ("today").
    pub days_elapsed: u32,
    /// Unix timestamp at which the next study day starts.
    pub next_day_at: i64,
}

fn datetime_from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Offset for `minutes_west`, clamped to +/- 23 hours.
pub fn fixed_offset_from_minutes(minutes_west: i32) -> FixedOffset {
    let bounded = minutes_west.clamp(-23 * 60, 23 * 60);
    FixedOffset::west_opt(bounded * 60).unwrap_or_else(|| Utc.fix())
}

/// Maps the rollover setting into 0..=23; negative hours count back from midnight.
pub fn normalized_rollover_hour(hour: i32) -> u32 {
    let capped = hour.clamp(-23, 23);
    if capped < 0 {
        (24 + capped) as u32
    } else {
        capped as u32
    }
}

fn at_hour(date: NaiveDate, hour: u32) -> chrono::NaiveDateTime {
    date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

/// Timezone-aware timing.
pub fn sched_timing_today(
    created_secs: i64,
    created_minutes_west: i32,
    now_secs: i64,
    now_minutes_west: i32,
    rollover_hour: i32,
) -> SchedTimingToday {
    let created_date = datetime_from_secs(created_secs)
        .with_timezone(&fixed_offset_from_minutes(created_minutes_west))
        .date_naive();
    let now_offset = fixed_offset_from_minutes(now_minutes_west);
    let now_local = datetime_from_secs(now_secs).with_timezone(&now_offset);

    let hour = normalized_rollover_hour(rollover_hour);
    let rollover_today = at_hour(now_local.date_naive(), hour).and_utc().timestamp()
        - i64::from(now_offset.local_minus_utc());
    let rollover_passed = rollover_today <= now_secs;
    let next_day_at = if rollover_passed {
        rollover_today + SECS_PER_DAY
    } else {
        rollover_today
    };

    SchedTimingToday {
        days_elapsed: days_elapsed(created_date, now_local.date_naive(), rollover_passed),
        next_day_at,
    }
}

fn days_elapsed(start: NaiveDate, end: NaiveDate, rollover_passed: bool) -> u32 {
    let days = (end - start).num_days();
    // the current day doesn't count until its rollover has passed
    let days = if rollover_passed { days } else { days - 1 };
    days.max(0) as u32
}

/// UTC-only timing used by collections without a creation offset.
pub fn legacy_timing_today(created_secs: i64, now_secs: i64, rollover_hour: i32) -> SchedTimingToday {
    let hour = normalized_rollover_hour(rollover_hour);
    let start = at_hour(datetime_from_secs(created_secs).date_naive(), hour)
        .and_utc()
        .timestamp();
    let days = ((now_secs - start) / SECS_PER_DAY).max(0);
    SchedTimingToday {
        days_elapsed: days as u32,
        next_day_at: legacy_day_cutoff(now_secs, rollover_hour),
    }
}

/// Next UTC rollover instant after `now_secs`.
pub fn legacy_day_cutoff(now_secs: i64, rollover_hour: i32) -> i64 {
    let hour = normalized_rollover_hour(rollover_hour);
    let today = at_hour(datetime_from_secs(now_secs).date_naive(), hour)
        .and_utc()
        .timestamp();
    if today <= now_secs {
        today + SECS_PER_DAY
    } else {
        today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn one_day_after_creation_past_rollover() {
        let created = ts(2024, 1, 1, 10);
        let now = created + 25 * 3600;
        let timing = sched_timing_today(created, 0, now, 0, 4);
        assert_eq!(timing.days_elapsed, 1);
        assert_eq!(timing.next_day_at, ts(2024, 1, 3, 4));

        let legacy = legacy_timing_today(created, now, 4);
        assert_eq!(legacy.days_elapsed, 1);
        assert_eq!(legacy.next_day_at, ts(2024, 1, 3, 4));
    }

    #[test]
    fn before_rollover_counts_as_previous_day() {
        let created = ts(2024, 1, 1, 10);
        let timing = sched_timing_today(created, 0, ts(2024, 1, 2, 3), 0, 4);
        assert_eq!(timing.days_elapsed, 0);
        assert_eq!(timing.next_day_at, ts(2024, 1, 2, 4));
    }

    #[test]
    fn rollover_uses_local_offset() {
        // UTC-5: 04:00 local is 09:00 UTC
        let created = ts(2024, 1, 1, 15);
        let now = ts(2024, 1, 2, 16);
        let timing = sched_timing_today(created, 300, now, 300, 4);
        assert_eq!(timing.days_elapsed, 1);
        assert_eq!(timing.next_day_at, ts(2024, 1, 3, 9));
    }

    #[test]
    fn offsets_are_clamped() {
        assert_eq!(fixed_offset_from_minutes(5000).local_minus_utc(), -23 * 3600);
        assert_eq!(fixed_offset_from_minutes(-5000).local_minus_utc(), 23 * 3600);
    }

    #[test]
    fn negative_rollover_counts_back_from_midnight() {
        assert_eq!(normalized_rollover_hour(-1), 23);
        assert_eq!(normalized_rollover_hour(30), 23);
        assert_eq!(normalized_rollover_hour(0), 0);
    }

    #[test]
    fn cutoff_always_in_future() {
        let now = ts(2024, 3, 10, 4);
        assert_eq!(legacy_day_cutoff(now, 4), ts(2024, 3, 11, 4));
        assert_eq!(legacy_day_cutoff(now - 1, 4), now);
    }

    #[test]
    fn never_negative_before_creation() {
        let created = ts(2024, 1, 5, 10);
        assert_eq!(legacy_timing_today(created, created - 3600, 4).days_elapsed, 0);
        assert_eq!(sched_timing_today(created, 0, created - 3600, 0, 4).days_elapsed, 0);
    }
}
