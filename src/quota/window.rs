//! Window Reset Policy
//!
//! Fixed-window rollover for usage records. A window that has been open for
//! longer than its length is restarted at `now` and its request and token
//! counters go back to zero. Nothing is swept in the background: records are
//! normalized lazily whenever they are read or written.
//!
//! The auxiliary counters (`ash` / `asd`) are left untouched on rollover.

use super::usage::UsageRecord;

/// Length of the per-minute window in seconds
pub const MINUTE_WINDOW_SECS: i64 = 60;

/// Length of the per-day window in seconds
pub const DAY_WINDOW_SECS: i64 = 60 * 60 * 24;

/// Which windows rolled over during a normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollover {
    pub minute: bool,
    pub day: bool,
}

/// Restart every expired window of `record` at `now`
pub fn normalize(mut record: UsageRecord, now: i64) -> UsageRecord {
    apply(&mut record, now);
    record
}

/// In-place form of [`normalize`], reporting which windows were restarted
pub fn apply(record: &mut UsageRecord, now: i64) -> Rollover {
    let mut rollover = Rollover::default();

    if now - record.last_minute_reset > MINUTE_WINDOW_SECS {
        record.last_minute_reset = now;
        record.requests_this_minute = 0;
        record.tokens_this_minute = record.tokens_this_minute.map(|_| 0);
        rollover.minute = true;
    }

    if now - record.last_day_reset > DAY_WINDOW_SECS {
        record.last_day_reset = now;
        record.requests_this_day = 0;
        record.tokens_this_day = record.tokens_this_day.map(|_| 0);
        rollover.day = true;
    }

    rollover
}
