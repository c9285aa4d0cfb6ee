//! Calendar-day windows used by the scan quota and the daily summary.

use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// Half-open `[start, end)` covering the calendar day of `now`, with
/// midnight taken in the fixed `offset`.
pub fn day_window(now: OffsetDateTime, offset: UtcOffset) -> (OffsetDateTime, OffsetDateTime) {
    let start = now.to_offset(offset).replace_time(Time::MIDNIGHT);
    (start, start + Duration::days(1))
}
