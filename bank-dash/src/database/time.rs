//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use chrono::{DateTime, TimeZone, Utc};

#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Out-of-range values clamp to the nearest representable timestamp.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None if ms.is_negative() => DateTime::<Utc>::MIN_UTC,
        chrono::LocalResult::None => DateTime::<Utc>::MAX_UTC,
    }
}
