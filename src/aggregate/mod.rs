//! Pure aggregation functions that turn raw per-sample agent payloads into
//! the 1-minute summaries stored by the typed pollers (spec 4.3). None of
//! these functions touch the network or the database; the only I/O a
//! caller needs to have already performed is resolving profile stack
//! frame names to ids through the [`crate::frame_dict::FrameDictionary`].

pub mod display;
pub mod otel;
pub mod percentile;
pub mod profile;
pub mod red;
pub mod sysmetrics;

use chrono::{DateTime, Timelike, Utc};

/// Floors a timestamp to the start of its minute in UTC (spec 4.3's
/// bucketing rule). Stored timestamps stay UTC; any display-time
/// conversion is a read-path concern, not this function's.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0).unwrap().with_nanosecond(0).unwrap()
}

/// Converts an agent-supplied millisecond epoch timestamp to `DateTime<Utc>`.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// Clamps a `u64` sample/record count into `i64`, logging when the value
/// didn't fit (spec 7's "Encoding clamp" error class).
pub fn clamp_u64_to_i64(value: u64) -> i64 {
    match i64::try_from(value) {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(original = value, clamped = i64::MAX, "u64 count did not fit in i64, clamping");
            i64::MAX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn floor_to_minute_drops_seconds_and_subseconds() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 37).unwrap();
        let floored = floor_to_minute(ts);
        assert_eq!(floored, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn clamp_passes_through_in_range_values() {
        assert_eq!(clamp_u64_to_i64(42), 42);
    }

    #[test]
    fn clamp_saturates_out_of_range_values() {
        assert_eq!(clamp_u64_to_i64(u64::MAX), i64::MAX);
    }
}
