//! Timestamp value generators.

use chrono::{DateTime, Utc};
use rand::Rng;
use streamgen_core::{parse_timestamp, Value};

/// Generate the current UTC timestamp.
///
/// Not deterministic: each call reads the clock.
pub fn generate_timestamp_now() -> Value {
    Value::DateTime(Utc::now())
}

/// Generate a random timestamp in the given range (second resolution).
///
/// Bounds are RFC 3339 timestamps or `YYYY-MM-DD` dates. An unparseable
/// bound yields `Null`; configs are checked for this when loaded.
pub fn generate_timestamp_range<R: Rng + ?Sized>(rng: &mut R, start: &str, end: &str) -> Value {
    let (Some(start), Some(end)) = (parse_timestamp(start), parse_timestamp(end)) else {
        return Value::Null;
    };
    let start_ts = start.timestamp();
    let end_ts = end.timestamp();

    if start_ts >= end_ts {
        Value::DateTime(start)
    } else {
        let random_ts = rng.random_range(start_ts..=end_ts);
        Value::DateTime(DateTime::from_timestamp(random_ts, 0).unwrap_or(start))
    }
}
