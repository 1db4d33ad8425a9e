//! Conversions between chrono instants and the numeric units used on the wire.
//!
//! Summaries report instants as floating epoch seconds and durations as
//! floating seconds. Timeline events report integer microseconds computed as
//! `round(seconds * 1_000_000)`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serializer;

#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_micros() as f64 / 1_000_000.0
}

#[allow(clippy::cast_precision_loss)]
pub fn delta_seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Trace-Viewer timestamp in integer microseconds.
#[allow(clippy::cast_possible_truncation)]
pub fn trace_micros(instant: DateTime<Utc>) -> i64 {
    (epoch_seconds(instant) * 1_000_000.0).round() as i64
}

/// Builds an instant from floating epoch seconds, keeping microsecond precision.
#[allow(clippy::cast_possible_truncation)]
pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}

pub(crate) fn serialize_instant<S: Serializer>(
    instant: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(epoch_seconds(*instant))
}

#[allow(clippy::ref_option)]
pub(crate) fn serialize_optional_instant<S: Serializer>(
    instant: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match instant {
        Some(instant) => serializer.serialize_f64(epoch_seconds(*instant)),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn serialize_delta<S: Serializer>(
    delta: &TimeDelta,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(delta_seconds(*delta))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_keeps_microseconds() {
        let instant = from_epoch_seconds(1_400_000_000.25).unwrap();
        assert_eq!(epoch_seconds(instant), 1_400_000_000.25);
    }

    #[test]
    fn trace_micros_rounds_to_integer_microseconds() {
        let instant = from_epoch_seconds(1_400_000_000.123_456).unwrap();
        assert_eq!(trace_micros(instant), 1_400_000_000_123_456);
    }

    #[test]
    fn delta_seconds_handles_fractions() {
        assert_eq!(delta_seconds(TimeDelta::milliseconds(1_500)), 1.5);
        assert_eq!(delta_seconds(TimeDelta::zero()), 0.0);
    }

    #[test]
    fn from_epoch_seconds_rejects_non_finite_values() {
        assert!(from_epoch_seconds(f64::NAN).is_none());
        assert!(from_epoch_seconds(f64::INFINITY).is_none());
    }
}
