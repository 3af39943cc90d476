//! Timestamp helpers.
//!
//! In memory the service keeps `chrono::DateTime<Utc>`; storage keeps plain
//! integer epoch milliseconds. These helpers convert between the two.

use chrono::{DateTime, TimeZone, Utc};

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// `DateTime<Utc>` → epoch milliseconds, for the write path.
pub fn datetime_to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Epoch milliseconds → `DateTime<Utc>`, for the read path.
///
/// Out-of-range values (beyond roughly ±262,000 years) clamp to the Unix
/// epoch rather than failing the row.
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        _ => DateTime::<Utc>::UNIX_EPOCH,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn datetime_roundtrips_through_millis() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 45).unwrap();
        let ms = datetime_to_ms(ts);
        assert_eq!(ms, 1_704_112_245_000);
        assert_eq!(ms_to_datetime(ms), ts);
    }

    #[test]
    fn sub_second_precision_survives() {
        let ms = 1_704_112_245_123i64;
        assert_eq!(datetime_to_ms(ms_to_datetime(ms)), ms);
    }

    #[test]
    fn negative_millis_map_before_epoch() {
        let dt = ms_to_datetime(-86_400_000);
        assert_eq!(dt, Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap());
    }
}
