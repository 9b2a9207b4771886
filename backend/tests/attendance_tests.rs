//! Attendance day-attribution tests
//!
//! Property-based and unit tests for the logical-date contract:
//! - events before the rollover hour belong to the previous calendar day
//! - the rollover hour itself starts the new day (strict `<`)
//! - attribution is idempotent and timezone-sensitive

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;

const KOLKATA: Tz = chrono_tz::Asia::Kolkata;

/// Reference implementation of the attribution rule
fn attribute(local: chrono::DateTime<Tz>, rollover_hour: u32) -> NaiveDate {
    let date = local.date_naive();
    if local.hour() < rollover_hour {
        date.pred_opt().unwrap()
    } else {
        date
    }
}

fn local_time_strategy() -> impl Strategy<Value = chrono::DateTime<Tz>> {
    // Any minute of 2023, expressed in the attendance timezone
    (0i64..525_600).prop_map(|minutes| {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (base + Duration::minutes(minutes)).with_timezone(&KOLKATA)
    })
}

proptest! {
    /// Attribution never moves an event more than one day back
    #[test]
    fn test_attribution_window(local in local_time_strategy(), rollover in 0u32..24) {
        let date = attribute(local, rollover);
        let calendar = local.date_naive();
        prop_assert!(date == calendar || date == calendar.pred_opt().unwrap());
    }

    /// Events at or after the rollover hour stay on the calendar day
    #[test]
    fn test_after_rollover_keeps_day(local in local_time_strategy(), rollover in 0u32..24) {
        prop_assume!(local.hour() >= rollover);
        prop_assert_eq!(attribute(local, rollover), local.date_naive());
    }

    /// Events before the rollover hour move to the previous day
    #[test]
    fn test_before_rollover_moves_back(local in local_time_strategy(), rollover in 1u32..24) {
        prop_assume!(local.hour() < rollover);
        prop_assert_eq!(
            attribute(local, rollover),
            local.date_naive().pred_opt().unwrap()
        );
    }

    /// Attribution is a pure function of the instant
    #[test]
    fn test_attribution_idempotent(local in local_time_strategy(), rollover in 0u32..24) {
        prop_assert_eq!(attribute(local, rollover), attribute(local, rollover));
    }

    /// Rollover zero disables the lookback entirely
    #[test]
    fn test_zero_rollover_is_calendar_date(local in local_time_strategy()) {
        prop_assert_eq!(attribute(local, 0), local.date_naive());
    }
}

#[cfg(test)]
mod boundary_tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> chrono::DateTime<Tz> {
        KOLKATA.with_ymd_and_hms(2023, 6, 15, h, m, s).unwrap()
    }

    #[test]
    fn test_exact_rollover_hour_is_new_day() {
        assert_eq!(
            attribute(at(4, 0, 0), 4),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_one_second_before_rollover_is_previous_day() {
        assert_eq!(
            attribute(at(3, 59, 59), 4),
            NaiveDate::from_ymd_opt(2023, 6, 14).unwrap()
        );
    }

    #[test]
    fn test_night_shift_scenario() {
        // Punch-in at 03:45 belongs to the 14th; a punch-out at 05:10 the
        // same calendar day belongs to the 15th, so closing the shift
        // depends on the one-day carry-forward window
        let punch_in_date = attribute(at(3, 45, 0), 4);
        let punch_out_date = attribute(at(5, 10, 0), 4);

        assert_eq!(punch_in_date, NaiveDate::from_ymd_opt(2023, 6, 14).unwrap());
        assert_eq!(punch_out_date, NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
        assert_eq!(punch_out_date - punch_in_date, Duration::days(1));
    }

    #[test]
    fn test_month_boundary_rolls_back_cleanly() {
        let local = KOLKATA.with_ymd_and_hms(2023, 7, 1, 2, 0, 0).unwrap();
        assert_eq!(
            attribute(local, 4),
            NaiveDate::from_ymd_opt(2023, 6, 30).unwrap()
        );
    }

    #[test]
    fn test_year_boundary_rolls_back_cleanly() {
        let local = KOLKATA.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let date = attribute(local, 4);
        assert_eq!(date.year(), 2023);
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_utc_evening_is_ist_morning() {
        // 23:30 UTC on the 14th is 05:00 IST on the 15th
        let instant = Utc.with_ymd_and_hms(2023, 6, 14, 23, 30, 0).unwrap();
        let local = instant.with_timezone(&KOLKATA);
        assert_eq!(
            attribute(local, 4),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
    }
}
