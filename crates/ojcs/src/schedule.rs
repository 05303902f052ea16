//! Wake-up time computation for the calendar-based tasks.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

/// Returns the duration between `now` and the next occurrence of `at`, restricted to
/// the provided weekday if any.
///
/// The next occurrence is strictly after `now`: asking at exactly 02:00 for 02:00
/// yields the following day (or week).
pub fn duration_until_next(now: NaiveDateTime, weekday: Option<Weekday>, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);

    match weekday {
        Some(target) => {
            let days_ahead = (target.num_days_from_monday() as i64
                - now.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            next += TimeDelta::days(days_ahead);
            if next <= now {
                next += TimeDelta::days(7);
            }
        }
        None => {
            if next <= now {
                next += TimeDelta::days(1);
            }
        }
    }

    (next - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // 2026-08-24 is a Monday.
    fn on(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, day).unwrap().and_time(at(h, m))
    }

    #[test]
    fn daily_before_the_wakeup_time_is_today() {
        let d = duration_until_next(on(24, 1, 0), None, at(2, 0));
        assert_eq!(d, Duration::from_secs(3600));
    }

    #[test]
    fn daily_after_the_wakeup_time_is_tomorrow() {
        let d = duration_until_next(on(24, 3, 0), None, at(2, 0));
        assert_eq!(d, Duration::from_secs(23 * 3600));
    }

    #[test]
    fn daily_at_exactly_the_wakeup_time_is_tomorrow() {
        let d = duration_until_next(on(24, 2, 0), None, at(2, 0));
        assert_eq!(d, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn weekly_targets_the_requested_weekday() {
        // Monday 04:00 → next Sunday 03:00 is in 6 days minus 1 hour.
        let d = duration_until_next(on(24, 4, 0), Some(Weekday::Sun), at(3, 0));
        assert_eq!(d, Duration::from_secs(6 * 24 * 3600 - 3600));
    }

    #[test]
    fn weekly_on_the_day_but_past_the_time_is_next_week() {
        // Sunday 2026-08-30, 04:00.
        let d = duration_until_next(on(30, 4, 0), Some(Weekday::Sun), at(3, 0));
        assert_eq!(d, Duration::from_secs(7 * 24 * 3600 - 3600));
    }
}
