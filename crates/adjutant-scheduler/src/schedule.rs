use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use adjutant_core::time::owner_offset;

use crate::types::Schedule;

/// Compute the next UTC execution time for `schedule` strictly after `from`.
///
/// Wall-clock schedules are evaluated in the owner's zone (`tz_offset_hours`)
/// and converted back to UTC.
pub fn next_run(schedule: &Schedule, from: DateTime<Utc>, tz_offset_hours: i32) -> DateTime<Utc> {
    match schedule {
        Schedule::Interval { every_secs } => from + Duration::seconds(*every_secs as i64),

        Schedule::Hourly { minute } => {
            let truncated = from
                .with_minute(*minute as u32)
                .and_then(|dt| dt.with_second(0))
                .and_then(|dt| dt.with_nanosecond(0))
                .unwrap_or(from);
            if truncated > from {
                truncated
            } else {
                truncated + Duration::hours(1)
            }
        }

        Schedule::Daily { hour, minute } => {
            let offset = owner_offset(tz_offset_hours);
            let local = from.with_timezone(&offset);
            let candidate = offset
                .with_ymd_and_hms(
                    local.year(),
                    local.month(),
                    local.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(from);
            if candidate > from {
                candidate
            } else {
                candidate + Duration::days(1)
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            let offset = owner_offset(tz_offset_hours);
            let local = from.with_timezone(&offset);
            let today_dow = local.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let days_ahead = (target_dow - today_dow).rem_euclid(7);

            let candidate_day = local + Duration::days(days_ahead);
            let candidate = offset
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(from);

            if candidate > from {
                candidate
            } else {
                candidate + Duration::days(7)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_adds_seconds() {
        let from = Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).unwrap();
        let next = next_run(&Schedule::Interval { every_secs: 60 }, from, 0);
        assert_eq!(next, from + Duration::seconds(60));
    }

    #[test]
    fn daily_respects_owner_offset() {
        // 09:00 local at UTC+7 is 02:00 UTC.
        let from = Utc.with_ymd_and_hms(2026, 2, 18, 0, 0, 0).unwrap();
        let next = next_run(&Schedule::Daily { hour: 9, minute: 0 }, from, 7);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 18, 2, 0, 0).unwrap());
    }

    #[test]
    fn daily_rolls_to_tomorrow_after_the_slot() {
        let from = Utc.with_ymd_and_hms(2026, 2, 18, 3, 0, 0).unwrap();
        let next = next_run(&Schedule::Daily { hour: 9, minute: 0 }, from, 7);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 19, 2, 0, 0).unwrap());
    }

    #[test]
    fn hourly_fires_at_the_given_minute() {
        let from = Utc.with_ymd_and_hms(2026, 2, 18, 12, 20, 0).unwrap();
        let next = next_run(&Schedule::Hourly { minute: 15 }, from, 0);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 18, 13, 15, 0).unwrap());

        let from = Utc.with_ymd_and_hms(2026, 2, 18, 12, 10, 0).unwrap();
        let next = next_run(&Schedule::Hourly { minute: 15 }, from, 0);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 18, 12, 15, 0).unwrap());
    }

    #[test]
    fn weekly_lands_on_sunday_morning() {
        // 2026-02-18 is a Wednesday; next Sunday is 2026-02-22.
        let from = Utc.with_ymd_and_hms(2026, 2, 18, 12, 0, 0).unwrap();
        let next = next_run(
            &Schedule::Weekly {
                day: 6,
                hour: 10,
                minute: 0,
            },
            from,
            0,
        );
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 0, 0).unwrap());
    }

    #[test]
    fn weekly_same_day_after_slot_pushes_a_week() {
        // Sunday 11:00, slot was 10:00 - next run is the following Sunday.
        let from = Utc.with_ymd_and_hms(2026, 2, 22, 11, 0, 0).unwrap();
        let next = next_run(
            &Schedule::Weekly {
                day: 6,
                hour: 10,
                minute: 0,
            },
            from,
            0,
        );
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());
    }
}
