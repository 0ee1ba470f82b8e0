//! Local-time helpers. Persistence is UTC everywhere; these are the only
//! functions that produce the owner's wall-clock view.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// The owner's fixed offset, built from whole hours east of UTC.
///
/// Out-of-range offsets fall back to UTC rather than panicking at startup.
pub fn owner_offset(tz_offset_hours: i32) -> FixedOffset {
    FixedOffset::east_opt(tz_offset_hours * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// Now in the owner's zone.
pub fn local_now(tz_offset_hours: i32) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&owner_offset(tz_offset_hours))
}

/// Today's date in the owner's zone.
pub fn local_today(tz_offset_hours: i32) -> NaiveDate {
    local_now(tz_offset_hours).date_naive()
}

/// Render a UTC instant as "DD.MM.YYYY HH:MM" in the owner's zone.
pub fn format_local(ts: DateTime<Utc>, tz_offset_hours: i32) -> String {
    ts.with_timezone(&owner_offset(tz_offset_hours))
        .format("%d.%m.%Y %H:%M")
        .to_string()
}

/// Render a UTC instant as "DD.MM HH:MM" (short form for message lists).
pub fn format_local_short(ts: DateTime<Utc>, tz_offset_hours: i32) -> String {
    ts.with_timezone(&owner_offset(tz_offset_hours))
        .format("%d.%m %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn offset_shifts_render() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 17, 22, 0, 0).unwrap();
        // UTC+7: 22:00 UTC is 05:00 next day.
        assert_eq!(format_local(ts, 7), "18.02.2026 05:00");
        assert_eq!(format_local(ts, 0), "17.02.2026 22:00");
    }

    #[test]
    fn absurd_offset_falls_back_to_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_local(ts, 999), "01.01.2026 12:00");
    }

    #[test]
    fn short_form_drops_year() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 5, 10, 30, 0).unwrap();
        assert_eq!(format_local_short(ts, 0), "05.03 10:30");
    }
}
