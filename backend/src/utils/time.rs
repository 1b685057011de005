use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Returns the current time in the configured timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Returns today's date in the configured timezone.
pub fn today_local(tz: &Tz) -> NaiveDate {
    now_in_timezone(tz).date_naive()
}

/// UTC instants of the local calendar day containing `now`: midnight of that
/// day and midnight of the next. The daily-dose cap counts inside
/// `[start, end)` and therefore resets at local midnight.
pub fn local_day_bounds(tz: &Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.with_timezone(tz).date_naive();
    let next = day.succ_opt().unwrap_or(day);
    (local_midnight(tz, day), local_midnight(tz, next))
}

fn local_midnight(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        // Midnight falls in a DST gap: anchor on the UTC reading instead.
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive).with_timezone(tz))
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn day_bounds_span_exactly_one_day() {
        let tz = chrono_tz::America::Bogota;
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 17, 30, 0).unwrap();
        let (start, end) = local_day_bounds(&tz, now);
        assert_eq!(end - start, Duration::days(1));
        assert!(start <= now && now < end);
    }

    #[test]
    fn bogota_midnight_is_5am_utc() {
        // America/Bogota is UTC-5 year round.
        let tz = chrono_tz::America::Bogota;
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 17, 30, 0).unwrap();
        let (start, _) = local_day_bounds(&tz, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 10, 5, 0, 0).unwrap());
    }

    #[test]
    fn instant_just_after_utc_midnight_belongs_to_previous_local_day() {
        let tz = chrono_tz::America::Bogota;
        // 01:00 UTC is 20:00 the previous day in Bogota.
        let now = Utc.with_ymd_and_hms(2025, 6, 11, 1, 0, 0).unwrap();
        let (start, end) = local_day_bounds(&tz, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 10, 5, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 11, 5, 0, 0).unwrap());
    }
}
