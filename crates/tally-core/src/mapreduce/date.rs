use time::{
    Date, OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem,
    format_description::well_known::Rfc3339, macros::format_description,
};

const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const DATE_TIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
);

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse an ISO-8601 date or date-time into a UTC instant.
///
/// Offsets are honored; date-times without one are taken as UTC and bare
/// dates as UTC midnight.
#[must_use]
pub fn parse_iso8601(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();

    if let Ok(at) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(at);
    }
    if let Ok(at) = PrimitiveDateTime::parse(text, DATE_TIME_FORMAT) {
        return Some(at.assume_utc());
    }

    Date::parse(text, DATE_FORMAT)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Whole days since 1970-01-01 UTC, truncated toward zero.
#[must_use]
pub const fn days_since_epoch(at: OffsetDateTime) -> i64 {
    at.unix_timestamp() / SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(text: &str) -> Option<i64> {
        parse_iso8601(text).map(days_since_epoch)
    }

    #[test]
    fn plain_dates_count_whole_days() {
        assert_eq!(days("1970-01-01"), Some(0));
        assert_eq!(days("1970-01-02"), Some(1));
        assert_eq!(days("2024-03-01"), Some(19_783));
    }

    #[test]
    fn date_times_truncate_toward_zero() {
        assert_eq!(days("1970-01-01T23:59:59Z"), Some(0));
        assert_eq!(days("1969-12-31T12:00:00Z"), Some(0));
        assert_eq!(days("1969-12-30T00:00:00Z"), Some(-2));
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        assert_eq!(days("1970-01-02T01:00:00+02:00"), Some(0));
        assert_eq!(days("1970-01-01T23:30:00-01:00"), Some(1));
    }

    #[test]
    fn missing_offset_is_taken_as_utc() {
        assert_eq!(days("1970-01-03T10:15:00"), Some(2));
        assert_eq!(days("1970-01-03T10:15:00.250"), Some(2));
    }

    #[test]
    fn compiled_formats_keep_the_full_instant() {
        let at = parse_iso8601("2024-03-01T06:30:15.5").expect("date-time");
        assert_eq!(at.unix_timestamp(), 1_709_274_615);
        assert_eq!(at.millisecond(), 500);

        let midnight = parse_iso8601(" 2024-03-01 ").expect("date");
        assert_eq!(midnight.unix_timestamp(), 1_709_251_200);
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(days("yesterday"), None);
        assert_eq!(days("2024-13-01"), None);
        assert_eq!(days(""), None);
    }
}
