// Time handling for nmon timestamp records.
//
// A timestamp record carries the local wall-clock time and date of the sample in two separate
// fields, eg `ZZZZ,T0001,00:00:05,01-JAN-2024`.  The zone is not in the file; the caller supplies
// it.

use chrono::prelude::DateTime;
use chrono::{LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

pub type Timestamp = DateTime<Utc>;

/// Combine the time (`HH:MM:SS`) and date (`DD-MON-YYYY`) fields of a timestamp record into a UTC
/// timestamp, interpreting them in `tz`.
///
/// Returns None if either field is malformed or the local time does not exist in `tz` (it falls in
/// a DST gap).  An ambiguous local time resolves to the earlier instant.

pub fn parse_nmon_time(time: &str, date: &str, tz: &Tz) -> Option<Timestamp> {
    parse_nmon_time_after(time, date, tz, None)
}

/// Like `parse_nmon_time`, but an ambiguous local time (it falls in the hour repeated when DST
/// ends) resolves to the later instant if the earlier one would come before `previous`, the time
/// of the preceding sample.  A file written across the fold thus stays in time order.

pub fn parse_nmon_time_after(
    time: &str,
    date: &str,
    tz: &Tz,
    previous: Option<Timestamp>,
) -> Option<Timestamp> {
    let local = NaiveDateTime::parse_from_str(
        &format!("{} {}", time.trim(), date.trim()),
        "%H:%M:%S %d-%b-%Y",
    )
    .ok()?;
    let t = match tz.from_local_datetime(&local) {
        LocalResult::None => return None,
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, latest) => match previous {
            Some(p) if earliest.with_timezone(&Utc) < p => latest,
            _ => earliest,
        },
    };
    Some(t.with_timezone(&Utc))
}

/// The offset of `tz` from UTC at time `at`, in hours.

pub fn gmt_offset_hours(tz: &Tz, at: Timestamp) -> f64 {
    let offset = tz.offset_from_utc_datetime(&at.naive_utc()).fix();
    offset.local_minus_utc() as f64 / 3600.0
}

#[cfg(test)]
use chrono::{Datelike, Timelike};

#[test]
fn test_parse_nmon_time() {
    let t = parse_nmon_time("00:00:05", "01-JAN-2024", &Tz::UTC).unwrap();
    assert!(t.year() == 2024 && t.month() == 1 && t.day() == 1);
    assert!(t.hour() == 0 && t.minute() == 0 && t.second() == 5);

    // Month names are case-insensitive
    assert!(parse_nmon_time("00:00:05", "01-Jan-2024", &Tz::UTC) == Some(t));

    // Oslo is UTC+1 in winter
    let oslo = parse_nmon_time("00:00:05", "01-JAN-2024", &chrono_tz::Europe::Oslo).unwrap();
    assert!(oslo.day() == 31 && oslo.hour() == 23 && oslo.second() == 5);

    assert!(parse_nmon_time("25:00:00", "01-JAN-2024", &Tz::UTC).is_none());
    assert!(parse_nmon_time("00:00:05", "01-FOO-2024", &Tz::UTC).is_none());
    assert!(parse_nmon_time("", "", &Tz::UTC).is_none());

    // 02:30 on the last Sunday of March does not exist in Oslo
    assert!(parse_nmon_time("02:30:00", "31-MAR-2024", &chrono_tz::Europe::Oslo).is_none());
}

#[test]
fn test_parse_nmon_time_after() {
    let oslo = &chrono_tz::Europe::Oslo;

    // 02:00-02:59 on the last Sunday of October comes twice in Oslo, first in CEST (UTC+2)
    let first = parse_nmon_time("02:55:00", "27-OCT-2024", oslo).unwrap();
    assert!(first.hour() == 0 && first.minute() == 55);

    // Five minutes later the clock reads 02:00 again, now in CET (UTC+1)
    let second = parse_nmon_time_after("02:00:00", "27-OCT-2024", oslo, Some(first)).unwrap();
    assert!(second.hour() == 1 && second.minute() == 0);
    assert!(second > first);

    // Before the fold, or with no earlier sample, the first occurrence is taken
    let early = parse_nmon_time("01:59:00", "27-OCT-2024", oslo).unwrap();
    assert!(parse_nmon_time_after("02:10:00", "27-OCT-2024", oslo, Some(early)).unwrap().hour() == 0);
    assert!(parse_nmon_time_after("02:10:00", "27-OCT-2024", oslo, None).unwrap().hour() == 0);

    // Unambiguous times are not affected by the earlier sample
    let later = parse_nmon_time("04:00:00", "27-OCT-2024", oslo).unwrap();
    assert!(parse_nmon_time_after("03:00:00", "27-OCT-2024", oslo, Some(later)).unwrap().hour() == 2);
    assert!(parse_nmon_time_after("02:30:00", "31-MAR-2024", oslo, Some(later)).is_none());
}

#[test]
fn test_gmt_offset_hours() {
    let t = parse_nmon_time("12:00:00", "01-JUL-2024", &Tz::UTC).unwrap();
    assert!(gmt_offset_hours(&Tz::UTC, t) == 0.0);
    assert!(gmt_offset_hours(&chrono_tz::Europe::Oslo, t) == 2.0);
    assert!(gmt_offset_hours(&chrono_tz::Asia::Kolkata, t) == 5.5);
}
