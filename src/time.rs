//! Calendar and timestamp helpers built on [`hifitime`].
//!
//! Profiles are stamped with UTC [`Epoch`]s rounded to the second. Days are addressed by a
//! [`CalendarDate`], which is also the key of the daily outcome maps and the date embedded in
//! daily result file names.
use std::fmt;
use std::str::FromStr;

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::overlap_errors::OverlapError;

/// A Gregorian UTC calendar day, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CalendarDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 0,
    }
}

impl CalendarDate {
    /// Build a validated calendar date.
    pub fn new(year: i32, month: u8, day: u8) -> Result<Self, OverlapError> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(OverlapError::InvalidDate(format!(
                "{year:04}-{month:02}-{day:02}"
            )));
        }
        Ok(CalendarDate { year, month, day })
    }

    /// UTC calendar day containing `epoch`.
    pub fn of_epoch(epoch: Epoch) -> Self {
        let (year, month, day, _, _, _, _) = epoch.to_gregorian_utc();
        CalendarDate { year, month, day }
    }

    /// Epoch of 00:00:00 UTC on this day.
    pub fn midnight(&self) -> Epoch {
        Epoch::from_gregorian_utc_at_midnight(self.year, self.month, self.day)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl From<CalendarDate> for String {
    fn from(date: CalendarDate) -> Self {
        date.to_string()
    }
}

impl TryFrom<String> for CalendarDate {
    type Error = OverlapError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for CalendarDate {
    type Err = OverlapError;

    /// Accepts `YYYY-MM-DD`, `YYYY/MM/DD` and `YYYYMMDD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || OverlapError::InvalidDate(s.to_string());
        let s = s.trim();

        let parts: Vec<&str> = if s.contains('-') {
            s.split('-').collect()
        } else if s.contains('/') {
            s.split('/').collect()
        } else if s.len() == 8 && s.is_ascii() {
            vec![&s[0..4], &s[4..6], &s[6..8]]
        } else {
            return Err(invalid());
        };
        if parts.len() != 3 {
            return Err(invalid());
        }

        let year = i32::from_str(parts[0]).map_err(|_| invalid())?;
        let month = u8::from_str(parts[1]).map_err(|_| invalid())?;
        let day = u8::from_str(parts[2]).map_err(|_| invalid())?;
        CalendarDate::new(year, month, day)
    }
}

/// Build an epoch from unix seconds, rounded to the nearest whole second.
pub fn epoch_from_unix_rounded(unix_seconds: f64) -> Epoch {
    Epoch::from_unix_seconds(unix_seconds.round())
}

/// Unix seconds of an epoch.
pub fn unix_seconds(epoch: Epoch) -> f64 {
    epoch.to_unix_seconds()
}

/// Format an epoch as `YYYY-MM-DDTHH:MM:SS` (UTC, whole seconds).
pub fn format_iso(epoch: Epoch) -> String {
    let (y, mo, d, h, mi, s, _) = epoch.to_gregorian_utc();
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}")
}

/// Parse a timestamp written by [`format_iso`]; a trailing `Z` is accepted.
pub fn parse_iso(s: &str) -> Result<Epoch, OverlapError> {
    let invalid = || OverlapError::InvalidDate(s.to_string());
    let trimmed = s.trim().trim_end_matches('Z');
    let (date, clock) = trimmed.split_once('T').ok_or_else(invalid)?;
    let date = CalendarDate::from_str(date)?;

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() != 3 {
        return Err(invalid());
    }
    let hour = u8::from_str(fields[0]).map_err(|_| invalid())?;
    let minute = u8::from_str(fields[1]).map_err(|_| invalid())?;
    let second = u8::from_str(fields[2]).map_err(|_| invalid())?;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(invalid());
    }

    Ok(Epoch::from_gregorian_utc(
        date.year, date.month, date.day, hour, minute, second, 0,
    ))
}

#[cfg(test)]
mod time_test {
    use super::*;

    #[test]
    fn test_calendar_date_parsing() {
        let expected = CalendarDate::new(2023, 2, 14).unwrap();
        assert_eq!(CalendarDate::from_str("2023-02-14").unwrap(), expected);
        assert_eq!(CalendarDate::from_str("2023/02/14").unwrap(), expected);
        assert_eq!(CalendarDate::from_str("20230214").unwrap(), expected);
        assert_eq!(expected.to_string(), "2023-02-14");

        assert!(CalendarDate::from_str("2023-02-30").is_err());
        assert!(CalendarDate::from_str("2023-13-01").is_err());
        assert!(CalendarDate::from_str("yesterday").is_err());
        assert!(CalendarDate::from_str("2024-02-29").is_ok());
    }

    #[test]
    fn test_iso_round_trip() {
        let epoch = epoch_from_unix_rounded(1_676_332_800.4 + 3_723.0);
        assert_eq!(format_iso(epoch), "2023-02-14T01:02:03");
        assert_eq!(
            unix_seconds(parse_iso("2023-02-14T01:02:03").unwrap()),
            unix_seconds(epoch)
        );
        assert_eq!(
            unix_seconds(parse_iso("2023-02-14T01:02:03Z").unwrap()),
            unix_seconds(epoch)
        );
        assert_eq!(unix_seconds(epoch), 1_676_336_523.0);
    }

    #[test]
    fn test_day_of_epoch() {
        let date = CalendarDate::new(2023, 2, 14).unwrap();
        let noon = date.midnight() + hifitime::Unit::Hour * 12;
        assert_eq!(CalendarDate::of_epoch(noon), date);
        assert_eq!(unix_seconds(date.midnight()), 1_676_332_800.0);
    }
}
