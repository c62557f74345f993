//! Calendar arithmetic shared by the resolver and the window evaluator.
//!
//! All civil-date reasoning happens in one fixed UTC offset (UTC when none is
//! configured); there is no time zone database.

pub mod day_of_month;
pub mod filters;
pub mod offset;
pub mod text;

pub use day_of_month::DayOfMonthRule;
pub use filters::{DateFilters, MonthSet, Parity, WeekdaySet};
pub use offset::{apply_offset, Multiplier};
pub use text::{parse_clock_time, parse_date_time};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

/// Integer key of a calendar day.
///
/// Counted in days from 0001-01-01 of the proleptic Gregorian calendar, so
/// the day after `d` is always `d + 1`, across month and year ends alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayId(i32);

impl DayId {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.num_days_from_ce())
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for DayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a fixed offset from minutes east of UTC.
///
/// Out-of-range values fall back to UTC.
pub fn fixed_offset(minutes: Option<i32>) -> FixedOffset {
    minutes
        .and_then(|m| m.checked_mul(60))
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

/// Civil date of `instant` in `offset`.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Civil time of day of `instant` in `offset`.
pub fn local_time(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveTime {
    instant.with_timezone(&offset).time()
}

/// The instant at which the civil clock in `offset` shows `time` on `date`.
pub fn instant_at(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local = date.and_time(time);
    Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(offset.local_minus_utc()))))
}

/// Midnight of `date` in `offset`.
pub fn start_of_day(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    instant_at(date, NaiveTime::MIN, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_id_adjacent_across_year_end() {
        let eve = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let new_year = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DayId::from_date(eve).next(), DayId::from_date(new_year));
        assert!(DayId::from_date(eve) < DayId::from_date(new_year));
    }

    #[test]
    fn instant_at_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(7, 30, 0).unwrap();
        let plus_two = fixed_offset(Some(120));
        let instant = instant_at(date, time, plus_two);
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 6, 1, 5, 30, 0).unwrap());
        assert_eq!(local_date(instant, plus_two), date);
        assert_eq!(local_time(instant, plus_two), time);
    }

    #[test]
    fn local_date_crosses_midnight_with_offset() {
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap();
        assert_eq!(
            local_date(late, fixed_offset(Some(120))),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );
        assert_eq!(
            local_date(late, fixed_offset(None)),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(fixed_offset(Some(24 * 60)).local_minus_utc(), 0);
    }
}
