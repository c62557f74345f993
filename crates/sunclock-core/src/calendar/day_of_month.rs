//! Special days of a month: `first`, `last`, `second-tuesday`,
//! `last-friday` and so on.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const ORDINALS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DayOfMonthRule {
    First,
    Last,
    /// The n-th (1-based) given weekday of the month.
    Nth { n: u8, weekday: Weekday },
    LastWeekday(Weekday),
}

impl DayOfMonthRule {
    /// The matching date in `year`/`month`, if the month has one.
    pub fn date_in(self, year: i32, month: u32) -> Option<NaiveDate> {
        match self {
            DayOfMonthRule::First => NaiveDate::from_ymd_opt(year, month, 1),
            DayOfMonthRule::Last => last_day_of_month(year, month),
            DayOfMonthRule::Nth { n, weekday } => {
                NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
            }
            DayOfMonthRule::LastWeekday(weekday) => {
                let last = last_day_of_month(year, month)?;
                let back = (7 + last.weekday().num_days_from_monday()
                    - weekday.num_days_from_monday())
                    % 7;
                last.checked_sub_days(chrono::Days::new(u64::from(back)))
            }
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

impl FromStr for DayOfMonthRule {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let lower = text.trim().to_ascii_lowercase();
        let invalid = || ConfigError::InvalidValue {
            key: "day_of_month".into(),
            message: format!("unrecognised rule '{text}'"),
        };
        match lower.as_str() {
            "first" => return Ok(DayOfMonthRule::First),
            "last" => return Ok(DayOfMonthRule::Last),
            _ => {}
        }
        let (ordinal, day) = lower.split_once(['-', ' ']).ok_or_else(invalid)?;
        let weekday: Weekday = day.trim().parse().map_err(|_| invalid())?;
        if ordinal == "last" {
            return Ok(DayOfMonthRule::LastWeekday(weekday));
        }
        let n = ORDINALS
            .iter()
            .position(|o| *o == ordinal)
            .ok_or_else(invalid)?;
        Ok(DayOfMonthRule::Nth {
            n: n as u8 + 1,
            weekday,
        })
    }
}

impl TryFrom<String> for DayOfMonthRule {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for DayOfMonthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayOfMonthRule::First => f.write_str("first"),
            DayOfMonthRule::Last => f.write_str("last"),
            DayOfMonthRule::Nth { n, weekday } => {
                let ordinal = ORDINALS.get(usize::from(*n).saturating_sub(1)).unwrap_or(&"first");
                write!(f, "{ordinal}-{}", weekday.to_string().to_lowercase())
            }
            DayOfMonthRule::LastWeekday(weekday) => {
                write!(f, "last-{}", weekday.to_string().to_lowercase())
            }
        }
    }
}

impl From<DayOfMonthRule> for String {
    fn from(rule: DayOfMonthRule) -> Self {
        rule.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_and_last() {
        assert_eq!(DayOfMonthRule::First.date_in(2024, 2), Some(date(2024, 2, 1)));
        assert_eq!(DayOfMonthRule::Last.date_in(2024, 2), Some(date(2024, 2, 29)));
        assert_eq!(DayOfMonthRule::Last.date_in(2023, 12), Some(date(2023, 12, 31)));
    }

    #[test]
    fn nth_and_last_weekday() {
        // June 2024 starts on a Saturday.
        let second_tuesday: DayOfMonthRule = "second-tuesday".parse().unwrap();
        assert_eq!(second_tuesday.date_in(2024, 6), Some(date(2024, 6, 11)));

        let last_friday: DayOfMonthRule = "last-fri".parse().unwrap();
        assert_eq!(last_friday.date_in(2024, 6), Some(date(2024, 6, 28)));

        let last_sunday: DayOfMonthRule = "last sunday".parse().unwrap();
        assert_eq!(last_sunday.date_in(2024, 6), Some(date(2024, 6, 30)));
    }

    #[test]
    fn missing_fifth_weekday_is_none() {
        let fifth_monday: DayOfMonthRule = "fifth-monday".parse().unwrap();
        assert_eq!(fifth_monday.date_in(2024, 2), None);
        assert_eq!(fifth_monday.date_in(2024, 4), Some(date(2024, 4, 29)));
    }

    #[test]
    fn rule_round_trips_through_text() {
        let rule: DayOfMonthRule = "third-wed".parse().unwrap();
        assert_eq!(rule.to_string(), "third-wed");
        assert!("sixth-monday".parse::<DayOfMonthRule>().is_err());
        assert!("middle".parse::<DayOfMonthRule>().is_err());
    }
}
