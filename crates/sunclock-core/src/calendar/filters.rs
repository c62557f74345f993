//! Day-of-week, month and day-parity constraints.
//!
//! Sets are parsed from short text lists such as `"mon,wed,fri"` or
//! `"1;2;12"`. An empty text or `*` allows everything; `none` allows
//! nothing, which the resolver reports as an error instead of looping.

use std::fmt;
use std::str::FromStr;

use chrono::{Month, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const SEPARATORS: &[char] = &[',', ';', '|', ' '];

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(SEPARATORS).map(str::trim).filter(|t| !t.is_empty())
}

fn invalid(key: &str, token: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("unrecognised entry '{token}'"),
    }
}

// ── Weekdays ─────────────────────────────────────────────────────────

/// Allowed days of the week. Bit 0 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b111_1111);
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    pub fn from_days(days: &[Weekday]) -> Self {
        Self(
            days.iter()
                .fold(0, |bits, d| bits | 1 << d.num_days_from_sunday()),
        )
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_sunday()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    /// Days to move forward from `from` to reach an allowed weekday.
    ///
    /// `Some(0)` when `from` is allowed, `None` when nothing is.
    pub fn days_until_allowed(self, from: Weekday) -> Option<u32> {
        let start = from.num_days_from_sunday();
        (0..7).find(|k| self.0 & (1 << ((start + k) % 7)) != 0)
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for WeekdaySet {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::ALL);
        }
        if text.eq_ignore_ascii_case("none") {
            return Ok(Self::EMPTY);
        }
        let mut bits = 0u8;
        for token in tokens(text) {
            let index = match token.parse::<u32>() {
                Ok(n) if n < 7 => n,
                Ok(_) => return Err(invalid("weekdays", token)),
                Err(_) => token
                    .parse::<Weekday>()
                    .map_err(|_| invalid("weekdays", token))?
                    .num_days_from_sunday(),
            };
            bits |= 1 << index;
        }
        Ok(Self(bits))
    }
}

impl TryFrom<String> for WeekdaySet {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("*");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        let days: Vec<String> = (0..7u8)
            .filter(|i| self.0 & (1 << i) != 0)
            .filter_map(|i| Weekday::try_from((i + 6) % 7).ok())
            .map(|d| d.to_string().to_lowercase())
            .collect();
        f.write_str(&days.join(","))
    }
}

impl From<WeekdaySet> for String {
    fn from(set: WeekdaySet) -> Self {
        set.to_string()
    }
}

// ── Months ───────────────────────────────────────────────────────────

/// Allowed months. Bit 0 is January.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthSet(u16);

impl MonthSet {
    pub const ALL: MonthSet = MonthSet(0x0fff);
    pub const EMPTY: MonthSet = MonthSet(0);

    /// Build from month numbers (1 = January). Out-of-range numbers are ignored.
    pub fn from_numbers(months: &[u32]) -> Self {
        Self(
            months
                .iter()
                .filter(|m| (1..=12).contains(*m))
                .fold(0, |bits, m| bits | 1 << (m - 1)),
        )
    }

    pub fn contains(self, month: u32) -> bool {
        (1..=12).contains(&month) && self.0 & (1 << (month - 1)) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    /// Months to move forward from `from` (1-based) to reach an allowed month.
    pub fn months_until_allowed(self, from: u32) -> Option<u32> {
        let start = from.saturating_sub(1) % 12;
        (0..12).find(|k| self.0 & (1 << ((start + k) % 12)) != 0)
    }
}

impl Default for MonthSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromStr for MonthSet {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::ALL);
        }
        if text.eq_ignore_ascii_case("none") {
            return Ok(Self::EMPTY);
        }
        let mut bits = 0u16;
        for token in tokens(text) {
            let number = match token.parse::<u32>() {
                Ok(n) if (1..=12).contains(&n) => n,
                Ok(_) => return Err(invalid("months", token)),
                Err(_) => token
                    .parse::<Month>()
                    .map_err(|_| invalid("months", token))?
                    .number_from_month(),
            };
            bits |= 1 << (number - 1);
        }
        Ok(Self(bits))
    }
}

impl TryFrom<String> for MonthSet {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MonthSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("*");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        let months: Vec<String> = (1..=12u32)
            .filter(|m| self.contains(*m))
            .map(|m| m.to_string())
            .collect();
        f.write_str(&months.join(","))
    }
}

impl From<MonthSet> for String {
    fn from(set: MonthSet) -> Self {
        set.to_string()
    }
}

// ── Parity ───────────────────────────────────────────────────────────

/// Day-of-month parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    pub fn matches(self, day_of_month: u32) -> bool {
        match self {
            Parity::Odd => day_of_month % 2 == 1,
            Parity::Even => day_of_month % 2 == 0,
        }
    }
}

/// All date constraints of a time query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFilters {
    #[serde(default)]
    pub weekdays: WeekdaySet,
    #[serde(default)]
    pub months: MonthSet,
    #[serde(default)]
    pub parity: Option<Parity>,
}

impl DateFilters {
    pub fn is_unrestricted(&self) -> bool {
        self.weekdays.is_all() && self.months.is_all() && self.parity.is_none()
    }
}
