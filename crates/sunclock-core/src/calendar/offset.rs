//! Offset multipliers.
//!
//! Plain durations scale linearly. Month and year offsets change calendar
//! fields instead, clamping to the last day of a shorter month.

use std::fmt;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Unit of an offset value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MultiplierRepr", into = "MultiplierRepr")]
pub enum Multiplier {
    /// Milliseconds per unit.
    Factor(f64),
    Months,
    Years,
}

impl Multiplier {
    pub const MILLISECONDS: Multiplier = Multiplier::Factor(1.0);
    pub const SECONDS: Multiplier = Multiplier::Factor(1_000.0);
    pub const MINUTES: Multiplier = Multiplier::Factor(60_000.0);
    pub const HOURS: Multiplier = Multiplier::Factor(3_600_000.0);
    pub const DAYS: Multiplier = Multiplier::Factor(86_400_000.0);
    pub const WEEKS: Multiplier = Multiplier::Factor(604_800_000.0);

    fn from_name(name: &str) -> Option<Self> {
        let unit = match name.trim().to_ascii_lowercase().as_str() {
            "ms" | "millis" | "milliseconds" => Self::MILLISECONDS,
            "s" | "sec" | "seconds" => Self::SECONDS,
            "m" | "min" | "minutes" => Self::MINUTES,
            "h" | "hours" => Self::HOURS,
            "d" | "days" => Self::DAYS,
            "w" | "weeks" => Self::WEEKS,
            "months" => Self::Months,
            "years" => Self::Years,
            _ => return None,
        };
        Some(unit)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::MINUTES
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Multiplier::Factor(ms) => write!(f, "{ms}ms"),
            Multiplier::Months => f.write_str("months"),
            Multiplier::Years => f.write_str("years"),
        }
    }
}

/// Config representation: a millisecond factor or a unit name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum MultiplierRepr {
    Factor(f64),
    Name(String),
}

impl TryFrom<MultiplierRepr> for Multiplier {
    type Error = ConfigError;

    fn try_from(repr: MultiplierRepr) -> Result<Self, Self::Error> {
        match repr {
            MultiplierRepr::Factor(f) if f.is_finite() => Ok(Multiplier::Factor(f)),
            MultiplierRepr::Factor(f) => Err(ConfigError::InvalidValue {
                key: "multiplier".into(),
                message: format!("{f} is not a finite factor"),
            }),
            MultiplierRepr::Name(name) => {
                Multiplier::from_name(&name).ok_or_else(|| ConfigError::InvalidValue {
                    key: "multiplier".into(),
                    message: format!("unknown unit '{name}'"),
                })
            }
        }
    }
}

impl From<Multiplier> for MultiplierRepr {
    fn from(m: Multiplier) -> Self {
        match m {
            Multiplier::Factor(f) => MultiplierRepr::Factor(f),
            Multiplier::Months => MultiplierRepr::Name("months".into()),
            Multiplier::Years => MultiplierRepr::Name("years".into()),
        }
    }
}

/// Shift `instant` by `value` units of `multiplier`.
///
/// Month and year offsets use the integer part of `value`.
pub fn apply_offset(instant: DateTime<Utc>, value: f64, multiplier: Multiplier) -> DateTime<Utc> {
    if value == 0.0 || !value.is_finite() {
        return instant;
    }
    match multiplier {
        Multiplier::Factor(ms) => {
            let delta = (value * ms).round();
            instant
                .checked_add_signed(Duration::milliseconds(delta as i64))
                .unwrap_or(instant)
        }
        Multiplier::Months => add_months(instant, value.trunc() as i64),
        Multiplier::Years => add_months(instant, (value.trunc() as i64).saturating_mul(12)),
    }
}

fn add_months(instant: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    let Ok(count) = u32::try_from(months.unsigned_abs()) else {
        return instant;
    };
    let shifted = if months >= 0 {
        instant.checked_add_months(Months::new(count))
    } else {
        instant.checked_sub_months(Months::new(count))
    };
    shifted.unwrap_or(instant)
}
