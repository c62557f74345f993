//! Derived astronomical data: sun and moon positions in the configured
//! angle unit, sky height percent and the moon phase table.
//!
//! Sun and moon calculations requested within 3 seconds of the previous one
//! return the previous result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::DayId;
use crate::engine::{lock, Engine};
use crate::ephemeris::{Body, EventSet, MoonIllumination};
use crate::error::ConfigError;

/// Window in which a previous calculation is reused.
pub const CALC_REUSE_MS: i64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Deg,
    Rad,
}

impl AngleUnit {
    /// Express an angle given in radians in this unit.
    pub fn from_radians(self, radians: f64) -> f64 {
        match self {
            AngleUnit::Deg => radians.to_degrees(),
            AngleUnit::Rad => radians,
        }
    }
}

/// Sun position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunCalc {
    pub ts: i64,
    pub last_update: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub angle_type: AngleUnit,
    pub azimuth: f64,
    pub altitude: f64,
    pub azimuth_degrees: f64,
    pub altitude_degrees: f64,
    pub azimuth_radians: f64,
    pub altitude_radians: f64,
    /// Altitude relative to the day's solar-noon altitude, 0 to 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<EventSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IlluminationCalc {
    pub angle: f64,
    pub fraction: f64,
    pub phase: f64,
    pub zenith_angle: f64,
}

/// Moon position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonCalc {
    pub ts: i64,
    pub last_update: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub angle_type: AngleUnit,
    pub azimuth: f64,
    pub altitude: f64,
    pub azimuth_degrees: f64,
    pub altitude_degrees: f64,
    pub azimuth_radians: f64,
    pub altitude_radians: f64,
    pub distance: f64,
    pub parallactic_angle: f64,
    pub illumination: IlluminationCalc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<EventSet>,
}

// ── Moon phases ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoonPhase {
    NewMoon,
    WaxingCrescentMoon,
    FirstQuarterMoon,
    WaxingGibbousMoon,
    FullMoon,
    WaningGibbousMoon,
    LastQuarterMoon,
    WaningCrescentMoon,
}

impl MoonPhase {
    pub const ALL: [MoonPhase; 8] = [
        MoonPhase::NewMoon,
        MoonPhase::WaxingCrescentMoon,
        MoonPhase::FirstQuarterMoon,
        MoonPhase::WaxingGibbousMoon,
        MoonPhase::FullMoon,
        MoonPhase::WaningGibbousMoon,
        MoonPhase::LastQuarterMoon,
        MoonPhase::WaningCrescentMoon,
    ];

    /// Classify a position in the synodic cycle (0 = new, 0.5 = full).
    pub fn from_cycle(phase: f64) -> Self {
        if phase < 0.01 {
            MoonPhase::NewMoon
        } else if phase < 0.25 {
            MoonPhase::WaxingCrescentMoon
        } else if phase < 0.26 {
            MoonPhase::FirstQuarterMoon
        } else if phase < 0.50 {
            MoonPhase::WaxingGibbousMoon
        } else if phase < 0.51 {
            MoonPhase::FullMoon
        } else if phase <= 0.75 {
            MoonPhase::WaningGibbousMoon
        } else if phase < 0.76 {
            MoonPhase::LastQuarterMoon
        } else {
            MoonPhase::WaningCrescentMoon
        }
    }

    pub fn pos(self) -> u8 {
        self as u8
    }

    pub fn id(self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "newMoon",
            MoonPhase::WaxingCrescentMoon => "waxingCrescentMoon",
            MoonPhase::FirstQuarterMoon => "firstQuarterMoon",
            MoonPhase::WaxingGibbousMoon => "waxingGibbousMoon",
            MoonPhase::FullMoon => "fullMoon",
            MoonPhase::WaningGibbousMoon => "waningGibbousMoon",
            MoonPhase::LastQuarterMoon => "lastQuarterMoon",
            MoonPhase::WaningCrescentMoon => "waningCrescentMoon",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "New Moon",
            MoonPhase::WaxingCrescentMoon => "Waxing Crescent",
            MoonPhase::FirstQuarterMoon => "First Quarter",
            MoonPhase::WaxingGibbousMoon => "Waxing Gibbous",
            MoonPhase::FullMoon => "Full Moon",
            MoonPhase::WaningGibbousMoon => "Waning Gibbous",
            MoonPhase::LastQuarterMoon => "Last Quarter",
            MoonPhase::WaningCrescentMoon => "Waning Crescent",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MoonPhase::NewMoon => "🌚",
            MoonPhase::WaxingCrescentMoon => "🌒",
            MoonPhase::FirstQuarterMoon => "🌓",
            MoonPhase::WaxingGibbousMoon => "🌔",
            MoonPhase::FullMoon => "🌝",
            MoonPhase::WaningGibbousMoon => "🌖",
            MoonPhase::LastQuarterMoon => "🌗",
            MoonPhase::WaningCrescentMoon => "🌘",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            MoonPhase::NewMoon => ":new_moon_with_face:",
            MoonPhase::WaxingCrescentMoon => ":waxing_crescent_moon:",
            MoonPhase::FirstQuarterMoon => ":first_quarter_moon:",
            MoonPhase::WaxingGibbousMoon => ":waxing_gibbous_moon:",
            MoonPhase::FullMoon => ":full_moon_with_face:",
            MoonPhase::WaningGibbousMoon => ":waning_gibbous_moon:",
            MoonPhase::LastQuarterMoon => ":last_quarter_moon:",
            MoonPhase::WaningCrescentMoon => ":waning_crescent_moon:",
        }
    }

    /// Relative duration: the four principal phases are instants, the four
    /// intermediate ones span the rest of the cycle.
    pub fn weight(self) -> f64 {
        if self.pos() % 2 == 0 {
            1.0
        } else {
            6.3825
        }
    }

    /// Match a phase by id (`fullMoon`) or display name (`Full Moon`).
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.id().eq_ignore_ascii_case(label) || p.name().eq_ignore_ascii_case(label))
    }
}

/// A phase record as emitted to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonPhaseInfo {
    pub pos: u8,
    pub id: String,
    pub emoji: String,
    pub code: String,
    pub name: String,
    pub weight: f64,
    /// Position in the synodic cycle.
    pub value: f64,
    /// Cycle position as an angle in the configured unit.
    pub angle: f64,
}

impl MoonPhaseInfo {
    pub fn new(cycle: f64, unit: AngleUnit) -> Self {
        let phase = MoonPhase::from_cycle(cycle);
        Self {
            pos: phase.pos(),
            id: phase.id().to_string(),
            emoji: phase.emoji().to_string(),
            code: phase.code().to_string(),
            name: phase.name().to_string(),
            weight: phase.weight(),
            value: cycle,
            angle: unit.from_radians((cycle * 360.0).to_radians()),
        }
    }

    pub fn phase(&self) -> MoonPhase {
        MoonPhase::from_cycle(self.value)
    }
}

fn altitude_percent(altitude_deg: f64, noon_altitude_deg: f64) -> f64 {
    if altitude_deg <= 0.0 || noon_altitude_deg <= 0.0 {
        0.0
    } else {
        (altitude_deg / noon_altitude_deg * 100.0).min(100.0)
    }
}

fn reusable(previous_ts: i64, at: DateTime<Utc>) -> bool {
    (at.timestamp_millis() - previous_ts).abs() < CALC_REUSE_MS
}

impl Engine {
    /// Sun position at `at`, optionally with the day's events and the sky
    /// height percent.
    pub fn sun_calc(&self, at: DateTime<Utc>, with_times: bool) -> Result<SunCalc, ConfigError> {
        if let Some(previous) = lock(&self.sun_memo).as_ref() {
            if reusable(previous.ts, at) && (previous.times.is_some() || !with_times) {
                debug!("sun calculation reused");
                return Ok(previous.clone());
            }
        }

        let coords = self.coordinates();
        let unit = self.output().angle_unit;
        let position = self.ephemeris().sun_position(at, &coords);
        let mut result = SunCalc {
            ts: at.timestamp_millis(),
            last_update: at,
            latitude: coords.latitude,
            longitude: coords.longitude,
            angle_type: unit,
            azimuth: unit.from_radians(position.azimuth),
            altitude: unit.from_radians(position.elevation),
            azimuth_degrees: position.azimuth.to_degrees(),
            altitude_degrees: position.elevation.to_degrees(),
            azimuth_radians: position.azimuth,
            altitude_radians: position.elevation,
            altitude_percent: None,
            times: None,
        };

        if with_times {
            let date = self.local_date(at);
            let times = self.events(Body::Sun, date)?;
            result.altitude_percent = self
                .solar_noon_position(date)?
                .map(|noon| altitude_percent(result.altitude_degrees, noon.elevation.to_degrees()));
            result.times = Some(times.as_ref().clone());
        }

        *lock(&self.sun_memo) = Some(result.clone());
        Ok(result)
    }

    /// Sun altitude as a share of the day's solar-noon altitude.
    ///
    /// `None` when the sun does not culminate on that day.
    pub fn sky_height_percent(&self, at: DateTime<Utc>) -> Result<Option<f64>, ConfigError> {
        Ok(self.sun_calc(at, true)?.altitude_percent)
    }

    pub fn moon_illumination(&self, at: DateTime<Utc>) -> (MoonIllumination, MoonPhaseInfo) {
        let illumination = self.ephemeris().moon_illumination(at);
        let phase = MoonPhaseInfo::new(illumination.phase, self.output().angle_unit);
        (illumination, phase)
    }

    /// Moon position and illumination at `at`, optionally with today's
    /// moon events.
    pub fn moon_calc(&self, at: DateTime<Utc>, with_times: bool) -> Result<MoonCalc, ConfigError> {
        if let Some(previous) = lock(&self.moon_memo).as_ref() {
            if reusable(previous.ts, at) && (previous.times.is_some() || !with_times) {
                debug!("moon calculation reused");
                return Ok(previous.clone());
            }
        }

        let coords = self.coordinates();
        let unit = self.output().angle_unit;
        let position = self.ephemeris().moon_position(at, &coords);
        let (illumination, _) = self.moon_illumination(at);
        let mut result = MoonCalc {
            ts: at.timestamp_millis(),
            last_update: at,
            latitude: coords.latitude,
            longitude: coords.longitude,
            angle_type: unit,
            azimuth: unit.from_radians(position.azimuth),
            altitude: unit.from_radians(position.elevation),
            azimuth_degrees: position.azimuth.to_degrees(),
            altitude_degrees: position.elevation.to_degrees(),
            azimuth_radians: position.azimuth,
            altitude_radians: position.elevation,
            distance: position.distance,
            parallactic_angle: unit.from_radians(position.parallactic_angle),
            illumination: IlluminationCalc {
                angle: unit.from_radians(illumination.angle),
                fraction: illumination.fraction,
                phase: illumination.phase,
                zenith_angle: unit.from_radians(illumination.angle - position.parallactic_angle),
            },
            times: None,
        };

        if with_times {
            let times = self.events(Body::Moon, self.local_date(at))?;
            result.times = Some(times.as_ref().clone());
        }

        *lock(&self.moon_memo) = Some(result.clone());
        Ok(result)
    }

    /// Moon phase at `at`. The phase of the current day is computed once
    /// per day and then reused.
    pub fn moon_phase(&self, at: DateTime<Utc>) -> MoonPhaseInfo {
        let now = self.now();
        let today = DayId::from_date(self.local_date(now));
        if DayId::from_date(self.local_date(at)) != today {
            return self.moon_illumination(at).1;
        }

        let mut memo = lock(&self.phase_memo);
        match memo.as_ref() {
            Some((day, info)) if *day == today => info.clone(),
            _ => {
                let info = self.moon_illumination(at).1;
                *memo = Some((today, info.clone()));
                info
            }
        }
    }
}
