//! Port to the astronomical algorithm.
//!
//! The spherical-astronomy math lives outside this crate. The engine only
//! needs named event instants per calendar day, body positions at an
//! instant, and the moon's illumination; any implementation of
//! [`EphemerisPort`] can supply those.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Well-known event names.
pub mod names {
    pub const NADIR: &str = "nadir";
    pub const ASTRONOMICAL_DAWN: &str = "astronomicalDawn";
    pub const NAUTICAL_DAWN: &str = "nauticalDawn";
    pub const CIVIL_DAWN: &str = "civilDawn";
    pub const SUNRISE: &str = "sunrise";
    pub const SUNRISE_END: &str = "sunriseEnd";
    pub const GOLDEN_HOUR_END: &str = "goldenHourEnd";
    pub const SOLAR_NOON: &str = "solarNoon";
    pub const GOLDEN_HOUR_START: &str = "goldenHourStart";
    pub const SUNSET_START: &str = "sunsetStart";
    pub const SUNSET: &str = "sunset";
    pub const CIVIL_DUSK: &str = "civilDusk";
    pub const NAUTICAL_DUSK: &str = "nauticalDusk";
    pub const ASTRONOMICAL_DUSK: &str = "astronomicalDusk";

    pub const MOONRISE: &str = "moonrise";
    pub const MOONSET: &str = "moonset";
}

/// Observer location.
///
/// Latitude and longitude are in degrees. `(0, 0)` is treated as "never
/// configured" and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build validated coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ConfigError> {
        let coords = Self {
            latitude,
            longitude,
        };
        coords.validate()?;
        Ok(coords)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.latitude.is_nan() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ConfigError::InvalidLatitude(self.latitude));
        }
        if self.longitude.is_nan() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ConfigError::InvalidLongitude(self.longitude));
        }
        if self.latitude == 0.0 && self.longitude == 0.0 {
            return Err(ConfigError::CoordinatesMissing);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Body {
    Sun,
    Moon,
}

/// Horizontal position of a body, angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPosition {
    pub azimuth: f64,
    pub elevation: f64,
}

/// Moon position, angles in radians, distance in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoonPosition {
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
    pub parallactic_angle: f64,
}

/// Moon illumination at an instant.
///
/// `phase` is the position in the synodic cycle (0 = new, 0.5 = full),
/// `fraction` the illuminated share of the disc and `angle` the midpoint
/// angle of the bright limb in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoonIllumination {
    pub fraction: f64,
    pub phase: f64,
    pub angle: f64,
}

/// One named event on one day.
///
/// `valid == false` means the event does not happen that day (polar day or
/// night, a moon that never rises); `instant` is then meaningless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub instant: DateTime<Utc>,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub azimuth: f64,
    pub valid: bool,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            instant,
            elevation: 0.0,
            azimuth: 0.0,
            valid: true,
        }
    }

    pub fn invalid(name: impl Into<String>, instant: DateTime<Utc>) -> Self {
        Self {
            valid: false,
            ..Self::new(name, instant)
        }
    }
}

/// All events of one body on one day, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventSet {
    events: BTreeMap<String, EventRecord>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: EventRecord) {
        self.events.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&EventRecord> {
        self.events.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Valid events in ascending instant order.
    pub fn valid_sorted(&self) -> Vec<&EventRecord> {
        let mut valid: Vec<&EventRecord> = self.events.values().filter(|e| e.valid).collect();
        valid.sort_by_key(|e| e.instant);
        valid
    }
}

impl FromIterator<EventRecord> for EventSet {
    fn from_iter<I: IntoIterator<Item = EventRecord>>(iter: I) -> Self {
        let mut set = EventSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

/// The external astronomical algorithm.
///
/// Implementations must be pure functions of their arguments: the day cache
/// relies on repeated calls for the same date returning the same set.
pub trait EphemerisPort: Send + Sync {
    fn sun_position(&self, at: DateTime<Utc>, coords: &Coordinates) -> BodyPosition;

    fn moon_position(&self, at: DateTime<Utc>, coords: &Coordinates) -> MoonPosition;

    /// Sun events of the given calendar day.
    fn sun_events(&self, date: NaiveDate, coords: &Coordinates) -> EventSet;

    /// Moon events of the given calendar day.
    fn moon_events(&self, date: NaiveDate, coords: &Coordinates) -> EventSet;

    fn moon_illumination(&self, at: DateTime<Utc>) -> MoonIllumination;
}
