//! Deterministic ephemeris for tests and offline runs.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};

use crate::ephemeris::{
    names, BodyPosition, Coordinates, EphemerisPort, EventRecord, EventSet, MoonIllumination,
    MoonPosition,
};

/// Sun event schedule of every synthetic day, in UTC.
pub const SUN_SCHEDULE: &[(&str, u32, u32)] = &[
    (names::NADIR, 0, 30),
    (names::ASTRONOMICAL_DAWN, 4, 0),
    (names::NAUTICAL_DAWN, 4, 40),
    (names::CIVIL_DAWN, 5, 20),
    (names::SUNRISE, 6, 0),
    (names::SUNRISE_END, 6, 5),
    (names::GOLDEN_HOUR_END, 6, 40),
    (names::SOLAR_NOON, 12, 30),
    (names::GOLDEN_HOUR_START, 17, 20),
    (names::SUNSET_START, 17, 55),
    (names::SUNSET, 18, 0),
    (names::CIVIL_DUSK, 18, 40),
    (names::NAUTICAL_DUSK, 19, 20),
    (names::ASTRONOMICAL_DUSK, 20, 0),
];

const SYNODIC_MONTH_DAYS: f64 = 29.530588;

/// Every day has the same sun schedule; the moon rises 50 minutes later
/// each day and fails to rise on one day out of 29.
#[derive(Debug, Default)]
pub struct SyntheticEphemeris {
    polar: bool,
    sun_dates: Mutex<Vec<NaiveDate>>,
    sun_positions: AtomicUsize,
}

impl SyntheticEphemeris {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only nadir and solar noon occur; twilight, sunrise and sunset never do.
    pub fn polar() -> Self {
        Self {
            polar: true,
            ..Self::default()
        }
    }

    pub fn requested_sun_dates(&self) -> Vec<NaiveDate> {
        self.sun_dates.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn sun_position_calls(&self) -> usize {
        self.sun_positions.load(Ordering::SeqCst)
    }

    pub fn moonrise_missing(date: NaiveDate) -> bool {
        date.num_days_from_ce() % 29 == 7
    }

    pub fn moonrise(date: NaiveDate) -> DateTime<Utc> {
        let minutes = (i64::from(date.num_days_from_ce()) * 50).rem_euclid(1440);
        midnight(date) + Duration::minutes(minutes)
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn hours_of_day(at: DateTime<Utc>) -> f64 {
    f64::from(at.num_seconds_from_midnight()) / 3600.0
}

impl EphemerisPort for SyntheticEphemeris {
    fn sun_position(&self, at: DateTime<Utc>, _coords: &Coordinates) -> BodyPosition {
        self.sun_positions.fetch_add(1, Ordering::SeqCst);
        let angle = 2.0 * PI * (hours_of_day(at) - 12.5) / 24.0;
        BodyPosition {
            azimuth: angle,
            elevation: 45f64.to_radians() * angle.cos(),
        }
    }

    fn moon_position(&self, at: DateTime<Utc>, _coords: &Coordinates) -> MoonPosition {
        let angle = 2.0 * PI * hours_of_day(at) / 24.0;
        MoonPosition {
            azimuth: angle,
            elevation: 30f64.to_radians() * angle.sin(),
            distance: 384_400.0,
            parallactic_angle: 0.0,
        }
    }

    fn sun_events(&self, date: NaiveDate, coords: &Coordinates) -> EventSet {
        if let Ok(mut dates) = self.sun_dates.lock() {
            dates.push(date);
        }
        SUN_SCHEDULE
            .iter()
            .map(|(name, h, m)| {
                let instant = midnight(date)
                    + Duration::hours(i64::from(*h))
                    + Duration::minutes(i64::from(*m));
                let occurs =
                    !self.polar || *name == names::NADIR || *name == names::SOLAR_NOON;
                let mut record = if occurs {
                    EventRecord::new(*name, instant)
                } else {
                    EventRecord::invalid(*name, instant)
                };
                let position = self.sun_position(instant, coords);
                record.elevation = position.elevation;
                record.azimuth = position.azimuth;
                record
            })
            .collect()
    }

    fn moon_events(&self, date: NaiveDate, _coords: &Coordinates) -> EventSet {
        let rise = Self::moonrise(date);
        let set = if rise.hour() < 12 {
            rise + Duration::hours(12)
        } else {
            rise - Duration::hours(12)
        };
        let rise_record = if Self::moonrise_missing(date) {
            EventRecord::invalid(names::MOONRISE, rise)
        } else {
            EventRecord::new(names::MOONRISE, rise)
        };
        [rise_record, EventRecord::new(names::MOONSET, set)]
            .into_iter()
            .collect()
    }

    fn moon_illumination(&self, at: DateTime<Utc>) -> MoonIllumination {
        let days = (at.timestamp() as f64 - 947_182_440.0) / 86_400.0;
        let phase = (days / SYNODIC_MONTH_DAYS).rem_euclid(1.0);
        MoonIllumination {
            fraction: (1.0 - (2.0 * PI * phase).cos()) / 2.0,
            phase,
            angle: 0.0,
        }
    }
}
