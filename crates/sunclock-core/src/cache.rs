//! Two-day rolling cache of event sets.
//!
//! Holds today's and tomorrow's sun and moon events for one location. When
//! the day rolls over by exactly one, tomorrow's sets are promoted and only
//! the new tomorrow is computed.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar::DayId;
use crate::ephemeris::{names, Body, BodyPosition, Coordinates, EphemerisPort, EventSet};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
struct DaySlot {
    sun: Arc<EventSet>,
    moon: Arc<EventSet>,
    /// Sun position at solar noon, when solar noon occurs.
    noon: Option<BodyPosition>,
}

impl DaySlot {
    fn compute(ephemeris: &dyn EphemerisPort, date: NaiveDate, coords: &Coordinates) -> Self {
        let sun = ephemeris.sun_events(date, coords);
        let noon = sun
            .get(names::SOLAR_NOON)
            .filter(|e| e.valid)
            .map(|e| ephemeris.sun_position(e.instant, coords));
        Self {
            sun: Arc::new(sun),
            moon: Arc::new(ephemeris.moon_events(date, coords)),
            noon,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DayCache {
    coords: Coordinates,
    day_id: Option<DayId>,
    today: DaySlot,
    tomorrow: DaySlot,
}

impl DayCache {
    /// An empty cache. Nothing is computed until [`DayCache::ensure_fresh`].
    pub fn new(coords: Coordinates) -> Self {
        Self {
            coords,
            day_id: None,
            today: DaySlot::default(),
            tomorrow: DaySlot::default(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn coordinates(&self) -> Coordinates {
        self.coords
    }

    /// Identifier of the cached "today", if populated.
    pub fn day_id(&self) -> Option<DayId> {
        self.day_id
    }

    /// Cached events of `body` for `day`, when `day` is today or tomorrow.
    pub fn events(&self, body: Body, day: DayId) -> Option<Arc<EventSet>> {
        let slot = self.slot(day)?;
        Some(match body {
            Body::Sun => Arc::clone(&slot.sun),
            Body::Moon => Arc::clone(&slot.moon),
        })
    }

    /// Cached sun position at solar noon for `day`.
    ///
    /// Outer `None` when `day` is not cached, inner `None` when the sun
    /// does not culminate that day.
    pub fn solar_noon(&self, day: DayId) -> Option<Option<BodyPosition>> {
        self.slot(day).map(|slot| slot.noon)
    }

    fn slot(&self, day: DayId) -> Option<&DaySlot> {
        let today = self.day_id?;
        if day == today {
            Some(&self.today)
        } else if day == today.next() {
            Some(&self.tomorrow)
        } else {
            None
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Make sure the cache holds `today` and the day after.
    ///
    /// Validates the coordinates first; on failure nothing is touched.
    pub fn ensure_fresh(
        &mut self,
        ephemeris: &dyn EphemerisPort,
        today: NaiveDate,
    ) -> Result<DayId, ConfigError> {
        self.coords.validate()?;

        let id = DayId::from_date(today);
        if self.day_id == Some(id) {
            return Ok(id);
        }

        let promote = self.day_id.is_some_and(|stored| stored.next() == id);
        let tomorrow_date = today.succ_opt().unwrap_or(today);

        let new_today = if promote {
            self.tomorrow.clone()
        } else {
            DaySlot::compute(ephemeris, today, &self.coords)
        };
        let new_tomorrow = DaySlot::compute(ephemeris, tomorrow_date, &self.coords);

        self.today = new_today;
        self.tomorrow = new_tomorrow;
        self.day_id = Some(id);
        debug!(day_id = %id, promoted = promote, "day cache refreshed");
        Ok(id)
    }

    /// Move to a new location and drop every cached set.
    ///
    /// Invalid coordinates are rejected and the cache is left as it was.
    pub fn relocate(&mut self, coords: Coordinates) -> Result<(), ConfigError> {
        coords.validate()?;
        self.coords = coords;
        self.day_id = None;
        self.today = DaySlot::default();
        self.tomorrow = DaySlot::default();
        debug!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "day cache invalidated by relocation"
        );
        Ok(())
    }
}
