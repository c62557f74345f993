//! The shared engine.
//!
//! An [`Engine`] binds one location to an ephemeris, a clock and the output
//! settings, and owns the [`DayCache`] for that location. It is meant to be
//! shared as `Arc<Engine>` between every schedule and window using the same
//! coordinates. Resolution, location of surrounding events, property lookup
//! and the derived astronomical data are all `impl Engine` blocks in their
//! own modules.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{debug, info};

use crate::astro::{MoonCalc, MoonPhaseInfo, SunCalc};
use crate::cache::DayCache;
use crate::calendar::{self, DayId};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::ephemeris::{Body, BodyPosition, Coordinates, EphemerisPort, EventSet};
use crate::error::ConfigError;
use crate::format::OutputSettings;
use crate::property::ExpressionEvaluator;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine {
    ephemeris: Arc<dyn EphemerisPort>,
    clock: Arc<dyn Clock>,
    cache: Mutex<DayCache>,
    output: OutputSettings,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    pub(crate) sun_memo: Mutex<Option<SunCalc>>,
    pub(crate) moon_memo: Mutex<Option<MoonCalc>>,
    pub(crate) phase_memo: Mutex<Option<(DayId, MoonPhaseInfo)>>,
}

impl Engine {
    /// Create an engine for `coords`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the coordinates are invalid; nothing
    /// is cached in that case.
    pub fn new(coords: Coordinates, ephemeris: Arc<dyn EphemerisPort>) -> Result<Self, ConfigError> {
        coords.validate()?;
        info!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "engine created"
        );
        Ok(Self {
            ephemeris,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(DayCache::new(coords)),
            output: OutputSettings::default(),
            evaluator: None,
            sun_memo: Mutex::new(None),
            moon_memo: Mutex::new(None),
            phase_memo: Mutex::new(None),
        })
    }

    /// Create an engine from the `[location]` and `[output]` sections.
    pub fn from_config(config: &Config, ephemeris: Arc<dyn EphemerisPort>) -> Result<Self, ConfigError> {
        let coords = config.validate()?;
        Ok(Self::new(coords, ephemeris)?.with_output(config.output.clone()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    /// Register the host evaluator used by `expression` property sources.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn coordinates(&self) -> Coordinates {
        lock(&self.cache).coordinates()
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    /// The fixed offset used for civil dates; UTC when none is configured.
    pub fn offset(&self) -> FixedOffset {
        calendar::fixed_offset(self.output.utc_offset_minutes)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        calendar::local_date(instant, self.offset())
    }

    pub fn ephemeris(&self) -> &dyn EphemerisPort {
        self.ephemeris.as_ref()
    }

    pub(crate) fn evaluator(&self) -> Option<&dyn ExpressionEvaluator> {
        self.evaluator.as_deref()
    }

    /// Identifier of the cached "today", if the cache is populated.
    pub fn cached_day(&self) -> Option<DayId> {
        lock(&self.cache).day_id()
    }

    /// Events of `body` on `date`.
    ///
    /// The cache is kept on the clock's today; today and tomorrow come from
    /// it, any other date is computed directly and not cached.
    pub fn events(&self, body: Body, date: NaiveDate) -> Result<Arc<EventSet>, ConfigError> {
        let mut cache = lock(&self.cache);
        cache.ensure_fresh(self.ephemeris.as_ref(), self.local_date(self.now()))?;
        if let Some(events) = cache.events(body, DayId::from_date(date)) {
            return Ok(events);
        }
        let coords = cache.coordinates();
        drop(cache);
        debug!(%date, ?body, "computing events outside the cached days");
        Ok(Arc::new(match body {
            Body::Sun => self.ephemeris.sun_events(date, &coords),
            Body::Moon => self.ephemeris.moon_events(date, &coords),
        }))
    }

    /// Sun position at solar noon of `date`, `None` when the sun does not
    /// culminate that day.
    pub(crate) fn solar_noon_position(
        &self,
        date: NaiveDate,
    ) -> Result<Option<BodyPosition>, ConfigError> {
        {
            let mut cache = lock(&self.cache);
            cache.ensure_fresh(self.ephemeris.as_ref(), self.local_date(self.now()))?;
            if let Some(noon) = cache.solar_noon(DayId::from_date(date)) {
                return Ok(noon);
            }
        }
        let coords = self.coordinates();
        let events = self.events(Body::Sun, date)?;
        Ok(events
            .get(crate::ephemeris::names::SOLAR_NOON)
            .filter(|e| e.valid)
            .map(|e| self.ephemeris.sun_position(e.instant, &coords)))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Refresh the day cache for the current day.
    pub fn refresh(&self) -> Result<DayId, ConfigError> {
        let today = self.local_date(self.now());
        lock(&self.cache).ensure_fresh(self.ephemeris.as_ref(), today)
    }

    /// Move to a new location. Every cached set and memo is dropped.
    pub fn relocate(&self, coords: Coordinates) -> Result<(), ConfigError> {
        lock(&self.cache).relocate(coords)?;
        *lock(&self.sun_memo) = None;
        *lock(&self.moon_memo) = None;
        *lock(&self.phase_memo) = None;
        info!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "engine relocated"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("coordinates", &self.coordinates())
            .field("clock", &self.clock)
            .field("output", &self.output)
            .field("cached_day", &self.cached_day())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::property::PropertyContext;
    use crate::resolver::TimeQuery;
    use crate::testing::SyntheticEphemeris;
    use chrono::TimeZone;

    #[test]
    fn new_rejects_unconfigured_coordinates() {
        let eph = Arc::new(SyntheticEphemeris::new());
        let err = Engine::new(
            Coordinates {
                latitude: 0.0,
                longitude: 0.0,
            },
            eph,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::CoordinatesMissing);
    }

    #[test]
    fn far_dates_are_computed_without_caching() {
        let eph = Arc::new(SyntheticEphemeris::new());
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let engine = Engine::new(Coordinates::new(48.0, 11.0).unwrap(), eph.clone())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(now)));

        let far = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        engine.events(Body::Sun, far).unwrap();
        engine.events(Body::Sun, far).unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(engine.cached_day(), Some(DayId::from_date(today)));
        let far_calls = eph
            .requested_sun_dates()
            .into_iter()
            .filter(|d| *d == far)
            .count();
        assert_eq!(far_calls, 2);
    }

    #[test]
    fn far_off_instant_leaves_cache_on_clock_day() {
        let eph = Arc::new(SyntheticEphemeris::new());
        let today = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let engine = Engine::new(Coordinates::new(48.0, 11.0).unwrap(), eph.clone())
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(today)));
        let query = TimeQuery::sun(crate::ephemeris::names::SUNSET);
        let ctx = PropertyContext::empty();

        engine.resolve(today, &query, &ctx).unwrap();
        let far = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
        let resolved = engine.resolve(far, &query, &ctx).unwrap();
        assert_eq!(resolved.instant, Utc.with_ymd_and_hms(2030, 1, 1, 18, 0, 0).unwrap());
        engine.resolve(today, &query, &ctx).unwrap();

        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(
            eph.requested_sun_dates(),
            vec![date(2024, 6, 1), date(2024, 6, 2), date(2030, 1, 1)]
        );
        assert_eq!(engine.cached_day(), Some(DayId::from_date(date(2024, 6, 1))));
    }

    #[test]
    fn local_date_uses_configured_offset() {
        let eph = Arc::new(SyntheticEphemeris::new());
        let engine = Engine::new(Coordinates::new(48.0, 11.0).unwrap(), eph)
            .unwrap()
            .with_output(OutputSettings {
                utc_offset_minutes: Some(-300),
                ..OutputSettings::default()
            });
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 2, 0, 0).unwrap();
        assert_eq!(
            engine.local_date(instant),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
        );
    }

    #[test]
    fn relocate_clears_cache() {
        let eph = Arc::new(SyntheticEphemeris::new());
        let engine = Engine::new(Coordinates::new(48.0, 11.0).unwrap(), eph).unwrap();
        engine.refresh().unwrap();
        assert!(engine.cached_day().is_some());
        engine.relocate(Coordinates::new(51.5, -0.1).unwrap()).unwrap();
        assert!(engine.cached_day().is_none());
        assert_eq!(engine.coordinates().latitude, 51.5);
    }
}
