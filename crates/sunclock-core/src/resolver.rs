//! Time resolution.
//!
//! Turns a symbolic [`TimeQuery`] (an event name, a clock time, a date text
//! …) plus offset and date constraints into a concrete instant. Failures
//! other than a misconfigured location never escape as `Err`: they are
//! recorded on the [`ResolvedTime`] next to a best-effort instant.
//!
//! ## Steps
//!
//! 1. Locate the reference on the day of `now` (today and tomorrow come
//!    from the day cache) and apply the offset.
//! 2. With `next`, move forward one day at a time until the result lies
//!    strictly after `now`.
//! 3. Move forward to an allowed weekday and month, then to a day of the
//!    requested parity, and recompute the reference on the adjusted date.
//!
//! Every forward search is bounded by [`MAX_DAY_ADVANCE`] days.

use std::fmt;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::calendar::{
    apply_offset, instant_at, parse_clock_time, parse_date_time, start_of_day, DateFilters,
    DayOfMonthRule, Multiplier,
};
use crate::engine::Engine;
use crate::ephemeris::Body;
use crate::error::{ConfigError, PropertyError, ResolutionError};
use crate::property::{PropertyContext, PropertySource};

/// Upper bound of every day-by-day search.
pub const MAX_DAY_ADVANCE: u32 = 400;

/// What a time query refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TimeReference {
    /// A named sun event such as `sunrise` or `civilDusk`.
    SunEvent { name: String },
    /// `moonrise` or `moonset`.
    MoonEvent { name: String },
    /// A clock time on the current day, e.g. `07:30` or `7:30pm`.
    Clock { time: String },
    /// A date or date-time text.
    Date { text: String },
    /// A special day of the current month, at midnight.
    DayOfMonth { rule: DayOfMonthRule },
    Now,
    /// The next sun event after now, whichever it is.
    NextSunEvent,
    /// A date, epoch-milliseconds value or clock time read from a property.
    Property { source: PropertySource },
}

impl TimeReference {
    pub fn is_fixed(&self) -> bool {
        match self {
            TimeReference::Property { source } => source.is_fixed(),
            _ => true,
        }
    }
}

impl fmt::Display for TimeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeReference::SunEvent { name } => write!(f, "sun event '{name}'"),
            TimeReference::MoonEvent { name } => write!(f, "moon event '{name}'"),
            TimeReference::Clock { time } => write!(f, "clock time '{time}'"),
            TimeReference::Date { text } => write!(f, "date '{text}'"),
            TimeReference::DayOfMonth { rule } => write!(f, "day of month '{rule}'"),
            TimeReference::Now => f.write_str("now"),
            TimeReference::NextSunEvent => f.write_str("next sun event"),
            TimeReference::Property { source } => write!(f, "property '{}'", source.kind()),
        }
    }
}

/// Literal offset or one read from a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffsetValue {
    Number(f64),
    Property(PropertySource),
}

impl Default for OffsetValue {
    fn default() -> Self {
        OffsetValue::Number(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeQuery {
    pub reference: TimeReference,
    #[serde(default)]
    pub offset: OffsetValue,
    #[serde(default)]
    pub multiplier: Multiplier,
    /// Require an occurrence strictly after now.
    #[serde(default)]
    pub next: bool,
    #[serde(default)]
    pub filters: DateFilters,
}

impl TimeQuery {
    pub fn new(reference: TimeReference) -> Self {
        Self {
            reference,
            offset: OffsetValue::default(),
            multiplier: Multiplier::default(),
            next: false,
            filters: DateFilters::default(),
        }
    }

    pub fn sun(name: &str) -> Self {
        Self::new(TimeReference::SunEvent { name: name.into() })
    }

    pub fn moon(name: &str) -> Self {
        Self::new(TimeReference::MoonEvent { name: name.into() })
    }

    pub fn clock(time: &str) -> Self {
        Self::new(TimeReference::Clock { time: time.into() })
    }

    pub fn with_offset(mut self, value: f64, multiplier: Multiplier) -> Self {
        self.offset = OffsetValue::Number(value);
        self.multiplier = multiplier;
        self
    }

    pub fn with_filters(mut self, filters: DateFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Require an occurrence strictly after now.
    pub fn future(mut self) -> Self {
        self.next = true;
        self
    }

    /// `false` when any input can change between two resolutions.
    pub fn is_fixed(&self) -> bool {
        let offset_fixed = match &self.offset {
            OffsetValue::Number(_) => true,
            OffsetValue::Property(source) => source.is_fixed(),
        };
        self.reference.is_fixed() && offset_fixed
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTime {
    pub instant: DateTime<Utc>,
    /// `false` when the query depends on runtime-mutable input.
    pub is_fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolutionError>,
}

impl ResolvedTime {
    fn failed(instant: DateTime<Utc>, is_fixed: bool, error: ResolutionError) -> Self {
        Self {
            instant,
            is_fixed,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ── Internals ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Step {
    value: f64,
    multiplier: Multiplier,
}

impl Step {
    fn apply(self, instant: DateTime<Utc>) -> DateTime<Utc> {
        apply_offset(instant, self.value, self.multiplier)
    }
}

/// How to recompute a located instant on a later date.
#[derive(Debug, Clone)]
enum Anchor {
    /// Look the event up again on the shifted date and reapply the offset.
    Event {
        body: Body,
        name: String,
        date: NaiveDate,
    },
    /// Keep the civil time of day.
    Shift,
}

#[derive(Debug, Clone)]
struct Located {
    instant: DateTime<Utc>,
    anchor: Anchor,
}

type Lookup<T> = Result<Result<T, ResolutionError>, ConfigError>;

fn add_days(date: NaiveDate, days: u32) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
}

fn split(err: PropertyError) -> Result<ResolutionError, ConfigError> {
    match err {
        PropertyError::Config(e) => Err(e),
        other => Ok(other.into()),
    }
}

impl Engine {
    /// Resolve `query` as seen at `now`.
    ///
    /// # Errors
    /// Only a [`ConfigError`] (invalid coordinates) is returned as `Err`.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        query: &TimeQuery,
        ctx: &PropertyContext<'_>,
    ) -> Result<ResolvedTime, ConfigError> {
        self.coordinates().validate()?;
        let ctx = ctx.at(now);
        let is_fixed = query.is_fixed();

        let value = match &query.offset {
            OffsetValue::Number(v) => *v,
            OffsetValue::Property(source) => match self.fetch_number(source, &ctx) {
                Ok(v) => v,
                Err(err) => {
                    let message = split(err)?.to_string();
                    return Ok(ResolvedTime::failed(
                        now,
                        is_fixed,
                        ResolutionError::InvalidOffset { message },
                    ));
                }
            },
        };
        let step = Step {
            value,
            multiplier: query.multiplier,
        };

        let located = match self.locate(now, query, step, &ctx)? {
            Ok(located) => located,
            Err(error) => {
                debug!(reference = %query.reference, %error, "resolution failed");
                return Ok(ResolvedTime::failed(now, is_fixed, error));
            }
        };

        let (instant, error) = self.apply_filters(&located, &query.filters, step)?;
        if let Some(error) = &error {
            warn!(reference = %query.reference, %error, "date filters not satisfied");
        }
        Ok(ResolvedTime {
            instant,
            is_fixed,
            error,
        })
    }

    /// Resolve `query` at the engine clock's current instant.
    pub fn resolve_now(&self, query: &TimeQuery) -> Result<ResolvedTime, ConfigError> {
        self.resolve(self.now(), query, &PropertyContext::empty())
    }

    fn locate(
        &self,
        now: DateTime<Utc>,
        query: &TimeQuery,
        step: Step,
        ctx: &PropertyContext<'_>,
    ) -> Lookup<Located> {
        let next = query.next;
        match &query.reference {
            TimeReference::SunEvent { name } => self.locate_event(now, Body::Sun, name, step, next),
            TimeReference::MoonEvent { name } => {
                self.locate_event(now, Body::Moon, name, step, next)
            }
            TimeReference::Clock { time } => match parse_clock_time(time) {
                Some(t) => Ok(self.locate_time_of_day(now, t, step, next)),
                None => Ok(Err(ResolutionError::Unparseable { text: time.clone() })),
            },
            TimeReference::Date { text } => match parse_date_time(text, self.offset()) {
                Some(instant) => Ok(in_future(now, step.apply(instant), next)),
                None => Ok(Err(ResolutionError::Unparseable { text: text.clone() })),
            },
            TimeReference::DayOfMonth { rule } => Ok(self.locate_day_of_month(now, *rule, step, next)),
            TimeReference::Now => Ok(in_future(now, step.apply(now), next)),
            TimeReference::NextSunEvent => match self.surrounding(now)? {
                Some(around) => Ok(in_future(now, step.apply(around.next.instant), next)),
                None => Ok(Err(ResolutionError::NotEvaluable {
                    message: "no sun events around now".into(),
                })),
            },
            TimeReference::Property { source } => {
                let value = match self.fetch(source, ctx) {
                    Ok(value) => value,
                    Err(err) => return Ok(Err(split(err)?)),
                };
                Ok(self.locate_value(now, &value, step, next))
            }
        }
    }

    /// The named event on `date`, offset applied.
    fn event_on(
        &self,
        body: Body,
        name: &str,
        date: NaiveDate,
        step: Step,
    ) -> Lookup<DateTime<Utc>> {
        let events = self.events(body, date)?;
        let Some(record) = events.get(name) else {
            return Ok(Err(ResolutionError::UnknownEvent { name: name.into() }));
        };
        if !record.valid {
            return Ok(Err(ResolutionError::EventNotOccurring {
                name: name.into(),
                date,
            }));
        }
        Ok(Ok(step.apply(record.instant)))
    }

    fn locate_event(
        &self,
        now: DateTime<Utc>,
        body: Body,
        name: &str,
        step: Step,
        next: bool,
    ) -> Lookup<Located> {
        let located = |instant, date| Located {
            instant,
            anchor: Anchor::Event {
                body,
                name: name.to_string(),
                date,
            },
        };

        let today = self.local_date(now);
        match self.event_on(body, name, today, step)? {
            Ok(instant) if !next || instant > now => return Ok(Ok(located(instant, today))),
            Ok(_) => {}
            Err(err @ ResolutionError::UnknownEvent { .. }) => return Ok(Err(err)),
            // The moon skips days; the sun not rising is an answer in itself.
            Err(err) if !next && body == Body::Sun => return Ok(Err(err)),
            Err(_) => {}
        }

        for k in 1..=MAX_DAY_ADVANCE {
            let Some(date) = add_days(today, k) else { break };
            if let Ok(instant) = self.event_on(body, name, date, step)? {
                if !next || instant > now {
                    return Ok(Ok(located(instant, date)));
                }
            }
        }
        Ok(Err(ResolutionError::NoFutureOccurrence {
            reference: name.to_string(),
            after: now,
            days: MAX_DAY_ADVANCE,
        }))
    }

    fn locate_time_of_day(
        &self,
        now: DateTime<Utc>,
        time: NaiveTime,
        step: Step,
        next: bool,
    ) -> Result<Located, ResolutionError> {
        let offset = self.offset();
        let today = self.local_date(now);
        for k in 0..=MAX_DAY_ADVANCE {
            let Some(date) = add_days(today, k) else { break };
            let instant = step.apply(instant_at(date, time, offset));
            if !next || instant > now {
                return Ok(Located {
                    instant,
                    anchor: Anchor::Shift,
                });
            }
        }
        Err(ResolutionError::NoFutureOccurrence {
            reference: time.to_string(),
            after: now,
            days: MAX_DAY_ADVANCE,
        })
    }

    fn locate_day_of_month(
        &self,
        now: DateTime<Utc>,
        rule: DayOfMonthRule,
        step: Step,
        next: bool,
    ) -> Result<Located, ResolutionError> {
        let offset = self.offset();
        let today = self.local_date(now);
        let Some(mut month_start) = today.with_day(1) else {
            return Err(ResolutionError::NoDayOfMonth {
                rule: rule.to_string(),
                year: today.year(),
                month: today.month(),
            });
        };
        for _ in 0..=13 {
            match rule.date_in(month_start.year(), month_start.month()) {
                Some(date) => {
                    let instant = step.apply(start_of_day(date, offset));
                    if !next || instant > now {
                        return Ok(Located {
                            instant,
                            anchor: Anchor::Shift,
                        });
                    }
                }
                None if !next => {
                    return Err(ResolutionError::NoDayOfMonth {
                        rule: rule.to_string(),
                        year: month_start.year(),
                        month: month_start.month(),
                    })
                }
                None => {}
            }
            match month_start.checked_add_months(Months::new(1)) {
                Some(d) => month_start = d,
                None => break,
            }
        }
        Err(ResolutionError::NoFutureOccurrence {
            reference: rule.to_string(),
            after: now,
            days: MAX_DAY_ADVANCE,
        })
    }

    /// A property value: epoch milliseconds, a date text or a clock time.
    fn locate_value(
        &self,
        now: DateTime<Utc>,
        value: &Value,
        step: Step,
        next: bool,
    ) -> Result<Located, ResolutionError> {
        let unusable = || ResolutionError::NotEvaluable {
            message: format!("{value} is not a date or time"),
        };
        match value {
            Value::Number(n) => {
                let millis = n.as_f64().filter(|f| f.is_finite()).ok_or_else(unusable)?;
                let instant = DateTime::from_timestamp_millis(millis as i64).ok_or_else(unusable)?;
                in_future(now, step.apply(instant), next)
            }
            Value::String(text) => {
                if let Some(instant) = parse_date_time(text, self.offset()) {
                    in_future(now, step.apply(instant), next)
                } else if let Some(time) = parse_clock_time(text) {
                    self.locate_time_of_day(now, time, step, next)
                } else {
                    Err(unusable())
                }
            }
            _ => Err(unusable()),
        }
    }

    fn apply_filters(
        &self,
        located: &Located,
        filters: &DateFilters,
        step: Step,
    ) -> Result<(DateTime<Utc>, Option<ResolutionError>), ConfigError> {
        if filters.is_unrestricted() {
            return Ok((located.instant, None));
        }
        // An empty set can never match; report it with the instant untouched.
        if filters.weekdays.is_empty() {
            return Ok((located.instant, Some(ResolutionError::NoValidWeekday)));
        }
        if filters.months.is_empty() {
            return Ok((located.instant, Some(ResolutionError::NoValidMonth)));
        }

        let start = self.local_date(located.instant);
        let mut shift: u32 = 0;

        loop {
            let date = match add_days(start, shift) {
                Some(date) if shift <= MAX_DAY_ADVANCE => date,
                _ => {
                    let error = ResolutionError::NoFutureOccurrence {
                        reference: "date filter".into(),
                        after: located.instant,
                        days: MAX_DAY_ADVANCE,
                    };
                    return Ok((located.instant, Some(error)));
                }
            };

            match filters.weekdays.days_until_allowed(date.weekday()) {
                Some(0) | None => {}
                Some(k) => {
                    shift += k;
                    continue;
                }
            }

            match filters.months.months_until_allowed(date.month()) {
                Some(0) | None => {}
                Some(k) => {
                    let first = date
                        .with_day(1)
                        .and_then(|d| d.checked_add_months(Months::new(k)));
                    match first {
                        Some(first) => {
                            shift += (first - date).num_days() as u32;
                            continue;
                        }
                        None => {
                            return Ok((located.instant, Some(ResolutionError::NoValidMonth)))
                        }
                    }
                }
            }

            if let Some(parity) = filters.parity {
                if !parity.matches(date.day()) {
                    shift += 1;
                    continue;
                }
            }
            break;
        }

        if shift == 0 {
            return Ok((located.instant, None));
        }

        let recomputed = match &located.anchor {
            Anchor::Event { body, name, date } => match add_days(*date, shift) {
                Some(date) => self.event_on(*body, name, date, step)?,
                None => Err(ResolutionError::NoFutureOccurrence {
                    reference: name.clone(),
                    after: located.instant,
                    days: shift,
                }),
            },
            Anchor::Shift => Ok(located.instant + Duration::days(i64::from(shift))),
        };
        Ok(match recomputed {
            Ok(instant) => (instant, None),
            Err(e) => (located.instant, Some(e)),
        })
    }
}

fn in_future(
    now: DateTime<Utc>,
    instant: DateTime<Utc>,
    next: bool,
) -> Result<Located, ResolutionError> {
    if next && instant <= now {
        return Err(ResolutionError::NotInFuture { instant });
    }
    Ok(Located {
        instant,
        anchor: Anchor::Shift,
    })
}
