//! Time-window switch.
//!
//! Routes each input message to "inside" or "outside" depending on whether
//! its comparison instant falls between a start and an end time of day.
//! Either bound may switch to an alternate time while its selector holds.
//! Optionally the last message is sent again once the window boundary is
//! crossed.

pub mod runner;

pub use runner::{WindowEvent, WindowHandle};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::calendar::{local_time, parse_date_time};
use crate::engine::Engine;
use crate::error::CoreError;
use crate::property::PropertyContext;
use crate::resolver::TimeQuery;
use crate::scheduler::{wake_time, Alternate, Side, MIN_WAKE_DELAY_MS};

/// `true` when `now` lies in the window from `start` to `end`.
///
/// The window is half-open. When `start >= end` it spans midnight.
pub fn contains(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start < end {
        start <= now && now < end
    } else {
        !(end <= now && now < start)
    }
}

/// One edge of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowBound {
    pub time: TimeQuery,
    #[serde(default)]
    pub alternate: Option<Alternate>,
}

impl WindowBound {
    pub fn new(time: TimeQuery) -> Self {
        Self {
            time,
            alternate: None,
        }
    }
}

/// Which instant a message is compared with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareTime {
    #[default]
    Now,
    /// `msg.ts`
    Timestamp,
    /// `msg.lc`
    LastChange,
    /// `msg.time`
    Time,
    /// `msg.value`
    Value,
}

impl CompareTime {
    fn field(self) -> Option<&'static str> {
        match self {
            CompareTime::Now => None,
            CompareTime::Timestamp => Some("ts"),
            CompareTime::LastChange => Some("lc"),
            CompareTime::Time => Some("time"),
            CompareTime::Value => Some("value"),
        }
    }
}

/// One `[[windows]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub start: WindowBound,
    pub end: WindowBound,
    #[serde(default)]
    pub compare: CompareTime,
    /// Send the last inside message again when the window ends.
    #[serde(default)]
    pub resend_on_end: bool,
    /// Send the last outside message again when the window starts.
    #[serde(default)]
    pub resend_on_start: bool,
}

impl WindowSpec {
    pub fn new(name: impl Into<String>, start: TimeQuery, end: TimeQuery) -> Self {
        Self {
            name: name.into(),
            start: WindowBound::new(start),
            end: WindowBound::new(end),
            compare: CompareTime::Now,
            resend_on_end: false,
            resend_on_start: false,
        }
    }
}

/// The result of routing one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOutput {
    pub inside: bool,
    pub message: Value,
    /// `true` for the delayed copy sent at a boundary.
    pub resent: bool,
    pub start: DateTime<Utc>,
    pub start_side: Side,
    pub end: DateTime<Utc>,
    pub end_side: Side,
    pub compared: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingResend {
    at: DateTime<Utc>,
    message: Value,
}

/// Stateful switch: remembers at most one pending boundary resend.
#[derive(Debug, Clone)]
pub struct WindowSwitch {
    spec: WindowSpec,
    pending: Option<PendingResend>,
}

impl WindowSwitch {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            pending: None,
        }
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// When the pending resend is due.
    pub fn pending_resend(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|p| p.at)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// The message to send again, once its boundary has passed.
    pub fn take_due_resend(&mut self, now: DateTime<Utc>) -> Option<Value> {
        if self.pending.as_ref()?.at > now {
            return None;
        }
        self.pending.take().map(|p| p.message)
    }

    /// Route `message`. Any new input cancels the pending resend; a resent
    /// message never schedules another one.
    ///
    /// # Errors
    /// Fails when a bound cannot be resolved or the location is invalid.
    pub fn evaluate(
        &mut self,
        engine: &Engine,
        message: Value,
        resent: bool,
    ) -> Result<WindowOutput, CoreError> {
        self.pending = None;
        let now = engine.now();

        let (start, start_side) = self.resolve_bound(engine, now, &self.spec.start, &message)?;
        let (end, end_side) = self.resolve_bound(engine, now, &self.spec.end, &message)?;
        let compared = self.compare_instant(engine, &message, now);

        let offset = engine.offset();
        let inside = contains(
            local_time(compared, offset),
            local_time(start, offset),
            local_time(end, offset),
        );
        debug!(window = %self.spec.name, inside, %start, %end, %compared, "window evaluated");

        if !resent {
            let (enabled, boundary) = if inside {
                (self.spec.resend_on_end, end)
            } else {
                (self.spec.resend_on_start, start)
            };
            if enabled {
                let at = wake_time(boundary, now) + Duration::milliseconds(MIN_WAKE_DELAY_MS);
                debug!(window = %self.spec.name, %at, "resend scheduled");
                self.pending = Some(PendingResend {
                    at,
                    message: message.clone(),
                });
            }
        }

        Ok(WindowOutput {
            inside,
            message,
            resent,
            start,
            start_side,
            end,
            end_side,
            compared,
        })
    }

    fn resolve_bound(
        &self,
        engine: &Engine,
        now: DateTime<Utc>,
        bound: &WindowBound,
        message: &Value,
    ) -> Result<(DateTime<Utc>, Side), CoreError> {
        let ctx = PropertyContext::with_message(message).at(now);
        let (query, side) = match &bound.alternate {
            Some(alt) => match engine.evaluate_selector(&alt.selector, &ctx) {
                Ok(true) => (&alt.time, Side::Alternate),
                Ok(false) => (&bound.time, Side::Primary),
                Err(err) => {
                    error!(window = %self.spec.name, %err, "selector failed, using primary time");
                    (&bound.time, Side::Primary)
                }
            },
            None => (&bound.time, Side::Primary),
        };
        let resolved = engine.resolve(now, query, &ctx)?;
        match resolved.error {
            Some(err) => Err(err.into()),
            None => Ok((resolved.instant, side)),
        }
    }

    fn compare_instant(&self, engine: &Engine, message: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(field) = self.spec.compare.field() else {
            return now;
        };
        let parsed = match message.get(field) {
            Some(Value::Number(n)) => n
                .as_f64()
                .and_then(|ms| DateTime::from_timestamp_millis(ms as i64)),
            Some(Value::String(text)) => parse_date_time(text, engine.offset()),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            error!(
                window = %self.spec.name,
                field,
                "no valid timestamp in message, using current time"
            );
            now
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::compare::{CompareOp, Selector};
    use crate::ephemeris::{names, Coordinates};
    use crate::error::ResolutionError;
    use crate::format::OutputSettings;
    use crate::property::PropertySource;
    use crate::testing::SyntheticEphemeris;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    fn engine(clock: Arc<ManualClock>) -> Engine {
        Engine::new(
            Coordinates::new(50.0, 8.0).unwrap(),
            Arc::new(SyntheticEphemeris::new()),
        )
        .unwrap()
        .with_clock(clock)
        .with_output(OutputSettings {
            utc_offset_minutes: Some(0),
            ..OutputSettings::default()
        })
    }

    #[test]
    fn test_same_day_window() {
        assert!(contains(t(8, 0), t(8, 0), t(17, 0)));
        assert!(contains(t(12, 0), t(8, 0), t(17, 0)));
        assert!(!contains(t(17, 0), t(8, 0), t(17, 0)));
        assert!(!contains(t(7, 59), t(8, 0), t(17, 0)));
    }

    #[test]
    fn test_overnight_window() {
        assert!(contains(t(23, 30), t(22, 0), t(6, 0)));
        assert!(contains(t(22, 0), t(22, 0), t(6, 0)));
        assert!(!contains(t(12, 0), t(22, 0), t(6, 0)));
        assert!(!contains(t(6, 0), t(22, 0), t(6, 0)));
    }

    proptest! {
        #[test]
        fn overnight_window_is_complement_of_day_window(
            now in 0u32..86_400,
            a in 0u32..86_400,
            b in 0u32..86_400,
        ) {
            prop_assume!(a < b);
            let secs = |s: u32| NaiveTime::from_num_seconds_from_midnight_opt(s, 0).unwrap();
            let (now, a, b) = (secs(now), secs(a), secs(b));
            prop_assert_eq!(contains(now, b, a), !contains(now, a, b));
        }
    }

    #[test]
    fn test_sun_window_routes_messages() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let e = engine(clock.clone());
        let mut switch = WindowSwitch::new(WindowSpec::new(
            "daylight",
            TimeQuery::sun(names::SUNRISE),
            TimeQuery::sun(names::SUNSET),
        ));
        let out = switch.evaluate(&e, json!({"payload": 1}), false).unwrap();
        assert!(out.inside);
        assert_eq!(out.message["payload"], 1);

        clock.set(at(19, 0));
        let out = switch.evaluate(&e, json!({"payload": 2}), false).unwrap();
        assert!(!out.inside);
    }

    #[test]
    fn test_compare_time_from_message_field() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let e = engine(clock);
        let mut spec = WindowSpec::new(
            "night",
            TimeQuery::clock("22:00"),
            TimeQuery::clock("06:00"),
        );
        spec.compare = CompareTime::Timestamp;
        let mut switch = WindowSwitch::new(spec);

        let ts = at(23, 30).timestamp_millis();
        assert!(switch.evaluate(&e, json!({"ts": ts}), false).unwrap().inside);

        let out = switch
            .evaluate(&e, json!({"ts": "2024-06-03 05:59"}), false)
            .unwrap();
        assert!(out.inside);

        // Unparseable field falls back to now (noon).
        let out = switch.evaluate(&e, json!({"ts": "later"}), false).unwrap();
        assert!(!out.inside);
        assert_eq!(out.compared, at(12, 0));
    }

    #[test]
    fn test_alternate_bound_via_selector() {
        let clock = Arc::new(ManualClock::new(at(7, 0)));
        let e = engine(clock);
        let mut spec = WindowSpec::new("work", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
        spec.start.alternate = Some(Alternate {
            time: TimeQuery::clock("06:30"),
            selector: Selector::new(
                PropertySource::Message {
                    path: "early".into(),
                },
                CompareOp::True,
                None,
            ),
        });
        let mut switch = WindowSwitch::new(spec);

        let out = switch.evaluate(&e, json!({"early": false}), false).unwrap();
        assert!(!out.inside);
        assert_eq!(out.start_side, Side::Primary);

        let out = switch.evaluate(&e, json!({"early": true}), false).unwrap();
        assert!(out.inside);
        assert_eq!(out.start_side, Side::Alternate);
        assert_eq!(out.start, at(6, 30));
    }

    #[test]
    fn test_resend_at_window_end() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let e = engine(clock.clone());
        let mut spec = WindowSpec::new("work", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
        spec.resend_on_end = true;
        let mut switch = WindowSwitch::new(spec);

        switch.evaluate(&e, json!({"payload": "on"}), false).unwrap();
        let due = at(17, 0) + Duration::milliseconds(MIN_WAKE_DELAY_MS);
        assert_eq!(switch.pending_resend(), Some(due));
        assert_eq!(switch.take_due_resend(at(16, 59)), None);

        let message = switch.take_due_resend(due).unwrap();
        clock.set(due);
        let out = switch.evaluate(&e, message, true).unwrap();
        assert!(!out.inside);
        assert!(out.resent);
        assert_eq!(out.message["payload"], "on");
        // A resent message does not schedule another resend.
        assert_eq!(switch.pending_resend(), None);
    }

    #[test]
    fn test_new_input_cancels_pending_resend() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let e = engine(clock);
        let mut spec = WindowSpec::new("work", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
        spec.resend_on_end = true;
        let mut switch = WindowSwitch::new(spec);

        switch.evaluate(&e, json!({"payload": 1}), false).unwrap();
        assert!(switch.pending_resend().is_some());
        switch.cancel();
        assert!(switch.pending_resend().is_none());

        // Outside with only resend_on_end set schedules nothing.
        let mut spec = WindowSpec::new("late", TimeQuery::clock("20:00"), TimeQuery::clock("21:00"));
        spec.resend_on_end = true;
        let mut switch = WindowSwitch::new(spec);
        switch.evaluate(&e, json!({}), false).unwrap();
        assert!(switch.pending_resend().is_none());
    }

    #[test]
    fn test_resend_boundary_in_past_moves_to_next_day() {
        let clock = Arc::new(ManualClock::new(at(20, 0)));
        let e = engine(clock);
        let mut spec = WindowSpec::new("work", TimeQuery::clock("08:00"), TimeQuery::clock("17:00"));
        spec.resend_on_start = true;
        let mut switch = WindowSwitch::new(spec);
        let out = switch.evaluate(&e, json!({}), false).unwrap();
        assert!(!out.inside);
        let tomorrow = Utc.with_ymd_and_hms(2024, 6, 4, 8, 0, 0).unwrap();
        assert_eq!(
            switch.pending_resend(),
            Some(tomorrow + Duration::milliseconds(MIN_WAKE_DELAY_MS))
        );
    }

    #[test]
    fn test_unresolvable_bound_is_an_error() {
        let clock = Arc::new(ManualClock::new(at(12, 0)));
        let e = engine(clock);
        let mut switch = WindowSwitch::new(WindowSpec::new(
            "broken",
            TimeQuery::sun("noSuchEvent"),
            TimeQuery::clock("17:00"),
        ));
        let err = switch.evaluate(&e, json!({}), false).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Resolution(ResolutionError::UnknownEvent { .. })
        ));
    }
}
