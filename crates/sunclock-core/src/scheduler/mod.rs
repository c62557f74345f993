//! Dynamic scheduler.
//!
//! A [`Schedule`] is a deadline-based state machine. It does not own a
//! thread or a timer: the caller asks for [`Schedule::next_deadline`],
//! waits until then and calls [`Schedule::tick`]. [`runner`] drives one
//! schedule from a tokio task.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Armed -> (fire | recalculate) -> Armed ...
//!    \       \
//!     `-------`-> Error -> (retry) -> Armed
//! any -> Closed
//! ```
//!
//! At most one fire timer is pending. A schedule with an alternate time
//! arms on whichever side resolves earlier and re-checks its selector when
//! the timer expires.

pub mod runner;

pub use runner::{ScheduleCommand, ScheduleHandle};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compare::Selector;
use crate::engine::Engine;
use crate::events::ScheduleEvent;
use crate::format::OutputFormat;
use crate::property::PropertyContext;
use crate::resolver::{ResolvedTime, TimeQuery};

/// A wake-up closer than this is moved out by whole days.
pub const MIN_WAKE_DELAY_MS: i64 = 10;

const DAY_MS: i64 = 86_400_000;

/// Upper bound of timer expirations handled by one `tick`.
const MAX_TICK_STEPS: usize = 8;

/// The `[scheduler]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Period of the safety re-arm of non-fixed schedules; `0` disables it.
    #[serde(default = "default_recalc_interval_hours")]
    pub recalc_interval_hours: f64,
    /// Delay before a schedule in `Error` tries again.
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
}

fn default_recalc_interval_hours() -> f64 {
    2.0
}
fn default_retry_delay_minutes() -> u32 {
    6
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            recalc_interval_hours: default_recalc_interval_hours(),
            retry_delay_minutes: default_retry_delay_minutes(),
        }
    }
}

fn hours(value: f64) -> Option<Duration> {
    if value.is_finite() && value > 0.0 {
        Some(Duration::milliseconds((value * 3_600_000.0).round() as i64))
    } else {
        None
    }
}

impl SchedulerConfig {
    pub fn recalc_interval(&self) -> Option<Duration> {
        hours(self.recalc_interval_hours)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::minutes(i64::from(self.retry_delay_minutes))
    }
}

/// A second time source, used when its selector holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternate {
    pub time: TimeQuery,
    pub selector: Selector,
}

/// One `[[schedules]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub name: String,
    pub primary: TimeQuery,
    #[serde(default)]
    pub alternate: Option<Alternate>,
    /// Overrides `[scheduler] recalc_interval_hours`.
    #[serde(default)]
    pub recalc_interval_hours: Option<f64>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ScheduleSpec {
    pub fn new(name: impl Into<String>, primary: TimeQuery) -> Self {
        Self {
            name: name.into(),
            primary,
            alternate: None,
            recalc_interval_hours: None,
            format: OutputFormat::default(),
        }
    }

    pub fn with_alternate(mut self, time: TimeQuery, selector: Selector) -> Self {
        self.alternate = Some(Alternate { time, selector });
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Primary,
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleState {
    Idle,
    Armed,
    /// Nothing could be armed; a retry is pending.
    Error,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Ok,
    /// At least one side failed to resolve.
    Degraded,
    /// The location is misconfigured.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RearmReason {
    /// Periodic re-arm of a schedule with runtime-mutable input.
    Safety,
    /// The selector disagreed with the side that armed the timer.
    SelectorChanged,
    /// Retry after both sides failed.
    Retry,
    /// A new input message arrived.
    Context,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    Fire,
    Safety,
    Retry,
}

/// Outcome of the last successful arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDecision {
    pub primary: ResolvedTime,
    pub alternate: Option<ResolvedTime>,
    /// The side whose instant armed the fire timer.
    pub side: Side,
    pub wake_at: DateTime<Utc>,
}

impl ScheduleDecision {
    /// `false` when any contributing resolution depends on mutable input.
    pub fn is_fixed(&self) -> bool {
        self.primary.is_fixed && self.alternate.as_ref().map_or(true, |a| a.is_fixed)
    }
}

#[derive(Debug, Clone, Default)]
struct Timers {
    fire: Option<DateTime<Utc>>,
    safety: Option<DateTime<Utc>>,
    retry: Option<DateTime<Utc>>,
}

impl Timers {
    fn clear(&mut self) {
        *self = Timers::default();
    }

    /// The earliest pending timer; on ties fire wins over retry and safety.
    fn next(&self) -> Option<(TimerKind, DateTime<Utc>)> {
        [
            (TimerKind::Fire, self.fire),
            (TimerKind::Retry, self.retry),
            (TimerKind::Safety, self.safety),
        ]
        .into_iter()
        .filter_map(|(kind, at)| at.map(|at| (kind, at)))
        .min_by_key(|(_, at)| *at)
    }
}

/// Move `instant` out by whole days until it lies at least
/// [`MIN_WAKE_DELAY_MS`] after `now`.
pub fn wake_time(instant: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let gap = (now - instant).num_milliseconds() + MIN_WAKE_DELAY_MS;
    if gap <= 0 {
        return instant;
    }
    let days = (gap + DAY_MS - 1) / DAY_MS;
    instant + Duration::days(days)
}

/// A schedule instance.
#[derive(Debug, Clone)]
pub struct Schedule {
    id: Uuid,
    spec: ScheduleSpec,
    config: SchedulerConfig,
    state: ScheduleState,
    status: ScheduleStatus,
    decision: Option<ScheduleDecision>,
    timers: Timers,
    context: Option<Value>,
}

impl Schedule {
    pub fn new(spec: ScheduleSpec, config: SchedulerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            config,
            state: ScheduleState::Idle,
            status: ScheduleStatus::Ok,
            decision: None,
            timers: Timers::default(),
            context: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ScheduleSpec {
        &self.spec
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    pub fn status(&self) -> ScheduleStatus {
        self.status
    }

    pub fn decision(&self) -> Option<&ScheduleDecision> {
        self.decision.as_ref()
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    /// The earliest pending timer.
    pub fn pending_timer(&self) -> Option<(TimerKind, DateTime<Utc>)> {
        self.timers.next()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending_timer().map(|(_, at)| at)
    }

    fn recalc_interval(&self) -> Option<Duration> {
        match self.spec.recalc_interval_hours {
            Some(h) => hours(h),
            None => self.config.recalc_interval(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Store the message used by property sources of later resolutions.
    pub fn set_context(&mut self, message: Value) {
        self.context = Some(message);
    }

    /// Resolve both sides and start exactly one fire timer.
    ///
    /// Every pending timer is cancelled first. A closed schedule stays
    /// closed.
    pub fn arm(&mut self, engine: &Engine, now: DateTime<Utc>) -> Vec<ScheduleEvent> {
        if self.state == ScheduleState::Closed {
            return Vec::new();
        }
        self.timers.clear();

        let ctx = match &self.context {
            Some(message) => PropertyContext::with_message(message),
            None => PropertyContext::empty(),
        };
        let primary = engine.resolve(now, &self.spec.primary, &ctx);
        let alternate = self
            .spec
            .alternate
            .as_ref()
            .map(|alt| engine.resolve(now, &alt.time, &ctx))
            .transpose();

        let (primary, alternate) = match (primary, alternate) {
            (Ok(p), Ok(a)) => (p, a),
            (Err(err), _) | (_, Err(err)) => {
                error!(schedule = %self.spec.name, %err, "schedule misconfigured");
                return self.fail(now, err.to_string(), ScheduleStatus::Fatal);
            }
        };

        let mut events = Vec::new();
        let mut candidates = Vec::new();
        for (side, resolved) in [(Side::Primary, Some(&primary)), (Side::Alternate, alternate.as_ref())] {
            let Some(resolved) = resolved else { continue };
            match &resolved.error {
                None => candidates.push((side, resolved.instant)),
                Some(err) => {
                    warn!(schedule = %self.spec.name, ?side, %err, "side could not be resolved");
                    events.push(ScheduleEvent::ResolutionFailed {
                        schedule: self.spec.name.clone(),
                        id: self.id,
                        side: Some(side),
                        error: err.to_string(),
                        status: ScheduleStatus::Degraded,
                        retry_at: None,
                        at: now,
                    });
                }
            }
        }

        let Some((side, instant)) = candidates.into_iter().min_by_key(|(_, at)| *at) else {
            events.extend(self.fail(now, "no side could be resolved".into(), ScheduleStatus::Degraded));
            return events;
        };

        let wake_at = wake_time(instant, now);
        let decision = ScheduleDecision {
            primary,
            alternate,
            side,
            wake_at,
        };
        self.timers.fire = Some(wake_at);
        if !decision.is_fixed() {
            self.timers.safety = self.recalc_interval().map(|interval| now + interval);
        }
        self.status = if events.is_empty() {
            ScheduleStatus::Ok
        } else {
            ScheduleStatus::Degraded
        };
        self.state = ScheduleState::Armed;
        self.decision = Some(decision);

        info!(schedule = %self.spec.name, ?side, %wake_at, "schedule armed");
        events.push(ScheduleEvent::Armed {
            schedule: self.spec.name.clone(),
            id: self.id,
            side,
            wake_at,
            status: self.status,
            safety: self.timers.safety.is_some(),
            at: now,
        });
        events
    }

    /// Re-arm from scratch, reporting why.
    pub fn rearm(
        &mut self,
        engine: &Engine,
        now: DateTime<Utc>,
        reason: RearmReason,
    ) -> Vec<ScheduleEvent> {
        if self.state == ScheduleState::Closed {
            return Vec::new();
        }
        debug!(schedule = %self.spec.name, ?reason, "re-arming");
        let mut events = vec![ScheduleEvent::Recalculated {
            schedule: self.spec.name.clone(),
            id: self.id,
            reason,
            at: now,
        }];
        events.extend(self.arm(engine, now));
        events
    }

    /// Handle every timer due at `now`.
    pub fn tick(&mut self, engine: &Engine, now: DateTime<Utc>) -> Vec<ScheduleEvent> {
        let mut events = Vec::new();
        for _ in 0..MAX_TICK_STEPS {
            let Some((kind, deadline)) = self.timers.next() else {
                break;
            };
            if deadline > now {
                break;
            }
            match kind {
                TimerKind::Fire => {
                    self.timers.fire = None;
                    events.extend(self.expire(engine, now, deadline));
                }
                TimerKind::Retry => {
                    self.timers.retry = None;
                    events.extend(self.rearm(engine, now, RearmReason::Retry));
                }
                TimerKind::Safety => {
                    self.timers.safety = None;
                    events.extend(self.rearm(engine, now, RearmReason::Safety));
                }
            }
        }
        events
    }

    /// Cancel every timer; later calls are no-ops.
    pub fn close(&mut self, now: DateTime<Utc>) -> Vec<ScheduleEvent> {
        if self.state == ScheduleState::Closed {
            return Vec::new();
        }
        self.timers.clear();
        self.state = ScheduleState::Closed;
        info!(schedule = %self.spec.name, "schedule closed");
        vec![ScheduleEvent::Closed {
            schedule: self.spec.name.clone(),
            id: self.id,
            at: now,
        }]
    }

    // ── Internals ────────────────────────────────────────────────────

    fn fail(&mut self, now: DateTime<Utc>, error: String, status: ScheduleStatus) -> Vec<ScheduleEvent> {
        let retry_at = now + self.config.retry_delay();
        self.timers.clear();
        self.timers.retry = Some(retry_at);
        self.state = ScheduleState::Error;
        self.status = status;
        self.decision = None;
        warn!(schedule = %self.spec.name, %retry_at, "nothing armed, retry pending");
        vec![ScheduleEvent::ResolutionFailed {
            schedule: self.spec.name.clone(),
            id: self.id,
            side: None,
            error,
            status,
            retry_at: Some(retry_at),
            at: now,
        }]
    }

    /// Which side the selector picks right now. Evaluation errors count as
    /// "not alternate".
    fn selected_side(&self, engine: &Engine, now: DateTime<Utc>) -> Side {
        let Some(alternate) = &self.spec.alternate else {
            return Side::Primary;
        };
        let ctx = match &self.context {
            Some(message) => PropertyContext::with_message(message),
            None => PropertyContext::empty(),
        }
        .at(now);
        match engine.evaluate_selector(&alternate.selector, &ctx) {
            Ok(true) => Side::Alternate,
            Ok(false) => Side::Primary,
            Err(err) => {
                warn!(schedule = %self.spec.name, %err, "selector failed, using primary");
                Side::Primary
            }
        }
    }

    fn expire(
        &mut self,
        engine: &Engine,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Vec<ScheduleEvent> {
        let Some(armed) = self.decision.as_ref().map(|d| d.side) else {
            return self.rearm(engine, now, RearmReason::Manual);
        };

        let chosen = self.selected_side(engine, now);
        if chosen != armed {
            info!(schedule = %self.spec.name, ?armed, ?chosen, "selector changed, re-arming");
            return self.rearm(engine, now, RearmReason::SelectorChanged);
        }

        let payload = engine.output().format(deadline, &self.spec.format);
        info!(schedule = %self.spec.name, side = ?chosen, %deadline, "schedule fired");
        let mut events = vec![ScheduleEvent::Fired {
            schedule: self.spec.name.clone(),
            id: self.id,
            side: chosen,
            instant: deadline,
            payload,
            at: now,
        }];
        events.extend(self.arm(engine, now));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Multiplier;
    use crate::clock::ManualClock;
    use crate::compare::CompareOp;
    use crate::ephemeris::{names, Coordinates};
    use crate::format::OutputSettings;
    use crate::property::PropertySource;
    use crate::resolver::OffsetValue;
    use crate::testing::SyntheticEphemeris;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    fn engine() -> Engine {
        Engine::new(
            Coordinates::new(45.0, -122.0).unwrap(),
            Arc::new(SyntheticEphemeris::new()),
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(at(3, 0, 0))))
        .with_output(OutputSettings {
            utc_offset_minutes: Some(0),
            ..OutputSettings::default()
        })
    }

    fn selector(value: bool) -> Selector {
        Selector::new(PropertySource::Bool { value }, CompareOp::True, None)
    }

    fn schedule(spec: ScheduleSpec) -> Schedule {
        Schedule::new(spec, SchedulerConfig::default())
    }

    fn armed_at(events: &[ScheduleEvent]) -> Option<(Side, DateTime<Utc>)> {
        events.iter().rev().find_map(|e| match e {
            ScheduleEvent::Armed { side, wake_at, .. } => Some((*side, *wake_at)),
            _ => None,
        })
    }

    #[test]
    fn test_arm_single_side() {
        let e = engine();
        let mut s = schedule(ScheduleSpec::new("wake", TimeQuery::sun(names::SUNRISE)));
        let events = s.arm(&e, at(3, 5, 0));
        assert_eq!(armed_at(&events), Some((Side::Primary, at(3, 6, 0))));
        assert_eq!(s.state(), ScheduleState::Armed);
        assert_eq!(s.status(), ScheduleStatus::Ok);
        assert_eq!(s.pending_timer(), Some((TimerKind::Fire, at(3, 6, 0))));
    }

    #[test]
    fn test_fire_then_rearm_for_tomorrow() {
        let e = engine();
        let spec = ScheduleSpec::new("wake", TimeQuery::sun(names::SUNRISE))
            .with_format(OutputFormat::Pattern("%H:%M".into()));
        let mut s = schedule(spec);
        s.arm(&e, at(3, 5, 0));

        assert!(s.tick(&e, at(3, 5, 59)).is_empty());

        let events = s.tick(&e, at(3, 6, 0));
        assert!(matches!(
            &events[0],
            ScheduleEvent::Fired { side: Side::Primary, payload, .. } if payload == "06:00"
        ));
        assert_eq!(armed_at(&events), Some((Side::Primary, at(4, 6, 0))));
        assert_eq!(s.next_deadline(), Some(at(4, 6, 0)));
    }

    #[test]
    fn test_past_event_is_pushed_out_by_days() {
        let e = engine();
        let mut s = schedule(ScheduleSpec::new("wake", TimeQuery::sun(names::SUNRISE)));
        let events = s.arm(&e, at(3, 20, 0));
        assert_eq!(armed_at(&events), Some((Side::Primary, at(4, 6, 0))));

        let almost = at(3, 6, 0) - Duration::milliseconds(5);
        assert_eq!(wake_time(at(3, 6, 0), almost), at(4, 6, 0));
        assert_eq!(wake_time(at(3, 6, 0), at(3, 5, 0)), at(3, 6, 0));
        assert_eq!(wake_time(at(1, 6, 0), at(3, 7, 0)), at(4, 6, 0));
    }

    #[test]
    fn test_alternate_wins_when_earlier_and_selected() {
        let e = engine();
        let spec = ScheduleSpec::new("lights", TimeQuery::sun(names::SUNSET))
            .with_alternate(TimeQuery::clock("07:00"), selector(true));
        let mut s = schedule(spec);
        let events = s.arm(&e, at(3, 5, 0));
        assert_eq!(armed_at(&events), Some((Side::Alternate, at(3, 7, 0))));

        let events = s.tick(&e, at(3, 7, 0));
        assert!(matches!(
            events[0],
            ScheduleEvent::Fired { side: Side::Alternate, .. }
        ));
    }

    #[test]
    fn test_selector_disagreement_rearms_instead_of_firing() {
        let e = engine();
        let spec = ScheduleSpec::new("lights", TimeQuery::sun(names::SUNSET))
            .with_alternate(TimeQuery::clock("07:00"), selector(false));
        let mut s = schedule(spec.clone());
        s.arm(&e, at(3, 5, 0));
        assert_eq!(s.decision().map(|d| d.side), Some(Side::Alternate));

        let events = s.tick(&e, at(3, 7, 0));
        assert!(matches!(
            events[0],
            ScheduleEvent::Recalculated { reason: RearmReason::SelectorChanged, .. }
        ));
        assert!(!events.iter().any(|e| matches!(e, ScheduleEvent::Fired { .. })));

        // The new wake equals a fresh resolution of both sides.
        let mut fresh = schedule(spec);
        fresh.arm(&e, at(3, 7, 0));
        assert_eq!(s.next_deadline(), fresh.next_deadline());
        assert_eq!(armed_at(&events), Some((Side::Primary, at(3, 18, 0))));
    }

    #[test]
    fn test_selector_reads_context_message() {
        let e = engine();
        let sel = Selector::new(
            PropertySource::Payload,
            CompareOp::Equal,
            Some(PropertySource::String {
                value: "holiday".into(),
            }),
        );
        let spec = ScheduleSpec::new("alarm", TimeQuery::clock("06:30"))
            .with_alternate(TimeQuery::clock("09:00"), sel);
        let mut s = schedule(spec);
        s.set_context(json!({"payload": "holiday"}));
        s.arm(&e, at(3, 5, 0));
        // Primary is earlier but the selector wants the alternate.
        let events = s.tick(&e, at(3, 6, 30));
        assert_eq!(armed_at(&events), Some((Side::Alternate, at(3, 9, 0))));
        let events = s.tick(&e, at(3, 9, 0));
        assert!(matches!(
            events[0],
            ScheduleEvent::Fired { side: Side::Alternate, .. }
        ));
    }

    #[test]
    fn test_one_failing_side_degrades() {
        let e = engine();
        let spec = ScheduleSpec::new("mixed", TimeQuery::sun("bogus"))
            .with_alternate(TimeQuery::clock("07:00"), selector(true));
        let mut s = schedule(spec);
        let events = s.arm(&e, at(3, 5, 0));
        assert!(matches!(
            events[0],
            ScheduleEvent::ResolutionFailed { side: Some(Side::Primary), retry_at: None, .. }
        ));
        assert_eq!(armed_at(&events), Some((Side::Alternate, at(3, 7, 0))));
        assert_eq!(s.state(), ScheduleState::Armed);
        assert_eq!(s.status(), ScheduleStatus::Degraded);
    }

    #[test]
    fn test_both_sides_failing_enters_error_and_retries() {
        let e = engine();
        let spec = ScheduleSpec::new("broken", TimeQuery::sun("bogus"))
            .with_alternate(TimeQuery::clock("noon-ish"), selector(true));
        let mut s = schedule(spec);
        s.arm(&e, at(3, 5, 0));
        assert_eq!(s.state(), ScheduleState::Error);
        assert_eq!(s.pending_timer(), Some((TimerKind::Retry, at(3, 5, 6))));

        let events = s.tick(&e, at(3, 5, 6));
        assert!(matches!(
            events[0],
            ScheduleEvent::Recalculated { reason: RearmReason::Retry, .. }
        ));
        assert_eq!(s.next_deadline(), Some(at(3, 5, 12)));
    }

    #[test]
    fn test_safety_rearm_only_for_non_fixed() {
        let e = engine();
        let mut fixed = schedule(ScheduleSpec::new("fixed", TimeQuery::sun(names::SUNSET)));
        let events = fixed.arm(&e, at(3, 5, 0));
        assert!(matches!(events[0], ScheduleEvent::Armed { safety: false, .. }));

        let mut query = TimeQuery::sun(names::SUNSET);
        query.offset = OffsetValue::Property(PropertySource::Payload);
        query.multiplier = Multiplier::MINUTES;
        let mut dynamic = schedule(ScheduleSpec::new("dynamic", query));
        dynamic.set_context(json!({"payload": 30}));
        let events = dynamic.arm(&e, at(3, 5, 0));
        assert!(matches!(events[0], ScheduleEvent::Armed { safety: true, .. }));
        assert_eq!(dynamic.pending_timer(), Some((TimerKind::Safety, at(3, 7, 0))));

        dynamic.set_context(json!({"payload": 45}));
        let events = dynamic.tick(&e, at(3, 7, 0));
        assert!(matches!(
            events[0],
            ScheduleEvent::Recalculated { reason: RearmReason::Safety, .. }
        ));
        assert_eq!(dynamic.decision().map(|d| d.wake_at), Some(at(3, 18, 45)));
        assert_eq!(dynamic.pending_timer(), Some((TimerKind::Safety, at(3, 9, 0))));
    }

    #[test]
    fn test_close_cancels_timers() {
        let e = engine();
        let mut s = schedule(ScheduleSpec::new("wake", TimeQuery::sun(names::SUNRISE)));
        s.arm(&e, at(3, 5, 0));
        let events = s.close(at(3, 5, 30));
        assert!(matches!(events[0], ScheduleEvent::Closed { .. }));
        assert_eq!(s.next_deadline(), None);
        assert!(s.tick(&e, at(3, 6, 0)).is_empty());
        assert!(s.arm(&e, at(3, 6, 0)).is_empty());
        assert!(s.close(at(3, 6, 0)).is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(config.recalc_interval(), Some(Duration::hours(2)));
        assert_eq!(config.retry_delay(), Duration::minutes(6));

        let disabled = SchedulerConfig {
            recalc_interval_hours: 0.0,
            ..SchedulerConfig::default()
        };
        assert_eq!(disabled.recalc_interval(), None);
    }
}
