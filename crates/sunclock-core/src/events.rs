use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::scheduler::{RearmReason, ScheduleStatus, Side};

/// Every state change of a schedule produces an event.
/// Hosts subscribe to them through the runner's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScheduleEvent {
    /// A fire timer was started.
    Armed {
        schedule: String,
        id: Uuid,
        side: Side,
        wake_at: DateTime<Utc>,
        status: ScheduleStatus,
        /// `true` when a periodic safety re-arm is pending as well.
        safety: bool,
        at: DateTime<Utc>,
    },
    /// The schedule emitted its value.
    Fired {
        schedule: String,
        id: Uuid,
        side: Side,
        instant: DateTime<Utc>,
        payload: Value,
        at: DateTime<Utc>,
    },
    /// The pending timer was discarded and the schedule is re-armed.
    Recalculated {
        schedule: String,
        id: Uuid,
        reason: RearmReason,
        at: DateTime<Utc>,
    },
    /// One or both sides could not be resolved.
    ResolutionFailed {
        schedule: String,
        id: Uuid,
        side: Option<Side>,
        error: String,
        status: ScheduleStatus,
        /// Set when nothing is armed and a retry is pending.
        retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    Closed {
        schedule: String,
        id: Uuid,
        at: DateTime<Utc>,
    },
}

impl ScheduleEvent {
    pub fn schedule(&self) -> &str {
        match self {
            ScheduleEvent::Armed { schedule, .. }
            | ScheduleEvent::Fired { schedule, .. }
            | ScheduleEvent::Recalculated { schedule, .. }
            | ScheduleEvent::ResolutionFailed { schedule, .. }
            | ScheduleEvent::Closed { schedule, .. } => schedule,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            ScheduleEvent::Armed { at, .. }
            | ScheduleEvent::Fired { at, .. }
            | ScheduleEvent::Recalculated { at, .. }
            | ScheduleEvent::ResolutionFailed { at, .. }
            | ScheduleEvent::Closed { at, .. } => *at,
        }
    }
}
