//! Previous and next sun event around an instant.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::calendar::{apply_offset, Multiplier};
use crate::engine::Engine;
use crate::ephemeris::{names, Body, EventRecord};
use crate::error::ConfigError;
use crate::format::{OutputFormat, OutputSettings};

/// Added to `now` so an event that is just firing counts as past.
pub const NOW_EPSILON_MS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurroundingEvents {
    pub previous: EventRecord,
    pub next: EventRecord,
}

impl SurroundingEvents {
    /// Apply the same offset to both events.
    pub fn shifted(mut self, value: f64, multiplier: Multiplier) -> Self {
        self.previous.instant = apply_offset(self.previous.instant, value, multiplier);
        self.next.instant = apply_offset(self.next.instant, value, multiplier);
        self
    }

    /// `{previous: {instant, name, valid}, next: {…}}` with formatted instants.
    pub fn to_payload(&self, settings: &OutputSettings, format: &OutputFormat) -> Value {
        let entry = |e: &EventRecord| {
            json!({
                "instant": settings.format(e.instant, format),
                "name": e.name,
                "valid": e.valid,
            })
        };
        json!({
            "previous": entry(&self.previous),
            "next": entry(&self.next),
        })
    }
}

impl Engine {
    /// The valid sun events enclosing `now`.
    ///
    /// Before the first event of the day `previous` is the day's nadir;
    /// after the last one `next` is the first event of the following day.
    /// `None` only when no valid event exists on either day.
    pub fn surrounding(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SurroundingEvents>, ConfigError> {
        let today = self.local_date(now);
        let events = self.events(Body::Sun, today)?;
        let sorted = events.valid_sorted();
        let Some(first) = sorted.first().copied() else {
            return Ok(None);
        };

        let cutoff = now + Duration::milliseconds(NOW_EPSILON_MS);
        if first.instant >= cutoff {
            let previous = events.get(names::NADIR).unwrap_or(first).clone();
            return Ok(Some(SurroundingEvents {
                previous,
                next: first.clone(),
            }));
        }

        let mut last = first;
        for event in sorted.iter().skip(1).copied() {
            if cutoff < event.instant {
                return Ok(Some(SurroundingEvents {
                    previous: last.clone(),
                    next: event.clone(),
                }));
            }
            last = event;
        }

        let Some(tomorrow) = today.succ_opt() else {
            return Ok(None);
        };
        let following = self.events(Body::Sun, tomorrow)?;
        Ok(following
            .valid_sorted()
            .first()
            .map(|next| SurroundingEvents {
                previous: last.clone(),
                next: (*next).clone(),
            }))
    }
}
