//! Typed property lookup.
//!
//! A [`PropertySource`] names where a value comes from: a literal, a field
//! of the message being processed, a random number, a derived astronomical
//! quantity, or an expression handed to the host. Selectors and property
//! offsets are built on top of it.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::astro::{AngleUnit, MoonPhase};
use crate::calendar::{parse_clock_time, parse_date_time, instant_at};
use crate::engine::Engine;
use crate::error::PropertyError;

/// Where a property value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PropertySource {
    None,
    Number {
        value: f64,
    },
    String {
        value: String,
    },
    Bool {
        value: bool,
    },
    /// Current instant in epoch milliseconds.
    Now,
    Payload,
    /// Dot path into the message, e.g. `data.level`.
    Message {
        path: String,
    },
    /// `ts` of the message.
    Timestamp,
    /// `lc` (last change) of the message.
    LastChange,
    /// `value` of the message.
    Value,
    /// `limit >= 0` gives an integer in `[0, limit]`, `limit < 0` a float in
    /// `[0, |limit|)`.
    Random {
        #[serde(default = "default_random_limit")]
        limit: f64,
    },
    /// The payload, when the message topic contains `topic`.
    TopicPayload {
        topic: String,
    },
    SunData,
    SunPercent,
    SunAzimuth {
        #[serde(default)]
        unit: Option<AngleUnit>,
    },
    SunElevation {
        #[serde(default)]
        unit: Option<AngleUnit>,
    },
    MoonData,
    MoonPhase,
    /// Whether the current moon phase is `phase` (id or name).
    MoonPhaseIs {
        phase: String,
    },
    /// A date text parsed to epoch milliseconds.
    ParsedDate {
        text: String,
    },
    Expression {
        #[serde(default = "default_language")]
        language: String,
        expression: String,
    },
}

fn default_random_limit() -> f64 {
    60.0
}
fn default_language() -> String {
    "jsonata".into()
}

impl PropertySource {
    /// Whether the value can change between two evaluations.
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            PropertySource::None
                | PropertySource::Number { .. }
                | PropertySource::String { .. }
                | PropertySource::Bool { .. }
                | PropertySource::ParsedDate { .. }
        )
    }

    /// Sources whose value is itself the boolean outcome of a selector.
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            PropertySource::Expression { .. } | PropertySource::MoonPhaseIs { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PropertySource::None => "none",
            PropertySource::Number { .. } => "number",
            PropertySource::String { .. } => "string",
            PropertySource::Bool { .. } => "bool",
            PropertySource::Now => "now",
            PropertySource::Payload => "payload",
            PropertySource::Message { .. } => "message",
            PropertySource::Timestamp => "timestamp",
            PropertySource::LastChange => "last-change",
            PropertySource::Value => "value",
            PropertySource::Random { .. } => "random",
            PropertySource::TopicPayload { .. } => "topic-payload",
            PropertySource::SunData => "sun-data",
            PropertySource::SunPercent => "sun-percent",
            PropertySource::SunAzimuth { .. } => "sun-azimuth",
            PropertySource::SunElevation { .. } => "sun-elevation",
            PropertySource::MoonData => "moon-data",
            PropertySource::MoonPhase => "moon-phase",
            PropertySource::MoonPhaseIs { .. } => "moon-phase-is",
            PropertySource::ParsedDate { .. } => "parsed-date",
            PropertySource::Expression { .. } => "expression",
        }
    }
}

/// Host hook for `expression` sources.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        language: &str,
        expression: &str,
        message: Option<&Value>,
    ) -> Result<Value, String>;
}

/// Input available to a lookup: the message being processed and the
/// instant the lookup is made for.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyContext<'a> {
    message: Option<&'a Value>,
    at: Option<DateTime<Utc>>,
}

impl<'a> PropertyContext<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_message(message: &'a Value) -> Self {
        Self {
            message: Some(message),
            at: None,
        }
    }

    /// Pin the instant used by time-dependent sources.
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn message(&self) -> Option<&'a Value> {
        self.message
    }

    /// Field at a dot-separated path of the message.
    pub fn field(&self, path: &str) -> Option<&'a Value> {
        if path.is_empty() {
            return None;
        }
        let mut current = self.message?;
        for part in path.split('.') {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    pub(crate) fn instant(&self, engine: &Engine) -> DateTime<Utc> {
        self.at.unwrap_or_else(|| engine.now())
    }

    /// Instant for sun and moon sources: the message `ts` when it holds
    /// epoch milliseconds or a parseable date, otherwise [`Self::instant`].
    pub(crate) fn message_instant(&self, engine: &Engine) -> DateTime<Utc> {
        let stamped = match self.field("ts") {
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|ms| ms.is_finite())
                .and_then(|ms| DateTime::from_timestamp_millis(ms as i64)),
            Some(Value::String(text)) => parse_date_time(text, engine.offset()),
            _ => None,
        };
        stamped.unwrap_or_else(|| self.instant(engine))
    }
}

fn field_or_null(ctx: &PropertyContext<'_>, path: &str) -> Value {
    ctx.field(path).cloned().unwrap_or_else(|| {
        debug!(path, "message field missing");
        Value::Null
    })
}

fn not_evaluable(source: &PropertySource) -> PropertyError {
    PropertyError::NotEvaluable {
        kind: source.kind().to_string(),
    }
}

impl Engine {
    /// Fetch the value of `source`.
    ///
    /// Missing message fields yield `null`; they are a valid input to the
    /// `null` and `empty` comparisons.
    pub fn fetch(
        &self,
        source: &PropertySource,
        ctx: &PropertyContext<'_>,
    ) -> Result<Value, PropertyError> {
        let value = match source {
            PropertySource::None => Value::Null,
            PropertySource::Number { value } => Value::from(*value),
            PropertySource::String { value } => Value::String(value.clone()),
            PropertySource::Bool { value } => Value::Bool(*value),
            PropertySource::Now => Value::from(ctx.instant(self).timestamp_millis()),
            PropertySource::Payload => field_or_null(ctx, "payload"),
            PropertySource::Message { path } => field_or_null(ctx, path),
            PropertySource::Timestamp => field_or_null(ctx, "ts"),
            PropertySource::LastChange => field_or_null(ctx, "lc"),
            PropertySource::Value => field_or_null(ctx, "value"),
            PropertySource::Random { limit } => random_value(*limit),
            PropertySource::TopicPayload { topic } => {
                let matches = ctx
                    .field("topic")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.contains(topic.as_str()));
                if matches {
                    field_or_null(ctx, "payload")
                } else {
                    Value::Null
                }
            }
            PropertySource::SunData => to_json(source, &self.sun_calc(ctx.message_instant(self), true)?)?,
            PropertySource::SunPercent => self
                .sky_height_percent(ctx.message_instant(self))?
                .map(Value::from)
                .unwrap_or(Value::Null),
            PropertySource::SunAzimuth { unit } => {
                let calc = self.sun_calc(ctx.message_instant(self), false)?;
                let unit = unit.unwrap_or(self.output().angle_unit);
                Value::from(unit.from_radians(calc.azimuth_radians))
            }
            PropertySource::SunElevation { unit } => {
                let calc = self.sun_calc(ctx.message_instant(self), false)?;
                let unit = unit.unwrap_or(self.output().angle_unit);
                Value::from(unit.from_radians(calc.altitude_radians))
            }
            PropertySource::MoonData => {
                to_json(source, &self.moon_calc(ctx.message_instant(self), true)?)?
            }
            PropertySource::MoonPhase => to_json(source, &self.moon_phase(ctx.message_instant(self)))?,
            PropertySource::MoonPhaseIs { phase } => {
                let wanted = MoonPhase::from_label(phase).ok_or_else(|| not_evaluable(source))?;
                Value::Bool(self.moon_phase(ctx.message_instant(self)).phase() == wanted)
            }
            PropertySource::ParsedDate { text } => {
                let offset = self.offset();
                let instant = parse_date_time(text, offset)
                    .or_else(|| {
                        parse_clock_time(text).map(|time| {
                            instant_at(self.local_date(ctx.instant(self)), time, offset)
                        })
                    })
                    .ok_or_else(|| not_evaluable(source))?;
                Value::from(instant.timestamp_millis())
            }
            PropertySource::Expression {
                language,
                expression,
            } => {
                let evaluator = self.evaluator().ok_or_else(|| PropertyError::NoEvaluator {
                    expression: expression.clone(),
                })?;
                evaluator
                    .evaluate(language, expression, ctx.message())
                    .map_err(|message| PropertyError::Expression {
                        expression: expression.clone(),
                        message,
                    })?
            }
        };
        Ok(value)
    }

    /// Fetch `source` and coerce it to a number.
    pub fn fetch_number(
        &self,
        source: &PropertySource,
        ctx: &PropertyContext<'_>,
    ) -> Result<f64, PropertyError> {
        let value = self.fetch(source, ctx)?;
        let number = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null => return Err(not_evaluable(source)),
            _ => None,
        };
        number
            .filter(|n| n.is_finite())
            .ok_or_else(|| PropertyError::NotANumber {
                kind: source.kind().to_string(),
                value: value.to_string(),
            })
    }
}

/// Zero or a non-finite limit falls back to the default.
fn random_value(limit: f64) -> Value {
    let limit = if limit.is_finite() && limit != 0.0 {
        limit
    } else {
        default_random_limit()
    };
    let mut rng = rand::thread_rng();
    if limit >= 0.0 {
        Value::from(rng.gen_range(0..=limit.floor() as i64))
    } else {
        Value::from(rng.gen_range(0.0..limit.abs()))
    }
}

fn to_json<T: Serialize>(source: &PropertySource, value: &T) -> Result<Value, PropertyError> {
    serde_json::to_value(value).map_err(|_| not_evaluable(source))
}
