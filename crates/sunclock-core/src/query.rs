//! One-shot queries.
//!
//! A [`QueryRequest`] is answered with a JSON [`QueryResponse`]. Failed
//! resolutions carry `null` as the value and the error text next to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::calendar::Multiplier;
use crate::engine::Engine;
use crate::error::ConfigError;
use crate::format::OutputFormat;
use crate::property::PropertyContext;
use crate::resolver::TimeQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "kebab-case")]
pub enum QueryRequest {
    /// Resolve a time query and format the instant.
    Time {
        time: TimeQuery,
        #[serde(default)]
        format: OutputFormat,
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    /// The previous and next sun event, both shifted by the offset.
    Nearest {
        #[serde(default)]
        offset: f64,
        #[serde(default)]
        multiplier: Multiplier,
        #[serde(default)]
        format: OutputFormat,
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    SunPosition {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    MoonPosition {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    SkyPercent {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
    MoonPhase {
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
}

impl QueryRequest {
    pub fn time(time: TimeQuery) -> Self {
        QueryRequest::Time {
            time,
            format: OutputFormat::default(),
            now: None,
        }
    }

    fn now(&self) -> Option<DateTime<Utc>> {
        match self {
            QueryRequest::Time { now, .. }
            | QueryRequest::Nearest { now, .. }
            | QueryRequest::SunPosition { now }
            | QueryRequest::MoonPosition { now }
            | QueryRequest::SkyPercent { now }
            | QueryRequest::MoonPhase { now } => *now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub value: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResponse {
    fn ok(value: Value) -> Self {
        Self { value, error: None }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            value: Value::Null,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn to_value<T: Serialize>(value: &T) -> QueryResponse {
    match serde_json::to_value(value) {
        Ok(v) => QueryResponse::ok(v),
        Err(e) => QueryResponse::failed(e),
    }
}

impl Engine {
    /// Answer `request`. Only a misconfigured location is an `Err`.
    pub fn query(
        &self,
        request: &QueryRequest,
        ctx: &PropertyContext<'_>,
    ) -> Result<QueryResponse, ConfigError> {
        let now = request.now().unwrap_or_else(|| self.now());
        let response = match request {
            QueryRequest::Time { time, format, .. } => {
                let resolved = self.resolve(now, time, ctx)?;
                match resolved.error {
                    Some(error) => QueryResponse::failed(error),
                    None => QueryResponse::ok(self.output().format(resolved.instant, format)),
                }
            }
            QueryRequest::Nearest {
                offset,
                multiplier,
                format,
                ..
            } => match self.surrounding(now)? {
                Some(around) => QueryResponse::ok(
                    around
                        .shifted(*offset, *multiplier)
                        .to_payload(self.output(), format),
                ),
                None => QueryResponse::failed("no sun events around now"),
            },
            QueryRequest::SunPosition { .. } => to_value(&self.sun_calc(now, true)?),
            QueryRequest::MoonPosition { .. } => to_value(&self.moon_calc(now, true)?),
            QueryRequest::SkyPercent { .. } => match self.sky_height_percent(now)? {
                Some(percent) => QueryResponse::ok(Value::from(percent)),
                None => QueryResponse::failed("the sun does not culminate today"),
            },
            QueryRequest::MoonPhase { .. } => to_value(&self.moon_phase(now)),
        };
        if let Some(error) = &response.error {
            debug!(%error, "query failed");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ephemeris::{names, Coordinates};
    use crate::format::OutputSettings;
    use crate::testing::SyntheticEphemeris;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> Engine {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 5, 0, 0).unwrap();
        Engine::new(
            Coordinates::new(48.1, 11.6).unwrap(),
            Arc::new(SyntheticEphemeris::new()),
        )
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now)))
        .with_output(OutputSettings {
            utc_offset_minutes: Some(0),
            ..OutputSettings::default()
        })
    }

    #[test]
    fn time_query_formats_the_instant() {
        let e = engine();
        let request = QueryRequest::Time {
            time: TimeQuery::sun(names::SUNSET),
            format: OutputFormat::Pattern("%H:%M".into()),
            now: None,
        };
        let response = e.query(&request, &PropertyContext::empty()).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.value, "18:00");
    }

    #[test]
    fn failed_time_query_yields_null_and_error() {
        let e = engine();
        let request = QueryRequest::time(TimeQuery::sun("noSuchEvent"));
        let response = e.query(&request, &PropertyContext::empty()).unwrap();
        assert_eq!(response.value, Value::Null);
        assert!(response.error.unwrap().contains("noSuchEvent"));
    }

    #[test]
    fn nearest_query_returns_both_events() {
        let e = engine();
        let request: QueryRequest = serde_json::from_value(json!({
            "query": "nearest",
            "offset": 1,
            "multiplier": "hours",
            "format": "%H:%M"
        }))
        .unwrap();
        let response = e.query(&request, &PropertyContext::empty()).unwrap();
        assert_eq!(response.value["previous"]["name"], names::NAUTICAL_DAWN);
        assert_eq!(response.value["previous"]["instant"], "05:40");
        assert_eq!(response.value["next"]["name"], names::CIVIL_DAWN);
        assert_eq!(response.value["next"]["instant"], "06:20");
    }

    #[test]
    fn astronomical_queries() {
        let e = engine();
        let noon = Utc.with_ymd_and_hms(2024, 6, 3, 12, 30, 0).unwrap();
        let response = e
            .query(
                &QueryRequest::SkyPercent { now: Some(noon) },
                &PropertyContext::empty(),
            )
            .unwrap();
        let percent = response.value.as_f64().unwrap();
        assert!((percent - 100.0).abs() < 1e-6);

        let response = e
            .query(&QueryRequest::MoonPhase { now: None }, &PropertyContext::empty())
            .unwrap();
        assert!(response.value["name"].is_string());

        let response = e
            .query(&QueryRequest::SunPosition { now: Some(noon) }, &PropertyContext::empty())
            .unwrap();
        assert!(response.value["altitudeDegrees"].as_f64().unwrap() > 44.0);
    }
}
