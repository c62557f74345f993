//! Output formatting of resolved instants.
//!
//! Every formatted instant is shown in one fixed UTC offset. When no offset
//! is configured the default format falls back to the host's local time.

use std::fmt::Write as _;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::astro::AngleUnit;
use crate::calendar;

/// How an emitted instant is rendered.
///
/// Configured as a string: `millis`, `iso`, `default`, or any other text,
/// which is taken as a `strftime` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    /// Epoch milliseconds as a number.
    Millis,
    /// RFC 3339 in the configured offset.
    Iso,
    /// A `strftime` pattern in the configured offset.
    Pattern(String),
    /// `date_format` and `time_format` joined by a space.
    #[default]
    Default,
}

impl From<String> for OutputFormat {
    fn from(text: String) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "" | "default" => OutputFormat::Default,
            "millis" | "ms" | "timestamp" => OutputFormat::Millis,
            "iso" | "rfc3339" => OutputFormat::Iso,
            _ => OutputFormat::Pattern(text),
        }
    }
}

impl From<OutputFormat> for String {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Millis => "millis".into(),
            OutputFormat::Iso => "iso".into(),
            OutputFormat::Pattern(p) => p,
            OutputFormat::Default => "default".into(),
        }
    }
}

/// The `[output]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Minutes east of UTC used for every civil date and formatted time.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub angle_unit: AngleUnit,
}

fn default_time_format() -> String {
    "%H:%M:%S".into()
}
fn default_date_format() -> String {
    "%Y-%m-%d".into()
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            time_format: default_time_format(),
            date_format: default_date_format(),
            angle_unit: AngleUnit::default(),
        }
    }
}

impl OutputSettings {
    /// Render `instant` as a JSON value.
    ///
    /// An invalid `strftime` pattern yields `null` instead of panicking.
    pub fn format(&self, instant: DateTime<Utc>, format: &OutputFormat) -> Value {
        match format {
            OutputFormat::Millis => Value::from(instant.timestamp_millis()),
            OutputFormat::Iso => Value::String(
                instant
                    .with_timezone(&calendar::fixed_offset(self.utc_offset_minutes))
                    .to_rfc3339(),
            ),
            OutputFormat::Pattern(pattern) => self
                .render(instant, pattern)
                .map(Value::String)
                .unwrap_or(Value::Null),
            OutputFormat::Default => self
                .date_time_string(instant)
                .map(Value::String)
                .unwrap_or(Value::Null),
        }
    }

    pub fn time_string(&self, instant: DateTime<Utc>) -> Option<String> {
        self.render(instant, &self.time_format)
    }

    pub fn date_string(&self, instant: DateTime<Utc>) -> Option<String> {
        self.render(instant, &self.date_format)
    }

    pub fn date_time_string(&self, instant: DateTime<Utc>) -> Option<String> {
        self.render(instant, &format!("{} {}", self.date_format, self.time_format))
    }

    fn render(&self, instant: DateTime<Utc>, pattern: &str) -> Option<String> {
        let mut out = String::new();
        let written = match self.utc_offset_minutes {
            Some(_) => write!(
                out,
                "{}",
                instant
                    .with_timezone(&calendar::fixed_offset(self.utc_offset_minutes))
                    .format(pattern)
            ),
            None => write!(out, "{}", instant.with_timezone(&Local).format(pattern)),
        };
        written.ok().map(|_| out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settings(offset: i32) -> OutputSettings {
        OutputSettings {
            utc_offset_minutes: Some(offset),
            ..OutputSettings::default()
        }
    }

    #[test]
    fn formats_in_fixed_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 22, 15, 0).unwrap();
        let s = settings(120);
        assert_eq!(s.format(instant, &OutputFormat::Default), "2024-06-02 00:15:00");
        assert_eq!(
            s.format(instant, &OutputFormat::Iso),
            "2024-06-02T00:15:00+02:00"
        );
        assert_eq!(
            s.format(instant, &OutputFormat::Millis),
            instant.timestamp_millis()
        );
        assert_eq!(
            s.format(instant, &OutputFormat::Pattern("%H:%M".into())),
            "00:15"
        );
        assert_eq!(s.time_string(instant).as_deref(), Some("00:15:00"));
        assert_eq!(s.date_string(instant).as_deref(), Some("2024-06-02"));
    }

    #[test]
    fn invalid_pattern_yields_null() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 22, 15, 0).unwrap();
        assert_eq!(
            settings(0).format(instant, &OutputFormat::Pattern("%Q".into())),
            Value::Null
        );
    }

    #[test]
    fn format_parses_from_text() {
        assert_eq!(OutputFormat::from("millis".to_string()), OutputFormat::Millis);
        assert_eq!(OutputFormat::from(String::new()), OutputFormat::Default);
        assert_eq!(
            OutputFormat::from("%d.%m.%Y".to_string()),
            OutputFormat::Pattern("%d.%m.%Y".into())
        );
    }
}
