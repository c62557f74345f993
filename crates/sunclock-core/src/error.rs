//! Core error types for sunclock-core.
//!
//! Only coordinate misconfiguration is fatal: every other computation is
//! meaningless without a valid location, so [`ConfigError`] is raised as a
//! hard failure. Everything that can go wrong while resolving a single time
//! reference is a [`ResolutionError`], which travels inside a
//! [`ResolvedTime`](crate::resolver::ResolvedTime) instead of being returned
//! as `Err`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for sunclock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Property lookup errors
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// A time reference that could not be resolved
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Latitude is NaN or outside [-90, 90]
    #[error("Latitude {0} is missing or outside [-90, 90]")]
    InvalidLatitude(f64),

    /// Longitude is NaN or outside [-180, 180]
    #[error("Longitude {0} is missing or outside [-180, 180]")]
    InvalidLongitude(f64),

    /// Both coordinates are zero, which is treated as "never configured"
    #[error("Coordinates are not configured (latitude and longitude are both 0)")]
    CoordinatesMissing,

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Non-fatal failures while resolving a time reference.
///
/// Recorded on the resolved time together with a best-effort instant so the
/// caller can decide on a fallback.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("No valid day of week found!")]
    NoValidWeekday,

    #[error("No valid month found!")]
    NoValidMonth,

    #[error("No occurrence of {reference} after {after} within {days} days")]
    NoFutureOccurrence {
        reference: String,
        after: DateTime<Utc>,
        days: u32,
    },

    #[error("Unknown event '{name}'")]
    UnknownEvent { name: String },

    #[error("Event '{name}' does not occur on {date}")]
    EventNotOccurring { name: String, date: NaiveDate },

    #[error("Can not get time for '{text}'")]
    Unparseable { text: String },

    #[error("Day of month rule '{rule}' has no match in {year}-{month:02}")]
    NoDayOfMonth { rule: String, year: i32, month: u32 },

    #[error("Offset could not be evaluated: {message}")]
    InvalidOffset { message: String },

    #[error("Property could not be evaluated: {message}")]
    NotEvaluable { message: String },

    #[error("Time {instant} is not in the future")]
    NotInFuture { instant: DateTime<Utc> },
}

/// Property lookup errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The source produced no usable value
    #[error("Property {kind} could not be evaluated")]
    NotEvaluable { kind: String },

    /// A numeric value was required
    #[error("The value of {kind} is not a valid number: {value}")]
    NotANumber { kind: String, value: String },

    /// Expression source used without a host evaluator
    #[error("No expression evaluator is registered for '{expression}'")]
    NoEvaluator { expression: String },

    /// The host evaluator rejected the expression
    #[error("Expression '{expression}' failed: {message}")]
    Expression { expression: String, message: String },

    /// Astronomical sources need a valid location
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A compare verb that is not part of the operator table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown compare operator '{0}'")]
pub struct UnknownOperator(pub String);

impl From<PropertyError> for ResolutionError {
    fn from(err: PropertyError) -> Self {
        ResolutionError::NotEvaluable {
            message: err.to_string(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
