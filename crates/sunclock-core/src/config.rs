//! TOML configuration.
//!
//! ```toml
//! [location]
//! latitude = 52.52
//! longitude = 13.40
//!
//! [output]
//! utc_offset_minutes = 60
//!
//! [[schedules]]
//! name = "porch-light"
//! primary = { reference = { kind = "sun-event", name = "sunset" }, offset = -15 }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ephemeris::Coordinates;
use crate::error::ConfigError;
use crate::format::OutputSettings;
use crate::scheduler::{SchedulerConfig, ScheduleSpec};
use crate::window::WindowSpec;

/// Largest accepted `utc_offset_minutes` magnitude.
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Returns `~/.config/sunclock[-dev]/` based on SUNCLOCK_ENV.
///
/// Set SUNCLOCK_ENV=dev to use the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("SUNCLOCK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("sunclock-dev")
    } else {
        base_dir.join("sunclock")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

/// The `[location]` section. Both zero means "not configured".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub schedules: Vec<ScheduleSpec>,
    #[serde(default)]
    pub windows: Vec<WindowSpec>,
}

impl Config {
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing the default file when none
    /// exists yet.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the default file cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        if key.is_empty() {
            return None;
        }
        let mut current = &json;
        for part in key.split('.') {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        match current {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Check every value that would otherwise fail later, and return the
    /// configured coordinates.
    pub fn validate(&self) -> Result<Coordinates, ConfigError> {
        let coords = Coordinates::new(self.location.latitude, self.location.longitude)?;

        if let Some(minutes) = self.output.utc_offset_minutes {
            if minutes.abs() > MAX_OFFSET_MINUTES {
                return Err(ConfigError::InvalidValue {
                    key: "output.utc_offset_minutes".into(),
                    message: format!("{minutes} is outside ±{MAX_OFFSET_MINUTES}"),
                });
            }
        }

        let interval = self.scheduler.recalc_interval_hours;
        if !interval.is_finite() || interval < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.recalc_interval_hours".into(),
                message: format!("{interval} is not a non-negative number"),
            });
        }

        let mut names = HashSet::new();
        let all = self
            .schedules
            .iter()
            .map(|s| &s.name)
            .chain(self.windows.iter().map(|w| &w.name));
        for name in all {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "name".into(),
                    message: "schedule and window names must not be empty".into(),
                });
            }
            if !names.insert(name) {
                return Err(ConfigError::InvalidValue {
                    key: "name".into(),
                    message: format!("'{name}' is used more than once"),
                });
            }
        }

        Ok(coords)
    }
}
