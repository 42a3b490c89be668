//! Dispatch policy configuration.
//!
//! Parsed from TOML. Everything has a default so an empty file (or no
//! file) yields a working single-node setup.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The parsed values fail a semantic check.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DispatchConfig {
    /// Arrival-estimation settings.
    #[serde(default)]
    pub eta: EtaConfig,

    /// Allocation policy settings.
    #[serde(default)]
    pub allocation: AllocationConfig,
}

impl DispatchConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value fails
    /// validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.eta.default_speed_kmh <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "eta.default_speed_kmh must be positive, got {}",
                self.eta.default_speed_kmh
            )));
        }
        Ok(())
    }
}

/// Arrival-estimation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EtaConfig {
    /// Seconds a crew needs to mobilize before covering any distance.
    /// No estimate is ever below this floor.
    #[serde(default = "default_mobilization_floor_secs")]
    pub mobilization_floor_secs: u64,

    /// Average speed assumed for units without their own profile, km/h.
    #[serde(default = "default_speed_kmh")]
    pub default_speed_kmh: f64,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            mobilization_floor_secs: default_mobilization_floor_secs(),
            default_speed_kmh: default_speed_kmh(),
        }
    }
}

/// Allocation policy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AllocationConfig {
    /// Whether CRITICAL incidents may pre-empt en-route units. Even when
    /// enabled, each pre-emption needs per-request confirmation.
    #[serde(default)]
    pub allow_preemption: bool,
}

const fn default_mobilization_floor_secs() -> u64 {
    90
}

const fn default_speed_kmh() -> f64 {
    60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = DispatchConfig::from_toml("").unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.eta.mobilization_floor_secs, 90);
        assert!(!config.allocation.allow_preemption);
    }

    #[test]
    fn overrides_are_honored() {
        let config = DispatchConfig::from_toml(
            r#"
            [eta]
            mobilization_floor_secs = 120
            default_speed_kmh = 45.0

            [allocation]
            allow_preemption = true
            "#,
        )
        .unwrap();
        assert_eq!(config.eta.mobilization_floor_secs, 120);
        assert!((config.eta.default_speed_kmh - 45.0).abs() < f64::EPSILON);
        assert!(config.allocation.allow_preemption);
    }

    #[test]
    fn non_positive_speed_is_rejected() {
        let err = DispatchConfig::from_toml("[eta]\ndefault_speed_kmh = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DispatchConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(DispatchConfig::from_toml(&rendered).unwrap(), config);
    }
}
