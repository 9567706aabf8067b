use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Location acquisition and caching
    #[serde(default)]
    pub location: LocationConfig,

    /// Reverse geocoding service
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Reference point the bearing points toward
    #[serde(default)]
    pub qibla: QiblaConfig,
}

/// Where the resolved location is cached between calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-lifetime cache, gone on exit
    Memory,
    /// JSON file in the config directory; survives across runs
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// How long a cached location stays valid
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u32,

    /// Upper bound on waiting for the positioning device
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,

    /// Ask the device for its most accurate fix
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Minimum gap between place-name retries for a cached "Unknown" record
    #[serde(default = "default_enrichment_retry_minutes")]
    pub enrichment_retry_minutes: u32,

    #[serde(default)]
    pub cache: CacheBackend,

    /// Fixed observer position used instead of the system location service
    #[serde(default)]
    pub manual_latitude: Option<f64>,
    #[serde(default)]
    pub manual_longitude: Option<f64>,
}

fn default_max_age_minutes() -> u32 {
    30
}

fn default_timeout_secs() -> u32 {
    10
}

fn default_high_accuracy() -> bool {
    true
}

fn default_enrichment_retry_minutes() -> u32 {
    5
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_age_minutes: default_max_age_minutes(),
            timeout_secs: default_timeout_secs(),
            high_accuracy: default_high_accuracy(),
            enrichment_retry_minutes: default_enrichment_retry_minutes(),
            cache: CacheBackend::default(),
            manual_latitude: None,
            manual_longitude: None,
        }
    }
}

impl LocationConfig {
    /// The manually configured observer position, when both halves are set.
    pub fn manual_position(&self) -> Option<(f64, f64)> {
        match (self.manual_latitude, self.manual_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Look up city/country names for resolved coordinates
    #[serde(default = "default_geocoding_enabled")]
    pub enabled: bool,

    /// Nominatim-compatible endpoint root
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,

    /// Sent with every lookup; Nominatim rejects anonymous clients
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u32,
}

fn default_geocoding_enabled() -> bool {
    true
}

fn default_geocoding_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    concat!("qibla/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: default_geocoding_enabled(),
            base_url: default_geocoding_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QiblaConfig {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for QiblaConfig {
    /// The Kaaba, Mecca
    fn default() -> Self {
        Self {
            latitude: 21.4225,
            longitude: 39.8262,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qibla");

        Self {
            config_dir,
            location: LocationConfig::default(),
            geocoding: GeocodingConfig::default(),
            qibla: QiblaConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating default if it doesn't exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.location.max_age_minutes == 0 {
            result.add_warning(
                "location.max_age_minutes",
                "Location cache disabled (0 minutes); every request hits the device",
            );
        } else if self.location.max_age_minutes > 1440 {
            result.add_warning(
                "location.max_age_minutes",
                "Location cache lifetime is more than 24 hours",
            );
        }

        if self.location.timeout_secs == 0 {
            result.add_error("location.timeout_secs", "Timeout must be greater than 0");
        }

        match (self.location.manual_latitude, self.location.manual_longitude) {
            (Some(lat), Some(lon)) => {
                validate_latitude(lat, "location.manual_latitude", &mut result);
                validate_longitude(lon, "location.manual_longitude", &mut result);
            }
            (None, None) => {}
            _ => result.add_warning(
                "location",
                "Only one of manual_latitude/manual_longitude is set; ignoring both",
            ),
        }

        if self.geocoding.enabled {
            self.validate_url(&self.geocoding.base_url, "geocoding.base_url", &mut result);
            if self.geocoding.user_agent.trim().is_empty() {
                result.add_error("geocoding.user_agent", "User agent must not be empty");
            }
            if self.geocoding.timeout_secs == 0 {
                result.add_error("geocoding.timeout_secs", "Timeout must be greater than 0");
            }
        }

        validate_latitude(self.qibla.latitude, "qibla.latitude", &mut result);
        validate_longitude(self.qibla.longitude, "qibla.longitude", &mut result);

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("platform config directory".to_string()))?
            .join("qibla");

        Ok(config_dir.join("config.toml"))
    }
}

fn validate_latitude(value: f64, field: &str, result: &mut ValidationResult) {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        result.add_error(field, format!("Latitude must be within [-90, 90], got {}", value));
    }
}

fn validate_longitude(value: f64, field: &str, result: &mut ValidationResult) {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        result.add_error(
            field,
            format!("Longitude must be within [-180, 180], got {}", value),
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_defaults_match_location_policy() {
        let config = Config::default();
        assert_eq!(config.location.max_age_minutes, 30);
        assert_eq!(config.location.timeout_secs, 10);
        assert!(config.location.high_accuracy);
        assert_eq!(config.location.cache, CacheBackend::File);
        assert!((config.qibla.latitude - 21.4225).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_geocoding_url() {
        let mut config = Config::default();
        config.geocoding.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "geocoding.base_url"));
    }

    #[test]
    fn test_invalid_geocoding_url_scheme() {
        let mut config = Config::default();
        config.geocoding.base_url = "ftp://example.com".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_disabled_geocoding_skips_url_check() {
        let mut config = Config::default();
        config.geocoding.enabled = false;
        config.geocoding.base_url = "not-a-url".to_string();
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_manual_position_out_of_range() {
        let mut config = Config::default();
        config.location.manual_latitude = Some(95.0);
        config.location.manual_longitude = Some(10.0);
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "location.manual_latitude"));
    }

    #[test]
    fn test_half_manual_position_is_warning() {
        let mut config = Config::default();
        config.location.manual_latitude = Some(51.5);
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "location"));
        assert_eq!(config.location.manual_position(), None);
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.location.timeout_secs = 0;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_load_creates_default_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qibla").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.config_dir, dir.path().join("qibla"));

        let mut edited = created.clone();
        edited.location.cache = CacheBackend::Memory;
        edited.location.max_age_minutes = 45;
        edited.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.location.cache, CacheBackend::Memory);
        assert_eq!(reloaded.location.max_age_minutes, 45);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = \"/tmp/qibla\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.location.max_age_minutes, 30);
        assert!(config.geocoding.enabled);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[location\nmax_age_minutes = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
