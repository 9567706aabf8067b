use chrono::{DateTime, Utc};
use qibla_core::NetworkError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Build a coordinate, rejecting values outside the standard ranges.
    ///
    /// # Errors
    /// Returns `CoordinateError` for non-finite values, latitudes outside
    /// [-90, 90] or longitudes outside [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// For compile-time constants known to be in range.
    pub(crate) const fn new_unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A place name that may be missing.
///
/// `Unknown` is stored explicitly (as JSON `null`) so a record never has an
/// unset city or country.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum PlaceName {
    Known(String),
    #[default]
    Unknown,
}

impl PlaceName {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<String>> for PlaceName {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) if !name.trim().is_empty() => Self::Known(name),
            _ => Self::Unknown,
        }
    }
}

impl From<PlaceName> for Option<String> {
    fn from(value: PlaceName) -> Self {
        match value {
            PlaceName::Known(name) => Some(name),
            PlaceName::Unknown => None,
        }
    }
}

impl fmt::Display for PlaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(name) => f.write_str(name),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// City and country for a coordinate, as returned by reverse geocoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Place {
    pub city: PlaceName,
    pub country: PlaceName,
}

/// The observer's resolved location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub coordinate: Coordinate,
    pub accuracy_meters: Option<f64>,
    pub city: PlaceName,
    pub country: PlaceName,
    pub captured_at: DateTime<Utc>,
    /// Last time a place-name lookup ran for this record, successful or not
    #[serde(default)]
    pub enrichment_attempted_at: Option<DateTime<Utc>>,
}

impl LocationRecord {
    pub fn new(coordinate: Coordinate, captured_at: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            city: PlaceName::Unknown,
            country: PlaceName::Unknown,
            captured_at,
            enrichment_attempted_at: None,
        }
    }

    /// True when either place field still holds the `Unknown` sentinel.
    pub fn needs_enrichment(&self) -> bool {
        self.city.is_unknown() || self.country.is_unknown()
    }

    /// Take the looked-up names; a lookup that found nothing for a field
    /// keeps whatever the record already had.
    pub fn apply_place(&mut self, place: Place) {
        if !place.city.is_unknown() {
            self.city = place.city;
        }
        if !place.country.is_unknown() {
            self.country = place.country;
        }
    }

    /// Age relative to `now`; negative ages (clock skew) count as zero.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.captured_at).max(chrono::Duration::zero())
    }
}

/// A normalized compass reading: degrees clockwise from north, in [0, 360).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingSample {
    degrees: f64,
}

impl HeadingSample {
    /// Wrap any finite angle into [0, 360). Non-finite input yields `None`.
    pub fn new(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() {
            return None;
        }
        Some(Self {
            degrees: normalize_degrees(degrees),
        })
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }
}

/// Great-circle direction from the observer to the reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bearing {
    /// Degrees clockwise from north, in [0, 360)
    Degrees(f64),
    /// Observer and reference coincide; there is no direction to point at
    Undetermined,
}

impl Bearing {
    pub fn degrees(&self) -> Option<f64> {
        match self {
            Self::Degrees(d) => Some(*d),
            Self::Undetermined => None,
        }
    }
}

impl fmt::Display for Bearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degrees(d) => write!(f, "{:.1}°", d),
            Self::Undetermined => f.write_str("undetermined"),
        }
    }
}

/// What to render for the current heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    /// Rotation for the compass dial so north stays north: `-heading`
    pub dial_degrees: f64,
    /// Bearing relative to where the device faces, in [0, 360)
    pub relative_degrees: Option<f64>,
    pub bearing: Bearing,
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Device capabilities the core depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Positioning,
    Orientation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positioning => f.write_str("positioning"),
            Self::Orientation => f.write_str("orientation"),
        }
    }
}

/// Why a location could not be resolved.
///
/// `Clone` so a single outcome can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location unavailable")]
    PositionUnavailable,
    #[error("Location request timed out")]
    Timeout,
    #[error("{0} is not supported on this device")]
    UnsupportedCapability(Capability),
    #[error("Location cache error: {0}")]
    Cache(String),
    #[error("Location error: {0}")]
    Other(String),
}

impl LocationError {
    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Location access denied. Please enable location access in your settings."
            }
            Self::PositionUnavailable => "Location information is unavailable.",
            Self::Timeout => "Location request timed out.",
            Self::UnsupportedCapability(Capability::Positioning) => {
                "Location is not supported on this device."
            }
            Self::UnsupportedCapability(Capability::Orientation) => {
                "Compass is not supported on this device."
            }
            Self::Cache(_) => "Saved location could not be stored.",
            Self::Other(_) => "An unknown error occurred while retrieving location.",
        }
    }
}

/// Compass activation and reading failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrientationError {
    #[error("Device orientation is not supported")]
    Unsupported,
    #[error("Orientation permission denied")]
    PermissionDenied,
    #[error("No compass reading received yet")]
    NoReading,
}

impl OrientationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unsupported => "Device orientation is not supported on this device.",
            Self::PermissionDenied => "Compass permission not granted.",
            Self::NoReading => "Compass not available. Move your phone in a figure-8.",
        }
    }
}

/// Reverse-geocoding failures. The store treats all of them as
/// "enrichment failed" and falls back to `PlaceName::Unknown`.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Geocoder returned status {0}")]
    Status(u16),
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Cache backend failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
