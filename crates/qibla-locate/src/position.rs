//! Positioning capability: where the observer's raw coordinate comes from.

use std::future::Future;
use std::time::Duration;

use crate::types::{Capability, Coordinate, LocationError};

/// Options passed to the positioning device for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    /// How long to wait for a fix
    pub timeout: Duration,
    /// Oldest device-cached fix the device may answer with
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(10),
            maximum_age: Duration::from_secs(30 * 60),
        }
    }
}

/// A single fix from the positioning device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReading {
    pub coordinate: Coordinate,
    pub accuracy_meters: Option<f64>,
}

/// Classified device failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Location access denied by user.")]
    PermissionDenied,
    #[error("Location information is unavailable.")]
    PositionUnavailable,
    #[error("Location request timed out.")]
    Timeout,
    #[error("An unknown error occurred while retrieving location: {0}")]
    Unknown(String),
}

impl From<PositionError> for LocationError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::PermissionDenied => LocationError::PermissionDenied,
            PositionError::PositionUnavailable => LocationError::PositionUnavailable,
            PositionError::Timeout => LocationError::Timeout,
            PositionError::Unknown(msg) => LocationError::Other(msg),
        }
    }
}

/// Current permission state for positioning, queried before prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; the device will ask on the next request
    Prompt,
}

/// Device positioning capability.
pub trait PositionProvider: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    /// Providers that cannot report permission up front answer `Prompt`.
    fn permission(&self) -> impl Future<Output = PermissionState> + Send {
        async { PermissionState::Prompt }
    }

    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<PositionReading, PositionError>> + Send;
}

/// A fixed, user-configured position.
#[derive(Debug, Clone, Copy)]
pub struct StaticPositionProvider {
    reading: PositionReading,
}

impl StaticPositionProvider {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            reading: PositionReading {
                coordinate,
                accuracy_meters: None,
            },
        }
    }
}

impl PositionProvider for StaticPositionProvider {
    fn permission(&self) -> impl Future<Output = PermissionState> + Send {
        async { PermissionState::Granted }
    }

    fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> impl Future<Output = Result<PositionReading, PositionError>> + Send {
        let reading = self.reading;
        async move { Ok(reading) }
    }
}

/// Stand-in for platforms without a location service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPositionProvider;

impl PositionProvider for UnsupportedPositionProvider {
    fn is_supported(&self) -> bool {
        false
    }

    fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> impl Future<Output = Result<PositionReading, PositionError>> + Send {
        async { Err(PositionError::PositionUnavailable) }
    }
}

/// Error returned when resolution is attempted on an unsupported provider.
pub(crate) fn unsupported() -> LocationError {
    LocationError::UnsupportedCapability(Capability::Positioning)
}
