//! Live compass heading: normalization of platform orientation events and
//! fan-out to subscribers.

use std::future::Future;
use std::str::FromStr;

use tokio::sync::watch;

use crate::bearing::compute_rotation;
use crate::types::{Bearing, HeadingSample, OrientationError, Rotation};

/// An orientation event as a platform reports it.
///
/// iOS exposes a true compass heading (`webkitCompassHeading`); other
/// platforms only give `alpha`, which grows counter-clockwise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawOrientation {
    pub compass_heading: Option<f64>,
    pub alpha: Option<f64>,
}

impl RawOrientation {
    pub fn compass(degrees: f64) -> Self {
        Self {
            compass_heading: Some(degrees),
            alpha: None,
        }
    }

    pub fn alpha(degrees: f64) -> Self {
        Self {
            compass_heading: None,
            alpha: Some(degrees),
        }
    }

    /// Reduce to a single clockwise-from-north heading, if the event has one.
    pub fn to_sample(&self) -> Option<HeadingSample> {
        if let Some(heading) = self.compass_heading.filter(|h| h.is_finite()) {
            return HeadingSample::new(heading);
        }
        self.alpha
            .filter(|a| a.is_finite())
            .and_then(|alpha| HeadingSample::new(360.0 - alpha))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid orientation event {0:?}; expected webkit:<degrees> or alpha:<degrees>")]
pub struct ParseOrientationError(String);

impl FromStr for RawOrientation {
    type Err = ParseOrientationError;

    /// Parses `webkit:<deg>` or `alpha:<deg>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseOrientationError(s.to_string());
        let (kind, value) = s.trim().split_once(':').ok_or_else(invalid)?;
        let degrees: f64 = value.trim().parse().map_err(|_| invalid())?;
        match kind.trim().to_ascii_lowercase().as_str() {
            "webkit" | "compass" => Ok(Self::compass(degrees)),
            "alpha" => Ok(Self::alpha(degrees)),
            _ => Err(invalid()),
        }
    }
}

/// Whether a platform asks the user before delivering orientation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionGate {
    NotRequired,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationPermission {
    Granted,
    Denied,
}

/// Device orientation capability.
pub trait OrientationSensor: Send + Sync {
    /// False when the platform has no orientation API at all
    fn is_supported(&self) -> bool {
        true
    }

    fn permission_gate(&self) -> PermissionGate {
        PermissionGate::NotRequired
    }

    /// Ask the user for access. Only called when the gate is `Required`.
    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<OrientationPermission, OrientationError>> + Send;
}

/// An activated compass that fans normalized headings out to subscribers.
#[derive(Debug)]
pub struct Compass {
    tx: watch::Sender<Option<HeadingSample>>,
}

impl Compass {
    /// Pass the platform's permission gate and return a compass ready to
    /// receive orientation events.
    ///
    /// # Errors
    /// `Unsupported` if the sensor is absent, `PermissionDenied` if the user
    /// refuses a required prompt.
    pub async fn activate<S: OrientationSensor>(sensor: &S) -> Result<Self, OrientationError> {
        if !sensor.is_supported() {
            tracing::warn!("Device orientation not supported");
            return Err(OrientationError::Unsupported);
        }

        if sensor.permission_gate() == PermissionGate::Required {
            match sensor.request_permission().await? {
                OrientationPermission::Granted => {}
                OrientationPermission::Denied => {
                    tracing::info!("Orientation permission not granted");
                    return Err(OrientationError::PermissionDenied);
                }
            }
        }

        tracing::info!("Compass activated");
        Ok(Self::new())
    }

    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Normalize and broadcast one orientation event.
    ///
    /// Returns the published sample, or `None` when the event carried no
    /// usable heading (nothing is published in that case).
    pub fn publish(&self, raw: RawOrientation) -> Option<HeadingSample> {
        let Some(sample) = raw.to_sample() else {
            tracing::debug!("Dropping orientation event without heading: {:?}", raw);
            return None;
        };
        self.tx.send_replace(Some(sample));
        Some(sample)
    }

    pub fn latest(&self) -> Option<HeadingSample> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> HeadingSubscription {
        HeadingSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Rotation for the latest heading.
    ///
    /// # Errors
    /// `NoReading` until the first heading arrives.
    pub fn rotation(&self, bearing: &Bearing) -> Result<Rotation, OrientationError> {
        let heading = self.latest().ok_or(OrientationError::NoReading)?;
        Ok(compute_rotation(bearing, &heading))
    }
}

/// Receiver side of a [`Compass`]. Sees the most recent sample; samples
/// published faster than they are read are coalesced.
#[derive(Debug, Clone)]
pub struct HeadingSubscription {
    rx: watch::Receiver<Option<HeadingSample>>,
}

impl HeadingSubscription {
    /// Wait for the next heading. Returns `None` once the compass is dropped.
    pub async fn changed(&mut self) -> Option<HeadingSample> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(sample) = *self.rx.borrow_and_update() {
                return Some(sample);
            }
        }
    }

    pub fn latest(&self) -> Option<HeadingSample> {
        *self.rx.borrow()
    }
}
