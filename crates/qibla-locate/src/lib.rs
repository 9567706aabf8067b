//! Qibla direction for the observer's location.
//!
//! Resolves where the observer is (cached record, device fix, place-name
//! lookup), computes the great-circle bearing to the Kaaba, and turns
//! device orientation events into a dial rotation.

pub mod bearing;
pub mod cache;
pub mod geocode;
pub mod heading;
pub mod position;
pub mod store;
pub mod types;

#[cfg(target_os = "linux")]
pub mod geoclue;

pub use bearing::{calculate_bearing, compute_rotation, qibla_bearing, KAABA};
pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use geocode::{DisabledGeocoder, NominatimGeocoder, ReverseGeocoder};
pub use heading::{
    Compass, HeadingSubscription, OrientationPermission, OrientationSensor, PermissionGate,
    RawOrientation,
};
pub use position::{
    PermissionState, PositionError, PositionOptions, PositionProvider, PositionReading,
    StaticPositionProvider, UnsupportedPositionProvider,
};
pub use store::{LocationStore, ResolveOutcome, ResolvePhase, StoreOptions};
pub use types::*;

#[cfg(target_os = "linux")]
pub use geoclue::GeoClueProvider;
