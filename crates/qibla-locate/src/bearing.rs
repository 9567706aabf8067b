//! Great-circle bearing toward a reference point, and the rotation to
//! render for a live compass heading.

use crate::types::{normalize_degrees, Bearing, Coordinate, HeadingSample, Rotation};

/// The Kaaba, Mecca.
pub const KAABA: Coordinate = Coordinate::new_unchecked(21.4225, 39.8262);

/// Coordinates closer than this on both axes are treated as the same point.
const SAME_POINT_EPSILON_DEG: f64 = 1e-9;

/// Initial great-circle bearing from `observer` toward `reference`, in [0, 360).
///
/// Returns `Bearing::Undetermined` when the two points coincide, where the
/// direction is mathematically undefined.
pub fn calculate_bearing(reference: &Coordinate, observer: &Coordinate) -> Bearing {
    if (reference.latitude() - observer.latitude()).abs() < SAME_POINT_EPSILON_DEG
        && (reference.longitude() - observer.longitude()).abs() < SAME_POINT_EPSILON_DEG
    {
        return Bearing::Undetermined;
    }

    let phi_ref = reference.latitude().to_radians();
    let phi_obs = observer.latitude().to_radians();
    let delta_lambda = (reference.longitude() - observer.longitude()).to_radians();

    let psi = delta_lambda.sin().atan2(
        phi_obs.cos() * phi_ref.tan() - phi_obs.sin() * delta_lambda.cos(),
    );

    let degrees = psi.to_degrees();
    if !degrees.is_finite() {
        return Bearing::Undetermined;
    }
    Bearing::Degrees(normalize_degrees(degrees + 360.0))
}

/// Bearing from `observer` toward the Kaaba.
pub fn qibla_bearing(observer: &Coordinate) -> Bearing {
    calculate_bearing(&KAABA, observer)
}

/// Rotation to apply for the current device heading.
///
/// The dial turns by `-heading` so its north mark tracks true north; the
/// bearing is reported alongside, plus the bearing relative to the device's
/// facing when it is determined.
pub fn compute_rotation(bearing: &Bearing, heading: &HeadingSample) -> Rotation {
    Rotation {
        dial_degrees: -heading.degrees(),
        relative_degrees: bearing
            .degrees()
            .map(|b| normalize_degrees(b - heading.degrees())),
        bearing: *bearing,
    }
}
