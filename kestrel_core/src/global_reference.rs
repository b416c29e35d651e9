// kestrel_core/src/global_reference.rs

use tracing::info;

use crate::error::{KestrelError, Result};
use crate::parameters::ParameterList;

// WGS84 ellipsoid
const EQUATORIAL_RADIUS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;

/// Anchors the local navigation frame on the WGS84 ellipsoid.
///
/// The local frame is a flat tangent plane at the reference position. Its x
/// axis points along `heading` (0 = north) and its y axis 90° to the left.
/// Small-area approximation: the earth radii are evaluated once, at the
/// reference latitude.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlobalReference {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    heading: f64,
    has_position: bool,
    has_heading: bool,
    has_altitude: bool,
    radius_north: f64,
    radius_east: f64,
}

impl GlobalReference {
    pub fn new() -> Self {
        let mut reference = Self::default();
        reference.reset();
        reference
    }

    /// Forgets the reference. Models re-establish it on their next update.
    pub fn reset(&mut self) {
        *self = Self::default();
        self.update_radii();
    }

    fn update_radii(&mut self) {
        let excentricity2 = 2.0 * FLATTENING - FLATTENING * FLATTENING;
        let sin_lat = self.latitude.sin();
        let temp = 1.0 / (1.0 - excentricity2 * sin_lat * sin_lat);
        let prime_vertical_radius = EQUATORIAL_RADIUS * temp.sqrt();
        self.radius_north = prime_vertical_radius * (1.0 - excentricity2) * temp;
        self.radius_east = prime_vertical_radius * self.latitude.cos();
    }

    // --- Setters ---

    pub fn set_position(&mut self, latitude: f64, longitude: f64) -> &mut Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self.has_position = true;
        self.update_radii();
        info!(
            "Reference position set to {:.7}°, {:.7}°",
            latitude.to_degrees(),
            longitude.to_degrees()
        );
        self
    }

    pub fn set_heading(&mut self, heading: f64) -> &mut Self {
        self.heading = heading;
        self.has_heading = true;
        info!("Reference heading set to {:.2}°", heading.to_degrees());
        self
    }

    pub fn set_altitude(&mut self, altitude: f64) -> &mut Self {
        self.altitude = altitude;
        self.has_altitude = true;
        info!("Reference altitude set to {:.2} m", altitude);
        self
    }

    // --- Queries ---

    pub fn has_position(&self) -> bool {
        self.has_position
    }

    pub fn has_heading(&self) -> bool {
        self.has_heading
    }

    pub fn has_altitude(&self) -> bool {
        self.has_altitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// Earth radii `(north, east)` at the reference latitude, in meters per radian.
    pub fn radii(&self) -> (f64, f64) {
        (self.radius_north, self.radius_east)
    }

    // --- Conversions ---

    /// Geodetic coordinates (radians) to local `(x, y)`.
    pub fn from_wgs84(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let north = self.radius_north * (latitude - self.latitude);
        let east = self.radius_east * (longitude - self.longitude);
        self.from_north_east(north, east)
    }

    /// Local `(x, y)` to geodetic coordinates. Returns zeros if the radii are degenerate.
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        if self.radius_north == 0.0 || self.radius_east == 0.0 {
            return (0.0, 0.0);
        }
        let (north, east) = self.to_north_east(x, y);
        (
            self.latitude + north / self.radius_north,
            self.longitude + east / self.radius_east,
        )
    }

    pub fn from_north_east(&self, north: f64, east: f64) -> (f64, f64) {
        let (sin, cos) = self.heading.sin_cos();
        (north * cos + east * sin, north * sin - east * cos)
    }

    pub fn to_north_east(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin, cos) = self.heading.sin_cos();
        (x * cos + y * sin, x * sin - y * cos)
    }

    // --- Parameters ---

    pub fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("latitude", self.latitude)
            .with("longitude", self.longitude)
            .with("altitude", self.altitude)
            .with("heading", self.heading)
    }

    /// Setting a reference component through a parameter also marks it as established.
    pub fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "latitude" => {
                self.set_position(value, self.longitude);
            }
            "longitude" => {
                self.set_position(self.latitude, value);
            }
            "altitude" => {
                self.set_altitude(value);
            }
            "heading" => {
                self.set_heading(value);
            }
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_new_reference_has_nothing_established() {
        let reference = GlobalReference::new();
        assert!(!reference.has_position());
        assert!(!reference.has_heading());
        assert!(!reference.has_altitude());
        // Equator: both radii equal the equatorial radius up to flattening.
        let (north, east) = reference.radii();
        assert_abs_diff_eq!(east, EQUATORIAL_RADIUS, epsilon = 1e-6);
        assert!(north < east);
    }

    #[test]
    fn test_north_is_x_and_east_is_negative_y_at_zero_heading() {
        let mut reference = GlobalReference::new();
        reference.set_position(0.8, 0.15);
        let (rn, _) = reference.radii();

        let (x, y) = reference.from_wgs84(0.8 + 10.0 / rn, 0.15);
        assert_abs_diff_eq!(x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-9);

        let (x, y) = reference.from_north_east(0.0, 5.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, -5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_heading_rotates_the_local_frame() {
        let mut reference = GlobalReference::new();
        reference.set_heading(FRAC_PI_2);
        // Facing east: east is straight ahead.
        let (x, y) = reference.from_north_east(0.0, 3.0);
        assert_abs_diff_eq!(x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-12);

        let (north, east) = reference.to_north_east(x, y);
        assert_abs_diff_eq!(north, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(east, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wgs84_conversions_are_inverse() {
        let mut reference = GlobalReference::new();
        reference.set_position(0.9, -1.2).set_heading(0.4);
        let (lat, lon) = reference.to_wgs84(120.0, -45.0);
        let (x, y) = reference.from_wgs84(lat, lon);
        assert_abs_diff_eq!(x, 120.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, -45.0, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_radius_returns_zero() {
        let mut reference = GlobalReference::new();
        reference.set_position(FRAC_PI_2, 0.0);
        reference.radius_east = 0.0;
        assert_eq!(reference.to_wgs84(1.0, 1.0), (0.0, 0.0));
    }

    #[test]
    fn test_parameters_establish_the_reference() {
        let mut reference = GlobalReference::new();
        reference.set_parameter("altitude", 250.0).unwrap();
        assert!(reference.has_altitude());
        assert_eq!(reference.parameters().get("altitude"), Some(250.0));
        assert!(reference.set_parameter("datum", 1.0).is_err());

        reference.reset();
        assert!(!reference.has_altitude());
        assert_eq!(reference.altitude(), 0.0);
    }
}
