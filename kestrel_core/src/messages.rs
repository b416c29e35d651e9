// kestrel_core/src/messages.rs

use nalgebra::{DMatrix, UnitQuaternion, Vector3};
use std::fmt;

use crate::status::SystemStatus;

// =========================================================================
// == Sensor Data ==
// =========================================================================

/// A GNSS fix. Angles in radians, velocities in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub velocity_north: f64,
    pub velocity_east: f64,
}

/// An external pose, e.g. from a SLAM frontend. A channel whose standard
/// deviation is not positive is absent from the reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseFix {
    pub position: Vector3<f64>,
    /// Only the yaw of the orientation is used.
    pub orientation: UnitQuaternion<f64>,
    pub position_xy_stddev: f64,
    pub position_z_stddev: f64,
    /// Radians.
    pub yaw_stddev: f64,
}

/// The raw reading carried by one measurement update.
///
/// Each measurement model accepts exactly one variant and rejects the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementData {
    /// Height above the reference elevation, e.g. a barometer.
    Height(f64),
    /// Position in the local navigation frame.
    Position(Vector3<f64>),
    Gps(GpsFix),
    Pose(PoseFix),
    /// Absolute heading in radians.
    Heading(f64),
    /// Magnetic field in the body frame, any unit.
    Magnetic(Vector3<f64>),
    /// Accelerometer reading used as a gravity reference.
    Gravity(Vector3<f64>),
    /// Gyro z reading taken while the vehicle is known not to rotate.
    ZeroRate(f64),
    /// Full gyro reading.
    Rate(Vector3<f64>),
}

/// Discriminant of [`MeasurementData`], used to match updates to models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Height,
    Position,
    Gps,
    Pose,
    Heading,
    Magnetic,
    Gravity,
    ZeroRate,
    Rate,
}

impl MeasurementData {
    pub fn kind(&self) -> DataKind {
        match self {
            MeasurementData::Height(_) => DataKind::Height,
            MeasurementData::Position(_) => DataKind::Position,
            MeasurementData::Gps(_) => DataKind::Gps,
            MeasurementData::Pose(_) => DataKind::Pose,
            MeasurementData::Heading(_) => DataKind::Heading,
            MeasurementData::Magnetic(_) => DataKind::Magnetic,
            MeasurementData::Gravity(_) => DataKind::Gravity,
            MeasurementData::ZeroRate(_) => DataKind::ZeroRate,
            MeasurementData::Rate(_) => DataKind::Rate,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One measurement, queued on a named measurement and consumed on the next cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementUpdate {
    pub data: MeasurementData,
    /// Overrides the model's noise covariance for this update only.
    pub covariance: Option<DMatrix<f64>>,
}

impl MeasurementUpdate {
    pub fn new(data: MeasurementData) -> Self {
        Self {
            data,
            covariance: None,
        }
    }

    pub fn with_covariance(mut self, covariance: DMatrix<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }
}

impl From<MeasurementData> for MeasurementUpdate {
    fn from(data: MeasurementData) -> Self {
        Self::new(data)
    }
}

// =========================================================================
// == Public API Messages ==
// =========================================================================

/// The estimator's output after a cycle. Fields whose partition is not part
/// of the layout are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSnapshot {
    pub timestamp: Option<f64>,
    pub orientation: Option<UnitQuaternion<f64>>,
    pub rate: Option<Vector3<f64>>,
    pub position: Option<Vector3<f64>>,
    pub velocity: Option<Vector3<f64>>,
    pub status: SystemStatus,
}
