// kestrel_core/src/types.rs

use nalgebra::{DMatrix, DVector, Vector3};

// --- Core Type Aliases ---
pub type StateVector = DVector<f64>;
pub type Covariance = DMatrix<f64>;
pub type Jacobian = DMatrix<f64>;
pub type MeasurementVector = DVector<f64>;

/// Standard gravity, pointing down along the world z axis.
pub const GRAVITY: f64 = -9.8065;

/// The externally supplied process input: one IMU sample in the body frame.
///
/// Rate and specific force are only read from here when they are not part of
/// the estimated state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemInput {
    /// Angular rate in rad/s.
    pub rate: Vector3<f64>,
    /// Specific force in m/s^2.
    pub acceleration: Vector3<f64>,
}

impl SystemInput {
    pub fn new(rate: Vector3<f64>, acceleration: Vector3<f64>) -> Self {
        Self { rate, acceleration }
    }
}
