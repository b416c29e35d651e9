// kestrel_core/src/models/measurement/gravity.rs

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::models::system::imu_bias::ACCELEROMETER_BIAS;
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector, GRAVITY};

/// Pseudo-measurement that takes the accelerometer as a pure gravity sensor.
///
/// This levels roll and pitch while nothing better is available. Once the
/// horizontal velocity is observed the accelerations are modelled properly
/// and this model steps aside.
#[derive(Debug, Clone)]
pub struct GravityModel {
    pub stddev: f64,
    pub gravity: f64,
}

impl Default for GravityModel {
    fn default() -> Self {
        Self {
            stddev: 10.0,
            gravity: GRAVITY,
        }
    }
}

impl GravityModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for GravityModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Gravity
    }

    fn dimension(&self) -> usize {
        3
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::ROLLPITCH
    }

    fn apply_status_mask(&self, status: SystemStatus) -> bool {
        !status.contains(SystemStatus::XY_VELOCITY)
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        match data {
            MeasurementData::Gravity(f) => Some(MeasurementVector::from_column_slice(f.as_slice())),
            _ => None,
        }
    }

    /// `-g·R(q)ᵀ·e_z`, minus the accelerometer bias if one is estimated.
    fn expected_value(&self, state: &State) -> MeasurementVector {
        let mut y = MeasurementVector::zeros(3);
        let Some(q) = state.orientation() else {
            return y;
        };
        let g = self.gravity;
        let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
        y[0] = -g * (2.0 * qx * qz - 2.0 * qw * qy);
        y[1] = -g * (2.0 * qw * qx + 2.0 * qy * qz);
        y[2] = -g * (qw * qw - qx * qx - qy * qy + qz * qz);

        if let Some(bi) = state.extension_index(ACCELEROMETER_BIAS) {
            for axis in 0..3 {
                y[axis] -= state.vector()[bi + axis];
            }
        }
        y
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(3, state.dimension());
        let (Some(qi), Some(q)) = (state.orientation_index(), state.orientation()) else {
            return c;
        };
        let g2 = 2.0 * self.gravity;
        let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);
        let rows = [
            [g2 * qy, -g2 * qz, g2 * qw, -g2 * qx],
            [-g2 * qx, -g2 * qw, -g2 * qz, -g2 * qy],
            [-g2 * qw, g2 * qx, g2 * qy, -g2 * qz],
        ];
        for (row, values) in rows.iter().enumerate() {
            for (k, value) in values.iter().enumerate() {
                c[(row, qi + k)] = *value;
            }
        }

        if let Some(bi) = state.extension_index(ACCELEROMETER_BIAS) {
            for axis in 0..3 {
                c[(axis, bi + axis)] = -1.0;
            }
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev; 3])
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("stddev", self.stddev)
            .with("gravity", self.gravity)
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "stddev" => self.stddev = value,
            "gravity" => self.gravity = value,
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::test_support::navigating_state;
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;

    #[test]
    fn test_level_vehicle_reads_upward_specific_force() {
        let model = GravityModel::new();
        let state = navigating_state();
        let y = model.expected_value(&state);
        assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y[2], -GRAVITY, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let model = GravityModel::new();
        let mut state = navigating_state();
        state.set_orientation(&UnitQuaternion::from_euler_angles(0.3, -0.2, 1.0));
        let c = model.jacobian(&state);

        let h = 1e-6;
        for k in 0..4 {
            let mut plus = state.clone();
            let mut minus = state.clone();
            plus.vector_mut()[k] += h;
            minus.vector_mut()[k] -= h;
            let numeric = (model.expected_value(&plus) - model.expected_value(&minus)) / (2.0 * h);
            for row in 0..3 {
                assert_abs_diff_eq!(c[(row, k)], numeric[row], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_steps_aside_once_velocity_is_observed() {
        let model = GravityModel::new();
        assert!(model.apply_status_mask(SystemStatus::ROLLPITCH));
        assert!(!model.apply_status_mask(SystemStatus::XY_VELOCITY));
    }
}
