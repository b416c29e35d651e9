// kestrel_core/src/models/measurement/heading.rs

use std::f64::consts::PI;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};
use crate::utils::kinematics::{wrap_angle, yaw, yaw_jacobian};

/// Absolute heading, e.g. from a dual-antenna receiver or a compass that
/// already outputs an angle.
#[derive(Debug, Clone)]
pub struct HeadingModel {
    pub stddev: f64,
}

impl Default for HeadingModel {
    fn default() -> Self {
        Self {
            stddev: 10.0 * PI / 180.0,
        }
    }
}

impl HeadingModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for HeadingModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Heading
    }

    fn dimension(&self) -> usize {
        1
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::YAW
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        match data {
            MeasurementData::Heading(heading) => Some(MeasurementVector::from_element(1, *heading)),
            _ => None,
        }
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let heading = state.orientation().map(|q| yaw(&q)).unwrap_or(0.0);
        MeasurementVector::from_element(1, heading)
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(1, state.dimension());
        if let (Some(qi), Some(q)) = (state.orientation_index(), state.orientation()) {
            let gradient = yaw_jacobian(&q);
            for k in 0..4 {
                c[(0, qi + k)] = gradient[k];
            }
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev])
    }

    fn limit_error(&self, error: &mut MeasurementVector) {
        error[0] = wrap_angle(error[0]);
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new().with("stddev", self.stddev)
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "stddev" => self.stddev = value,
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
    fn test_innovation_is_wrapped_across_pi() {
        let mut model = HeadingModel::new();
        let mut state = navigating_state();
        state.set_orientation(&UnitQuaternion::from_euler_angles(0.0, 0.0, 3.1));

        let y = model
            .observation(&MeasurementData::Heading(-3.1), &state, &GlobalReference::new())
            .unwrap();
        let mut error = y - model.expected_value(&state);
        model.limit_error(&mut error);
        assert_abs_diff_eq!(error[0], 2.0 * PI - 6.2, epsilon = 1e-9);
    }

    #[test]
    fn test_jacobian_only_touches_the_quaternion() {
        let model = HeadingModel::new();
        let state = navigating_state();
        let c = model.jacobian(&state);
        // Identity orientation: yaw grows with qz only.
        assert_abs_diff_eq!(c[(0, 3)], 2.0, epsilon = 1e-12);
        for j in 4..state.dimension() {
            assert_eq!(c[(0, j)], 0.0);
        }
    }
}
