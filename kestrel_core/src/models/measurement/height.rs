// kestrel_core/src/models/measurement/height.rs

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::parameters::{as_flag, from_flag, ParameterList};
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};

/// Height above a reference elevation, e.g. from a barometer or sonar.
///
/// The reading is `pz + elevation`. With `auto_elevation` the elevation is
/// taken from the first reading (and after a timeout) so that the current
/// height estimate is kept, and it is published as the reference altitude.
#[derive(Debug, Clone)]
pub struct HeightModel {
    pub stddev: f64,
    pub elevation: f64,
    pub auto_elevation: bool,
}

impl Default for HeightModel {
    fn default() -> Self {
        Self {
            stddev: 1.0,
            elevation: 0.0,
            auto_elevation: false,
        }
    }
}

impl HeightModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for HeightModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Height
    }

    fn dimension(&self) -> usize {
        1
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::Z_POSITION
    }

    fn prepare(
        &mut self,
        state: &State,
        data: &MeasurementData,
        reference: &mut GlobalReference,
        timed_out: bool,
    ) -> bool {
        let MeasurementData::Height(height) = data else {
            return true;
        };
        if self.auto_elevation && (timed_out || !reference.has_altitude()) {
            let pz = state.position().map(|p| p.z).unwrap_or(0.0);
            reference.set_altitude(height - pz);
        }
        true
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        let MeasurementData::Height(height) = data else {
            return None;
        };
        if self.auto_elevation {
            self.elevation = reference.altitude();
        }
        Some(MeasurementVector::from_element(1, height - self.elevation))
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        MeasurementVector::from_element(1, state.position().map(|p| p.z).unwrap_or(0.0))
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(1, state.dimension());
        if let Some(pi) = state.position_index() {
            c[(0, pi + 2)] = 1.0;
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev])
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("stddev", self.stddev)
            .with("elevation", self.elevation)
            .with("auto_elevation", from_flag(self.auto_elevation))
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "stddev" => self.stddev = value,
            "elevation" => self.elevation = value,
            "auto_elevation" => self.auto_elevation = as_flag(value),
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
    use nalgebra::Vector3;

    #[test]
    fn test_observation_subtracts_elevation() {
        let mut model = HeightModel::new();
        model.set_parameter("elevation", 100.0).unwrap();
        let state = navigating_state();
        let reference = GlobalReference::new();

        let y = model
            .observation(&MeasurementData::Height(102.5), &state, &reference)
            .unwrap();
        assert_abs_diff_eq!(y[0], 2.5, epsilon = 1e-12);

        let c = model.jacobian(&state);
        assert_eq!(c.ncols(), state.dimension());
        assert_abs_diff_eq!(c[(0, 6)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_auto_elevation_keeps_current_height() {
        let mut model = HeightModel::new();
        model.auto_elevation = true;
        let mut state = navigating_state();
        state.set_position(&Vector3::new(0.0, 0.0, 3.0));
        let mut reference = GlobalReference::new();
        let data = MeasurementData::Height(450.0);

        assert!(model.prepare(&state, &data, &mut reference, false));
        assert!(reference.has_altitude());
        assert_abs_diff_eq!(reference.altitude(), 447.0, epsilon = 1e-12);

        let y = model.observation(&data, &state, &reference).unwrap();
        assert_abs_diff_eq!(y[0], model.expected_value(&state)[0], epsilon = 1e-12);
    }

    #[test]
    fn test_wrong_data_kind_is_unusable() {
        let mut model = HeightModel::new();
        let state = navigating_state();
        let reference = GlobalReference::new();
        assert!(model
            .observation(&MeasurementData::Heading(0.1), &state, &reference)
            .is_none());
    }
}
