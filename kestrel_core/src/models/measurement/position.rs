// kestrel_core/src/models/measurement/position.rs

use nalgebra::Vector3;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};

/// Direct observation of the position in the local navigation frame.
#[derive(Debug, Clone)]
pub struct PositionModel {
    pub stddev: f64,
}

impl Default for PositionModel {
    fn default() -> Self {
        Self { stddev: 1.0 }
    }
}

impl PositionModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for PositionModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Position
    }

    fn dimension(&self) -> usize {
        3
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::POSITION
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        match data {
            MeasurementData::Position(p) => Some(MeasurementVector::from_column_slice(p.as_slice())),
            _ => None,
        }
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let p = state.position().unwrap_or_else(Vector3::zeros);
        MeasurementVector::from_column_slice(p.as_slice())
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(3, state.dimension());
        if let Some(pi) = state.position_index() {
            for axis in 0..3 {
                c[(axis, pi + axis)] = 1.0;
            }
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev; 3])
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
