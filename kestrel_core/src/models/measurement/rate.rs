// kestrel_core/src/models/measurement/rate.rs

use std::f64::consts::PI;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::models::system::imu_bias::GYRO_BIAS;
use crate::parameters::ParameterList;
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};

/// Gyro reading as a measurement of the estimated rate: `y = ω - b`.
///
/// Needs the rate in the state. Without it the Jacobian is empty and every
/// update is skipped.
#[derive(Debug, Clone)]
pub struct RateModel {
    pub stddev: f64,
}

impl Default for RateModel {
    fn default() -> Self {
        Self {
            stddev: PI / 180.0,
        }
    }
}

impl RateModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for RateModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Rate
    }

    fn dimension(&self) -> usize {
        3
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::RATE
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        match data {
            MeasurementData::Rate(w) => Some(MeasurementVector::from_column_slice(w.as_slice())),
            _ => None,
        }
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let mut y = MeasurementVector::zeros(3);
        let Some(ri) = state.rate_index() else {
            return y;
        };
        let x = state.vector();
        for axis in 0..3 {
            y[axis] = x[ri + axis];
        }
        if let Some(bi) = state.extension_index(GYRO_BIAS) {
            for axis in 0..3 {
                y[axis] -= x[bi + axis];
            }
        }
        y
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(3, state.dimension());
        let Some(ri) = state.rate_index() else {
            return c;
        };
        let bias = state.extension_index(GYRO_BIAS);
        for axis in 0..3 {
            c[(axis, ri + axis)] = 1.0;
            if let Some(bi) = bias {
                c[(axis, bi + axis)] = -1.0;
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
