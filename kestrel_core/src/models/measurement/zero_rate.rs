// kestrel_core/src/models/measurement/zero_rate.rs

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

/// Pseudo-measurement asserting that the vehicle does not turn.
///
/// With the rate in the state the z rate is pulled towards zero. Without it
/// the raw gyro z reading is attributed to the gyro bias instead. Only used
/// while there is no absolute yaw reference.
#[derive(Debug, Clone)]
pub struct ZeroRateModel {
    pub stddev: f64,
}

impl Default for ZeroRateModel {
    fn default() -> Self {
        Self {
            stddev: 90.0 * PI / 180.0,
        }
    }
}

impl ZeroRateModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for ZeroRateModel {
    fn data_kind(&self) -> DataKind {
        DataKind::ZeroRate
    }

    fn dimension(&self) -> usize {
        1
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::empty()
    }

    fn apply_status_mask(&self, status: SystemStatus) -> bool {
        !status.contains(SystemStatus::YAW)
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        state: &State,
        _reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        let MeasurementData::ZeroRate(gyro_z) = data else {
            return None;
        };
        let y = if state.rate_index().is_some() { 0.0 } else { *gyro_z };
        Some(MeasurementVector::from_element(1, y))
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let x = state.vector();
        let value = match (state.rate_index(), state.extension_index(GYRO_BIAS)) {
            (Some(ri), _) => x[ri + 2],
            (None, Some(bi)) => -x[bi + 2],
            (None, None) => 0.0,
        };
        MeasurementVector::from_element(1, value)
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(1, state.dimension());
        match (state.rate_index(), state.extension_index(GYRO_BIAS)) {
            (Some(ri), _) => c[(0, ri + 2)] = 1.0,
            (None, Some(bi)) => c[(0, bi + 2)] = -1.0,
            (None, None) => {}
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[self.stddev])
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
