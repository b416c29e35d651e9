// kestrel_core/src/models/measurement/gps.rs

use nalgebra::Vector3;
use tracing::info;

use crate::error::{KestrelError, Result};
use crate::global_reference::GlobalReference;
use crate::messages::{DataKind, MeasurementData};
use crate::models::measurement::{diagonal_noise, MeasurementModel};
use crate::parameters::{as_flag, from_flag, ParameterList};
use crate::state::State;
use crate::status::SystemStatus;
use crate::types::{Covariance, Jacobian, MeasurementVector};

/// Horizontal position and velocity from a GNSS receiver.
///
/// The fix is projected into the local frame through the [`GlobalReference`].
/// With `auto_reference` the reference origin is placed on the first fix (and
/// again after a timeout) such that the current position estimate is kept.
#[derive(Debug, Clone)]
pub struct GpsModel {
    pub position_stddev: f64,
    pub velocity_stddev: f64,
    pub auto_reference: bool,
    reference_set: bool,
}

impl Default for GpsModel {
    fn default() -> Self {
        Self {
            position_stddev: 10.0,
            velocity_stddev: 1.0,
            auto_reference: true,
            reference_set: false,
        }
    }
}

impl GpsModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeasurementModel for GpsModel {
    fn data_kind(&self) -> DataKind {
        DataKind::Gps
    }

    fn dimension(&self) -> usize {
        4
    }

    fn status_flags(&self) -> SystemStatus {
        SystemStatus::XY_POSITION | SystemStatus::XY_VELOCITY
    }

    fn prepare(
        &mut self,
        state: &State,
        data: &MeasurementData,
        reference: &mut GlobalReference,
        timed_out: bool,
    ) -> bool {
        let MeasurementData::Gps(fix) = data else {
            return true;
        };
        if timed_out {
            self.reference_set = false;
        }
        if !self.reference_set && self.auto_reference {
            // Anchor on the fix first, then shift the origin so the current
            // position estimate maps onto it.
            reference.set_position(fix.latitude, fix.longitude);
            let p = state.position().unwrap_or_else(Vector3::zeros);
            let (latitude, longitude) = reference.to_wgs84(-p.x, -p.y);
            reference.set_position(latitude, longitude);
            info!(
                "Set new GPS reference position: {:.7}°/{:.7}°",
                latitude.to_degrees(),
                longitude.to_degrees()
            );
            self.reference_set = true;
        }
        true
    }

    fn observation(
        &mut self,
        data: &MeasurementData,
        _state: &State,
        reference: &GlobalReference,
    ) -> Option<MeasurementVector> {
        let MeasurementData::Gps(fix) = data else {
            return None;
        };
        if !reference.has_position() {
            return None;
        }
        let (x, y) = reference.from_wgs84(fix.latitude, fix.longitude);
        let (vx, vy) = reference.from_north_east(fix.velocity_north, fix.velocity_east);
        Some(MeasurementVector::from_column_slice(&[x, y, vx, vy]))
    }

    fn expected_value(&self, state: &State) -> MeasurementVector {
        let p = state.position().unwrap_or_else(Vector3::zeros);
        let v = state.velocity().unwrap_or_else(Vector3::zeros);
        MeasurementVector::from_column_slice(&[p.x, p.y, v.x, v.y])
    }

    fn jacobian(&self, state: &State) -> Jacobian {
        let mut c = Jacobian::zeros(4, state.dimension());
        if let Some(pi) = state.position_index() {
            c[(0, pi)] = 1.0;
            c[(1, pi + 1)] = 1.0;
        }
        if let Some(vi) = state.velocity_index() {
            c[(2, vi)] = 1.0;
            c[(3, vi + 1)] = 1.0;
        }
        c
    }

    fn noise(&self, _state: &State) -> Covariance {
        diagonal_noise(&[
            self.position_stddev,
            self.position_stddev,
            self.velocity_stddev,
            self.velocity_stddev,
        ])
    }

    fn reset(&mut self, _state: &State) {
        self.reference_set = false;
    }

    fn parameters(&self) -> ParameterList {
        ParameterList::new()
            .with("position_stddev", self.position_stddev)
            .with("velocity_stddev", self.velocity_stddev)
            .with("auto_reference", from_flag(self.auto_reference))
    }

    fn set_parameter(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "position_stddev" => self.position_stddev = value,
            "velocity_stddev" => self.velocity_stddev = value,
            "auto_reference" => self.auto_reference = as_flag(value),
            _ => return Err(KestrelError::UnknownParameter(key.to_string())),
        }
        Ok(())
    }
}
